use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone)]
pub struct PkcePair {
    verifier: String,
    challenge: String,
}

impl PkcePair {
    /// Create a new random verifier/challenge pair following RFC 7636
    /// recommendations. Randomness comes from the operating system
    /// generator; failure to obtain it aborts the process.
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = derive_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

fn generate_verifier() -> String {
    const BYTE_LEN: usize = 32;
    let mut bytes = [0u8; BYTE_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 over the verifier's UTF-8 bytes, base64url without padding.
/// Deterministic for a given verifier.
pub fn derive_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_meets_length_and_charset_requirements() {
        let pair = PkcePair::generate();
        assert!(pair.verifier().len() >= 43);
        assert!(pair.verifier().len() <= 128);
        assert!(pair
            .verifier()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn challenge_matches_rfc_7636_appendix_b_vector() {
        let challenge = derive_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn challenge_is_deterministic_and_distinct_from_verifier() {
        let pair = PkcePair::generate();
        assert_eq!(derive_challenge(pair.verifier()), pair.challenge());
        assert_ne!(pair.verifier(), pair.challenge());
    }

    #[test]
    fn each_attempt_gets_a_fresh_pair() {
        let first = PkcePair::generate();
        let second = PkcePair::generate();
        assert_ne!(first.verifier(), second.verifier());
    }
}
