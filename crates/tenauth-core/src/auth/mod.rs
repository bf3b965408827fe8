mod callback;
mod error;
mod exchange;
mod flow;
mod initiator;
mod mismatch;
mod navigation;
mod pkce;
mod response;
mod store;

pub use callback::{parse_callback_input, CallbackListener};
pub use error::AuthError;
pub use exchange::{classify, ExchangeOutcome, TokenExchangeResolver};
pub use flow::LoginFlow;
pub use initiator::AuthorizationInitiator;
pub use mismatch::{recovery_urls_from_route, RecoveryAction, TenantMismatchResolver};
pub use navigation::NavigationSink;
pub use pkce::{derive_challenge, PkcePair};
pub use response::ExchangeResponse;
pub use store::{EphemeralStore, MemoryStore, VERIFIER_KEY};
