use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::config::CALLBACK_PATH;

use super::AuthError;

const SUCCESS_HTML: &str = r#"<html><body><h1>Login complete</h1><p>You may close this window and return to the terminal.</p></body></html>"#;
const ERROR_HTML: &str = r#"<html><body><h1>Login failed</h1><p>Please return to the terminal for details.</p></body></html>"#;
const NOT_FOUND_HTML: &str = r#"<html><body><h1>Not found</h1></body></html>"#;

/// Parse pasted callback input. Accepts either the full redirect URL or a
/// bare authorization code.
pub fn parse_callback_input(input: &str) -> Result<String, AuthError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::MissingAuthorizationCode);
    }

    if let Ok(url) = Url::parse(input) {
        let mut code: Option<String> = None;
        let mut error: Option<String> = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }
        if let Some(err) = error {
            return Err(AuthError::AccessDenied(err));
        }
        return code.ok_or(AuthError::MissingAuthorizationCode);
    }

    Ok(input.to_owned())
}

/// Loopback HTTP listener for the callback route. Stands in for the
/// application page the identity provider redirects back to.
pub struct CallbackListener {
    listener: TcpListener,
}

impl CallbackListener {
    /// Bind to the socket the redirect URI points at. Binding happens
    /// before the authorization redirect starts, so the identity provider
    /// can never race the listener.
    pub async fn bind(redirect_uri: &Url) -> Result<Self, AuthError> {
        let addrs = redirect_uri.socket_addrs(|| None)?;
        let listener = TcpListener::bind(addrs.as_slice()).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AuthError> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for a redirect carrying the authorization code. Requests for
    /// other paths (favicons and the like) get a 404 and the wait
    /// continues; a redirect with an `error` parameter ends the wait.
    /// A blank `code` value is delivered as-is; the exchange rejects it
    /// and the caller can wait for a new redirect.
    pub async fn recv(&self) -> Result<String, AuthError> {
        loop {
            let (mut stream, _addr) = self.listener.accept().await?;
            let mut buffer = [0u8; 4096];
            let n = stream.read(&mut buffer).await?;
            let request = String::from_utf8_lossy(&buffer[..n]);

            let path = match parse_request_path(&request) {
                Some(path) => path,
                None => {
                    respond(&mut stream, 400, ERROR_HTML).await?;
                    continue;
                }
            };
            let url = match Url::parse(&format!("http://localhost{path}")) {
                Ok(url) => url,
                Err(_) => {
                    respond(&mut stream, 400, ERROR_HTML).await?;
                    continue;
                }
            };
            if url.path() != CALLBACK_PATH {
                respond(&mut stream, 404, NOT_FOUND_HTML).await?;
                continue;
            }

            let mut code: Option<String> = None;
            let mut error: Option<String> = None;
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "code" => code = Some(value.into_owned()),
                    "error" => error = Some(value.into_owned()),
                    _ => {}
                }
            }

            if let Some(err) = error {
                respond(&mut stream, 400, ERROR_HTML).await?;
                return Err(AuthError::AccessDenied(err));
            }
            let code = match code {
                Some(code) => code,
                None => {
                    respond(&mut stream, 400, ERROR_HTML).await?;
                    return Err(AuthError::MissingAuthorizationCode);
                }
            };

            respond(&mut stream, 200, SUCCESS_HTML).await?;
            let _ = stream.shutdown().await;
            return Ok(code);
        }
    }
}

fn parse_request_path(request: &str) -> Option<&str> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let _method = parts.next()?;
    parts.next()
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) -> Result<(), AuthError> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let response = format!(
        "{status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}
