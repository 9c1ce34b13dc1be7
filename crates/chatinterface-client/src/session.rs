//! Server addressing for one logged-in session.

use std::fmt;

use reqwest::Url;

use chatinterface_core::error::{ChatError, ChatResult};

/// Path of the chat socket on every server.
pub const SOCKET_PATH: &str = "/ws/chat";

/// Where to talk to and how to authenticate. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// `scheme://host[:port]` used for REST calls.
    pub http_origin: String,
    /// `ws(s)://host[:port]/ws/chat`.
    pub socket_url: String,
    pub credential: String,
}

impl Session {
    /// Derive both endpoints from whatever the user typed as the server.
    pub fn new(server: &str, credential: impl Into<String>) -> ChatResult<Self> {
        let http_origin = normalize_origin(server)?;
        let socket_url = socket_url(&http_origin)?;
        Ok(Self {
            http_origin,
            socket_url,
            credential: credential.into(),
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("http_origin", &self.http_origin)
            .field("socket_url", &self.socket_url)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Reduce a server address to `scheme://host[:port]`.
///
/// Paths, queries and default ports are dropped. Only `http` and `https`
/// are accepted.
pub fn normalize_origin(input: &str) -> ChatResult<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ChatError::InvalidUrl("server address is empty".into()));
    }
    let url = Url::parse(input).map_err(|e| ChatError::InvalidUrl(format!("{input}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ChatError::InvalidUrl(format!(
                "{input}: unsupported scheme '{other}' (use http or https)"
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(ChatError::InvalidUrl(format!("{input}: missing host")));
    }
    Ok(url.origin().ascii_serialization())
}

/// Socket endpoint for a normalized origin: `http` → `ws`, `https` → `wss`.
pub fn socket_url(origin: &str) -> ChatResult<String> {
    let (scheme, rest) = if let Some(rest) = origin.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        ("ws", rest)
    } else {
        return Err(ChatError::InvalidUrl(format!(
            "{origin}: expected an http or https origin"
        )));
    };
    Ok(format!("{scheme}://{}{SOCKET_PATH}", rest.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_drops_path_and_default_port() {
        assert_eq!(
            normalize_origin("https://chat.example.com:443/some/page?x=1").unwrap(),
            "https://chat.example.com"
        );
        assert_eq!(
            normalize_origin("  http://localhost:8000/  ").unwrap(),
            "http://localhost:8000"
        );
    }

    #[test]
    fn unsupported_or_empty_input_is_rejected() {
        for input in ["", "ftp://example.com", "chat.example.com", "ws://example.com"] {
            assert!(
                matches!(normalize_origin(input), Err(ChatError::InvalidUrl(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn socket_scheme_follows_http_scheme() {
        assert_eq!(
            socket_url("https://chat.example.com").unwrap(),
            "wss://chat.example.com/ws/chat"
        );
        assert_eq!(
            socket_url("http://localhost:8000").unwrap(),
            "ws://localhost:8000/ws/chat"
        );
        assert!(socket_url("ftp://x").is_err());
    }

    #[test]
    fn session_derives_both_endpoints() {
        let session = Session::new("https://chat.example.com/login", "tok").unwrap();
        assert_eq!(session.http_origin, "https://chat.example.com");
        assert_eq!(session.socket_url, "wss://chat.example.com/ws/chat");
        assert_eq!(session.credential, "tok");
    }

    #[test]
    fn debug_hides_credential() {
        let session = Session::new("http://localhost:8000", "super-secret").unwrap();
        let shown = format!("{session:?}");
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("localhost:8000"));
    }
}
