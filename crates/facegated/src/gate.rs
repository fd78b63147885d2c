//! Verification gate for the protected route.
//!
//! The `face_verified` cookie carries `<session>.<nonce>.<sha256(key || session.nonce)>`.
//! A token is only honoured while its session is the current one, so a reset
//! invalidates every cookie minted before it.

use crate::match_loop::LoopClient;
use axum::extract::{Request, State};
use axum::http::header::COOKIE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

pub const VERIFICATION_COOKIE: &str = "face_verified";
pub const ENTRY_ROUTE: &str = "/";
pub const PROTECTED_ROUTE: &str = "/success";

const NONCE_BYTES: usize = 16;

/// Mints and checks verification tokens.
pub struct TokenSigner {
    key: [u8; 32],
}

impl TokenSigner {
    /// Key derived from a configured secret.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            key: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Fresh random key for this process.
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Token for `session`.
    pub fn mint(&self, session: Uuid) -> String {
        let mut nonce = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce);
        let payload = format!("{session}.{}", hex::encode(nonce));
        let signature = self.sign(&payload);
        format!("{payload}.{signature}")
    }

    /// True if `token` was minted by this key for `session`.
    pub fn verify(&self, token: &str, session: Uuid) -> bool {
        let Some((payload, signature)) = token.rsplit_once('.') else {
            return false;
        };
        let Some((token_session, nonce)) = payload.split_once('.') else {
            return false;
        };
        if Uuid::parse_str(token_session).ok() != Some(session) || nonce.len() != NONCE_BYTES * 2 {
            return false;
        }
        let expected = self.sign(payload);
        // Compare every byte regardless of where the first mismatch is.
        expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// What the middleware needs to judge a request.
#[derive(Clone)]
pub struct GateState {
    pub signer: Arc<TokenSigner>,
    pub session: LoopClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect(&'static str),
}

pub fn is_protected(path: &str) -> bool {
    path.starts_with(PROTECTED_ROUTE)
}

/// Decide whether a request for `path` may proceed in `session`.
pub fn check(path: &str, cookie: Option<&str>, signer: &TokenSigner, session: Uuid) -> GateDecision {
    if !is_protected(path) {
        return GateDecision::Allow;
    }
    match cookie {
        Some(token) if signer.verify(token, session) => GateDecision::Allow,
        _ => GateDecision::Redirect(ENTRY_ROUTE),
    }
}

/// Value of cookie `name` from a `Cookie` header (`a=1; b=2`).
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// `Set-Cookie` value carrying a verification token.
pub fn set_cookie_header(token: &str, secure: bool) -> String {
    let mut header = format!("{VERIFICATION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        header.push_str("; Secure");
    }
    header
}

/// `Set-Cookie` value that removes the verification cookie.
pub fn clear_cookie_header() -> String {
    format!("{VERIFICATION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// axum middleware applying [`check`] to every request.
pub async fn guard(State(gate): State<GateState>, req: Request, next: Next) -> Response {
    let decision = {
        let cookie = req
            .headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .find_map(|h| cookie_value(h, VERIFICATION_COOKIE));
        check(req.uri().path(), cookie, &gate.signer, gate.session.session_id())
    };

    match decision {
        GateDecision::Allow => next.run(req).await,
        GateDecision::Redirect(to) => {
            tracing::info!(path = req.uri().path(), "unverified request redirected");
            Redirect::temporary(to).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprotected_paths_pass() {
        let signer = TokenSigner::random();
        let session = Uuid::new_v4();
        assert_eq!(check("/", None, &signer, session), GateDecision::Allow);
        assert_eq!(check("/api/status", None, &signer, session), GateDecision::Allow);
    }

    #[test]
    fn test_missing_cookie_redirects() {
        let signer = TokenSigner::random();
        let session = Uuid::new_v4();
        assert_eq!(check("/success", None, &signer, session), GateDecision::Redirect("/"));
        assert_eq!(check("/success/details", None, &signer, session), GateDecision::Redirect("/"));
    }

    #[test]
    fn test_valid_token_allows() {
        let signer = TokenSigner::random();
        let session = Uuid::new_v4();
        let token = signer.mint(session);
        assert_eq!(check("/success", Some(&token), &signer, session), GateDecision::Allow);
    }

    #[test]
    fn test_token_from_other_session_redirects() {
        let signer = TokenSigner::random();
        let token = signer.mint(Uuid::new_v4());
        assert_eq!(
            check("/success", Some(&token), &signer, Uuid::new_v4()),
            GateDecision::Redirect("/")
        );
    }

    #[test]
    fn test_session_swap_breaks_signature() {
        let signer = TokenSigner::random();
        let (minted_for, current) = (Uuid::new_v4(), Uuid::new_v4());
        let token = signer.mint(minted_for);
        let swapped = token.replacen(&minted_for.to_string(), &current.to_string(), 1);
        assert!(!signer.verify(&swapped, current));
    }

    #[test]
    fn test_forged_tokens_redirect() {
        let signer = TokenSigner::random();
        let other = TokenSigner::random();
        let session = Uuid::new_v4();
        for forged in ["1".to_string(), "true".to_string(), other.mint(session), String::new()] {
            assert_eq!(
                check("/success", Some(&forged), &signer, session),
                GateDecision::Redirect("/"),
                "accepted {forged:?}"
            );
        }
    }

    #[test]
    fn test_secret_key_is_stable() {
        let session = Uuid::new_v4();
        let token = TokenSigner::from_secret("s3cret").mint(session);
        assert!(TokenSigner::from_secret("s3cret").verify(&token, session));
        assert!(!TokenSigner::from_secret("other").verify(&token, session));
    }

    #[test]
    fn test_token_shape() {
        let session = Uuid::new_v4();
        let token = TokenSigner::random().mint(session);
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], session.to_string());
        assert_eq!(parts[1].len(), NONCE_BYTES * 2);
        assert_eq!(parts[2].len(), 64);
    }

    #[test]
    fn test_cookie_value_parsing() {
        let header = "theme=dark; face_verified=abc.def ; other=1";
        assert_eq!(cookie_value(header, "face_verified"), Some("abc.def"));
        assert_eq!(cookie_value(header, "missing"), None);
        assert_eq!(cookie_value("face_verified=\"q\"", "face_verified"), Some("q"));
    }

    #[test]
    fn test_set_cookie_header() {
        assert!(set_cookie_header("t", true).ends_with("; Secure"));
        assert!(set_cookie_header("t", false).starts_with("face_verified=t;"));
    }
}
