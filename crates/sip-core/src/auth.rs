//! RFC 2617 digest authentication.
//!
//! The server side ([`DigestAuthenticator`]) issues stateless nonces of the
//! form `timestamp ":" MD5(timestamp ":" Call-ID From-user secret)` and
//! verifies Proxy-Authorization credentials against them, so a nonce is only
//! accepted for the call it was issued for. The client side
//! ([`add_authorization`]) answers a 401/407 challenge.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::helper::{make_response, random_hex};
use crate::message::{Request, Response};
use crate::types::{Algorithm, DigestChallenge, DigestCredentials, Qop, StatusCode};

/// Outcome of verifying a request's credentials.
///
/// Returned rather than raised so the caller picks the SIP response
/// (usually 407 for `Failed`/`Expired`, 400 for `BadlyFormed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthResult {
    Authenticated,
    Failed,
    Expired,
    BadlyFormed,
}

/// Configuration for the server side of digest authentication.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret mixed into every nonce. Must be stable across the nonce
    /// lifetime and never shared with clients.
    pub secret: String,
}

impl Default for AuthConfig {
    /// A fresh random secret per process.
    fn default() -> Self {
        Self {
            secret: random_hex(16),
        }
    }
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.secret.is_empty() {
            return Err("Digest secret must not be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig").field("secret", &"<redacted>").finish()
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Computes the RFC 2617 §3.2.2.1 request-digest.
///
/// With `qop = Some("auth")` the cnonce and nonce-count take part in the
/// hash; any other qop (or none) yields the RFC 2069 compatible form.
pub fn make_response_md5(
    username: &str,
    password: &str,
    realm: &str,
    method: &str,
    digest_uri: &str,
    nonce: &str,
    qop: Option<&str>,
    cnonce: &str,
    nonce_count: &str,
) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, digest_uri));
    match qop {
        Some(qop) if qop == "auth" => md5_hex(&format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, nonce, nonce_count, cnonce, qop, ha2
        )),
        _ => md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2)),
    }
}

/// Server-side digest authentication with an injected secret.
#[derive(Debug, Clone)]
pub struct DigestAuthenticator {
    config: AuthConfig,
}

impl DigestAuthenticator {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Builds the nonce for `request` at `timestamp` (seconds since the epoch).
    pub fn make_nonce(&self, request: &Request, timestamp: i64) -> String {
        let call_id = request.headers.call_id.as_deref().unwrap_or_default();
        let from_user = request
            .headers
            .from
            .as_ref()
            .and_then(|f| f.uri.user.as_deref())
            .unwrap_or_default();
        let digest = md5_hex(&format!(
            "{}:{}{}{}",
            timestamp, call_id, from_user, self.config.secret
        ));
        format!("{}:{}", timestamp, digest)
    }

    /// A 407 carrying one `Proxy-Authenticate: Digest` challenge for `realm`.
    pub fn make_proxy_challenge(&self, request: &Request, realm: &str, use_auth_qop: bool) -> Response {
        self.make_challenge_at(request, realm, use_auth_qop, true, Utc::now().timestamp())
    }

    /// A 401 carrying one `WWW-Authenticate: Digest` challenge for `realm`.
    pub fn make_www_challenge(&self, request: &Request, realm: &str, use_auth_qop: bool) -> Response {
        self.make_challenge_at(request, realm, use_auth_qop, false, Utc::now().timestamp())
    }

    /// Challenge generation with an explicit timestamp.
    pub fn make_challenge_at(
        &self,
        request: &Request,
        realm: &str,
        use_auth_qop: bool,
        proxy: bool,
        now: i64,
    ) -> Response {
        let code = if proxy { 407 } else { 401 };
        let mut response = make_response(request, code, None);
        let challenge = DigestChallenge {
            realm: realm.to_string(),
            nonce: self.make_nonce(request, now),
            algorithm: Some(Algorithm::Md5),
            qop_options: if use_auth_qop {
                vec![Qop::Auth, Qop::AuthInt]
            } else {
                Vec::new()
            },
            ..Default::default()
        };
        if proxy {
            response.headers.proxy_authenticates.push(challenge);
        } else {
            response.headers.www_authenticates.push(challenge);
        }
        response
    }

    /// Verifies the Proxy-Authorization credentials of `request` against
    /// the wall clock. `expires_delta` is in seconds; zero disables expiry.
    pub fn authenticate_request(&self, request: &Request, realm: &str, password: &str, expires_delta: i64) -> AuthResult {
        self.authenticate_request_at(request, realm, password, expires_delta, Utc::now().timestamp())
    }

    /// [`authenticate_request`](Self::authenticate_request) with an explicit `now`.
    pub fn authenticate_request_at(
        &self,
        request: &Request,
        realm: &str,
        password: &str,
        expires_delta: i64,
        now: i64,
    ) -> AuthResult {
        let credentials = &request.headers.proxy_authorizations;
        if credentials.is_empty() {
            debug!("no Proxy-Authorization present");
            return AuthResult::Failed;
        }

        match credentials.iter().find(|c| c.realm == realm) {
            Some(creds) => {
                let result = self.check_credentials(request, creds, password, expires_delta, now);
                debug!(user = %creds.username, realm, ?result, "digest verification");
                result
            }
            None => {
                debug!(realm, "no credentials for realm");
                AuthResult::BadlyFormed
            }
        }
    }

    fn check_credentials(
        &self,
        request: &Request,
        creds: &DigestCredentials,
        password: &str,
        expires_delta: i64,
        now: i64,
    ) -> AuthResult {
        let Some(timestamp) = parse_nonce_timestamp(&creds.nonce) else {
            return AuthResult::BadlyFormed;
        };

        if expires_delta > 0 && now - timestamp > expires_delta {
            return AuthResult::Expired;
        }

        if self.make_nonce(request, timestamp) != creds.nonce {
            trace!(nonce = %creds.nonce, "nonce was not issued for this request");
            return AuthResult::Failed;
        }

        let expected = match &creds.qop {
            Some(Qop::Auth) => {
                let (Some(cnonce), Some(nc)) = (creds.cnonce.as_deref(), creds.nonce_count.as_deref()) else {
                    return AuthResult::BadlyFormed;
                };
                make_response_md5(
                    &creds.username,
                    password,
                    &creds.realm,
                    request.method.as_str(),
                    &creds.uri,
                    &creds.nonce,
                    Some("auth"),
                    cnonce,
                    nc,
                )
            }
            Some(_) => return AuthResult::Failed,
            None => make_response_md5(
                &creds.username,
                password,
                &creds.realm,
                request.method.as_str(),
                &creds.uri,
                &creds.nonce,
                None,
                "",
                "",
            ),
        };

        if expected == creds.response {
            AuthResult::Authenticated
        } else {
            AuthResult::Failed
        }
    }
}

/// Leading decimal timestamp of a nonce; `None` unless the nonce is
/// `digits ":" rest`.
fn parse_nonce_timestamp(nonce: &str) -> Option<i64> {
    let (ts, _) = nonce.split_once(':')?;
    if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    ts.parse().ok()
}

/// Answers every digest challenge in `challenge` (a 401 or 407) by adding
/// Authorization / Proxy-Authorization entries to `request`.
///
/// When any challenge offers `qop=auth`, `nonce_count` is incremented once
/// and used as the `nc` for this request.
pub fn add_authorization(
    request: &mut Request,
    challenge: &Response,
    username: &str,
    password: &str,
    cnonce: &str,
    nonce_count: &mut u32,
) -> Result<()> {
    if challenge.status != StatusCode::UNAUTHORIZED && challenge.status != StatusCode::PROXY_AUTHENTICATION_REQUIRED {
        return Err(Error::precondition(format!(
            "expected a 401 or 407 challenge, got {}",
            challenge.status
        )));
    }

    let mut nc: Option<String> = None;
    let mut next_nc = |nonce_count: &mut u32| -> String {
        nc.get_or_insert_with(|| {
            *nonce_count += 1;
            format!("{:08x}", *nonce_count)
        })
        .clone()
    };

    let uri = request.uri.to_string();
    let method = request.method.as_str().to_string();

    let mut answer = |c: &DigestChallenge, nonce_count: &mut u32| -> DigestCredentials {
        let mut creds = DigestCredentials {
            username: username.to_string(),
            realm: c.realm.clone(),
            nonce: c.nonce.clone(),
            uri: uri.clone(),
            algorithm: Some(c.algorithm.clone().unwrap_or(Algorithm::Md5)),
            opaque: c.opaque.clone(),
            ..Default::default()
        };
        if c.offers_auth_qop() {
            let nc = next_nc(nonce_count);
            creds.response = make_response_md5(
                username, password, &c.realm, &method, &uri, &c.nonce, Some("auth"), cnonce, &nc,
            );
            creds.qop = Some(Qop::Auth);
            creds.cnonce = Some(cnonce.to_string());
            creds.nonce_count = Some(nc);
        } else {
            creds.response =
                make_response_md5(username, password, &c.realm, &method, &uri, &c.nonce, None, "", "");
        }
        creds
    };

    for c in &challenge.headers.www_authenticates {
        let creds = answer(c, nonce_count);
        request.headers.authorizations.push(creds);
    }
    for c in &challenge.headers.proxy_authenticates {
        let creds = answer(c, nonce_count);
        request.headers.proxy_authorizations.push(creds);
    }
    Ok(())
}
