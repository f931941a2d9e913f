//! Typed digest challenge and credential headers (RFC 2617 / RFC 3261 §22).
//!
//! [`DigestChallenge`] backs WWW-Authenticate and Proxy-Authenticate;
//! [`DigestCredentials`] backs Authorization and Proxy-Authorization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Digest algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// MD5 algorithm (RFC 2617)
    Md5,
    /// Anything else; carried but never computed
    Other(String),
}

impl Algorithm {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("MD5") {
            Algorithm::Md5
        } else {
            Algorithm::Other(s.to_string())
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Md5 => write!(f, "MD5"),
            Algorithm::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Quality of protection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Qop {
    /// Authentication only
    Auth,
    /// Authentication with message integrity protection
    AuthInt,
    /// Other QOP values
    Other(String),
}

impl Qop {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth" => Qop::Auth,
            "auth-int" => Qop::AuthInt,
            _ => Qop::Other(s.trim().to_string()),
        }
    }

    /// Parses a `qop-options` list such as `"auth,auth-int"`.
    pub fn parse_options(s: &str) -> Vec<Qop> {
        s.split(',')
            .filter(|q| !q.trim().is_empty())
            .map(Qop::parse)
            .collect()
    }
}

impl fmt::Display for Qop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qop::Auth => write!(f, "auth"),
            Qop::AuthInt => write!(f, "auth-int"),
            Qop::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A `Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: Option<Algorithm>,
    pub opaque: Option<String>,
    /// The offered `qop-options`, in order
    pub qop_options: Vec<Qop>,
    pub stale: bool,
}

impl DigestChallenge {
    pub fn new(realm: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            nonce: nonce.into(),
            ..Default::default()
        }
    }

    /// True if `qop=auth` is among the offered options
    pub fn offers_auth_qop(&self) -> bool {
        self.qop_options.contains(&Qop::Auth)
    }
}

impl fmt::Display for DigestChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest realm=\"{}\", nonce=\"{}\"", self.realm, self.nonce)?;
        if let Some(algorithm) = &self.algorithm {
            write!(f, ", algorithm={}", algorithm)?;
        }
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{}\"", opaque)?;
        }
        if !self.qop_options.is_empty() {
            let options: Vec<String> = self.qop_options.iter().map(|q| q.to_string()).collect();
            write!(f, ", qop=\"{}\"", options.join(","))?;
        }
        if self.stale {
            write!(f, ", stale=TRUE")?;
        }
        Ok(())
    }
}

/// `Digest` credentials presented in Authorization / Proxy-Authorization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    /// The digest-uri
    pub uri: String,
    /// 32 lower-case hex digits
    pub response: String,
    pub algorithm: Option<Algorithm>,
    pub cnonce: Option<String>,
    pub opaque: Option<String>,
    pub qop: Option<Qop>,
    /// `nc`, eight hex digits
    pub nonce_count: Option<String>,
}

impl fmt::Display for DigestCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            self.username, self.realm, self.nonce, self.uri, self.response
        )?;
        if let Some(algorithm) = &self.algorithm {
            write!(f, ", algorithm={}", algorithm)?;
        }
        if let Some(cnonce) = &self.cnonce {
            write!(f, ", cnonce=\"{}\"", cnonce)?;
        }
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{}\"", opaque)?;
        }
        if let Some(qop) = &self.qop {
            write!(f, ", qop={}", qop)?;
        }
        if let Some(nc) = &self.nonce_count {
            write!(f, ", nc={}", nc)?;
        }
        Ok(())
    }
}
