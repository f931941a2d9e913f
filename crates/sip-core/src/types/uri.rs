//! A minimal SIP URI.
//!
//! Full RFC 3261 URI grammar belongs to the parser; this type only knows
//! enough structure for the message factory (scheme, user, host, port and
//! parameters) and a lenient `FromStr` used by `make_uri` and tests.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::param::Param;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    /// `sip`, `sips`, `tel`...
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
}

impl Uri {
    /// A `sip:` URI for the given host.
    pub fn sip(host: impl Into<String>) -> Self {
        Self {
            scheme: "sip".to_string(),
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Value of the `transport` URI parameter, if any
    pub fn transport(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            Param::Transport(t) => Some(t.as_str()),
            _ => None,
        })
    }

    /// True if the URI carries the `lr` flag
    pub fn is_loose_route(&self) -> bool {
        self.params.iter().any(|p| matches!(p, Param::Lr))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('<').trim_end_matches('>');
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidUri(format!("missing scheme in '{}'", s)))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return Err(Error::InvalidUri(format!("bad scheme in '{}'", s)));
        }

        let mut parts = rest.split(';');
        let authority = parts.next().unwrap_or_default();
        let params = parts.filter(|p| !p.is_empty()).map(Param::parse).collect();

        let (user, hostport) = match authority.rsplit_once('@') {
            Some((user, hostport)) => (Some(user.to_string()), hostport),
            None => (None, authority),
        };

        let (host, port) = split_host_port(hostport)?;
        if host.is_empty() {
            return Err(Error::InvalidUri(format!("missing host in '{}'", s)));
        }

        Ok(Uri {
            scheme: scheme.to_ascii_lowercase(),
            user,
            host,
            port,
            params,
        })
    }
}

/// Splits `host[:port]`, keeping bracketed IPv6 references intact.
pub(crate) fn split_host_port(hostport: &str) -> Result<(String, Option<u16>)> {
    if let Some(end) = hostport.find(']') {
        let host = &hostport[..=end];
        let port = match hostport[end + 1..].strip_prefix(':') {
            Some(p) => Some(parse_port(p)?),
            None => None,
        };
        return Ok((host.to_string(), port));
    }
    match hostport.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?))),
        None => Ok((hostport.to_string(), None)),
    }
}

fn parse_port(p: &str) -> Result<u16> {
    p.parse()
        .map_err(|_| Error::InvalidUri(format!("invalid port '{}'", p)))
}
