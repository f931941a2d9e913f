use std::fmt;

use crate::types::param::Param;
use crate::types::transport::Transport;

/// Magic cookie that prefixes every RFC 3261 compliant branch parameter.
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// A single Via entry (`SIP/2.0/<transport> host[:port];params`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Via {
    pub transport: Transport,
    /// Sent-by host. Empty on a placeholder the transport fills in on send.
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
}

impl Via {
    pub fn new(transport: Transport, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            transport,
            host: host.into(),
            port,
            params: Vec::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.set_branch(branch);
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// The branch parameter, if present
    pub fn branch(&self) -> Option<&str> {
        self.params.iter().find_map(|p| match p {
            Param::Branch(b) => Some(b.as_str()),
            _ => None,
        })
    }

    /// Replaces the branch parameter.
    pub fn set_branch(&mut self, branch: impl Into<String>) {
        self.params.retain(|p| !matches!(p, Param::Branch(_)));
        self.params.insert(0, Param::Branch(branch.into()));
    }

    /// True if the branch starts with the RFC 3261 magic cookie
    pub fn has_magic_cookie(&self) -> bool {
        self.branch()
            .map(|b| b.starts_with(BRANCH_MAGIC_COOKIE))
            .unwrap_or(false)
    }

    /// `Some(value)` if the `rport` parameter is present (value may be unset).
    pub fn rport(&self) -> Option<Option<u16>> {
        self.params.iter().find_map(|p| match p {
            Param::Rport(port) => Some(*port),
            _ => None,
        })
    }

    /// `host[:port]` exactly as it appears in the header
    pub fn sent_by(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport, self.sent_by())?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}
