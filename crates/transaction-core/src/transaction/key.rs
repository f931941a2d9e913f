use std::fmt;

use sipxact_sip_core::{Message, Method, Request, Response, BRANCH_MAGIC_COOKIE};

/// Uniquely identifies a SIP transaction.
///
/// According to RFC 3261 §17.1.3 and §17.2.3 the identifier is the `branch`
/// of the topmost Via plus the request method, and client and server
/// transactions live in separate namespaces. This key is that triple:
///
/// - `branch`: the top Via branch, or the RFC 2543 compatibility id when the
///   branch does not start with `z9hG4bK`
/// - `method`: the request method, with ACK folded into INVITE so the ACK
///   for a non-2xx final reaches the INVITE server transaction. CANCEL keeps
///   its own method, which gives a CANCEL child a distinct id.
/// - `is_server`: `true` for requests from the wire and responses from the TU
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub branch: String,
    pub method: Method,
    pub is_server: bool,
}

impl TransactionKey {
    /// Creates a new `TransactionKey`. ACK is folded into INVITE.
    pub fn new(branch: String, method: Method, is_server: bool) -> Self {
        Self {
            branch,
            method: normalize(method),
            is_server,
        }
    }

    /// Key for a request; server side if it came from the wire.
    ///
    /// Returns `None` when the request has neither a usable branch nor the
    /// headers needed for the compatibility id.
    pub fn from_request(request: &Request) -> Option<Self> {
        let branch = branch_or_legacy_id(&request.headers)?;
        Some(Self::new(branch, request.method.clone(), request.is_from_wire()))
    }

    /// Key for a response; server side if it came from the TU.
    pub fn from_response(response: &Response) -> Option<Self> {
        let branch = branch_or_legacy_id(&response.headers)?;
        let method = response.headers.cseq.as_ref()?.method.clone();
        Some(Self::new(branch, method, !response.is_from_wire()))
    }

    pub fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::Request(r) => Self::from_request(r),
            Message::Response(r) => Self::from_response(r),
        }
    }

    /// Returns the branch parameter of the transaction key.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Returns the method associated with the transaction key.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns `true` if the key is for a server transaction, `false` otherwise.
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Returns a new TransactionKey with a different method but the same branch and side
    pub fn with_method(&self, method: Method) -> Self {
        Self::new(self.branch.clone(), method, self.is_server)
    }

    /// For a CANCEL key, the key of the INVITE it cancels.
    pub fn invite_parent(&self) -> Option<Self> {
        (self.method == Method::Cancel).then(|| self.with_method(Method::Invite))
    }
}

fn normalize(method: Method) -> Method {
    match method {
        Method::Ack => Method::Invite,
        other => other,
    }
}

fn branch_or_legacy_id(headers: &sipxact_sip_core::Headers) -> Option<String> {
    match headers.top_branch() {
        Some(branch) if branch.starts_with(BRANCH_MAGIC_COOKIE) => Some(branch.to_string()),
        _ => headers.rfc2543_transaction_id(),
    }
}

/// Format: "branch:METHOD:side"
impl fmt::Debug for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server { "server" } else { "client" };
        write!(f, "{}:{}:{}", self.branch, self.method, side)
    }
}

/// Format: "Key(branch:METHOD:side)"
impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server { "server" } else { "client" };
        write!(f, "Key({}:{}:{})", self.branch, self.method, side)
    }
}
