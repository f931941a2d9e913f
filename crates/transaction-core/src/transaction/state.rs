use std::fmt;

/// Represents the state of a SIP transaction, aligned with the state machines
/// defined in RFC 3261 (Section 17).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// **Client INVITE only:** INVITE sent, nothing heard yet.
    Calling,
    /// **Client non-INVITE:** request sent, nothing heard yet.
    /// **Server INVITE / non-INVITE:** request received, TU has not responded.
    Trying,
    /// A provisional response has been received (client) or sent (server).
    Proceeding,
    /// A final response has been received (client) or sent (server); the
    /// transaction lingers to absorb retransmissions.
    Completed,
    /// **Server INVITE only:** ACK for a non-2xx final received.
    Confirmed,
    /// Finished. A transaction in this state with a live CANCEL child waits
    /// for the child before it is reclaimed.
    Terminated,
}

impl TransactionState {
    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which state machine a transaction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    ClientInvite,
    ClientNonInvite,
    ServerInvite,
    ServerNonInvite,
    /// Bookkeeping after a 2xx to INVITE: keeps the id resolvable so 2xx
    /// retransmissions and their ACKs pass through, then expires.
    Stale,
}

impl TransactionKind {
    pub fn is_server(&self) -> bool {
        matches!(self, TransactionKind::ServerInvite | TransactionKind::ServerNonInvite)
    }
}
