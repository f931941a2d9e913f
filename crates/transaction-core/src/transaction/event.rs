//! Everything that flows into and out of a transaction.

use std::fmt;
use std::time::Duration;

use sipxact_sip_core::{Message, Request, Response, Tuple};

use crate::timer::TimerType;
use crate::transaction::TransactionKey;

/// A fired (or to-be-scheduled) timer for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent {
    pub key: TransactionKey,
    pub timer: TimerType,
    /// The duration this timer was armed with; backoff timers derive the next
    /// interval from it
    pub duration: Duration,
    /// Arming sequence number. A fire whose number is no longer current is stale.
    pub seq: u64,
}

/// The single input type of the transaction layer.
#[derive(Debug, Clone)]
pub enum Event {
    /// A request from the wire or from the TU (see [`Request::origin`])
    Request(Request),
    /// A response from the wire or from the TU
    Response(Response),
    /// A timer fired
    Timer(TimerEvent),
    /// The transport failed to deliver a message of this transaction
    TransportError { key: TransactionKey, reason: String },
}

impl Event {
    /// The transaction this event belongs to, if one can be derived.
    pub fn key(&self) -> Option<TransactionKey> {
        match self {
            Event::Request(r) => TransactionKey::from_request(r),
            Event::Response(r) => TransactionKey::from_response(r),
            Event::Timer(t) => Some(t.key.clone()),
            Event::TransportError { key, .. } => Some(key.clone()),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Request(r) => write!(f, "request {} ({:?})", r.method, r.origin),
            Event::Response(r) => write!(f, "response {} ({:?})", r.status, r.origin),
            Event::Timer(t) => write!(f, "timer {} #{}", t.timer, t.seq),
            Event::TransportError { reason, .. } => write!(f, "transport error: {}", reason),
        }
    }
}

/// Events delivered to the transaction user.
#[derive(Debug, Clone)]
pub enum TransactionEvent {
    /// A request for the TU (new server transaction, CANCEL, or a
    /// statelessly forwarded ACK)
    Request {
        transaction_id: TransactionKey,
        request: Request,
    },
    /// A response for the TU. Includes the 408 synthesized when Timer B or F fires.
    Response {
        transaction_id: TransactionKey,
        response: Response,
    },
    /// The transport failed and the transaction was destroyed
    TransportError {
        transaction_id: TransactionKey,
        message: String,
    },
    /// Timer H fired: no ACK arrived for a non-2xx final response
    Timeout { transaction_id: TransactionKey },
    /// The transaction id is no longer resolvable
    TransactionTerminated { transaction_id: TransactionKey },
}

impl TransactionEvent {
    pub fn transaction_id(&self) -> &TransactionKey {
        match self {
            TransactionEvent::Request { transaction_id, .. }
            | TransactionEvent::Response { transaction_id, .. }
            | TransactionEvent::TransportError { transaction_id, .. }
            | TransactionEvent::Timeout { transaction_id }
            | TransactionEvent::TransactionTerminated { transaction_id } => transaction_id,
        }
    }
}

/// A message handed to the transport for sending.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub message: Message,
    /// `None` lets the transport resolve the target from the message itself
    pub destination: Option<Tuple>,
    /// True when this is a resend of a message already on the wire
    pub retransmission: bool,
}

/// Side effects requested by a state machine step, applied in order by the runner.
#[derive(Debug, Clone)]
pub enum Action {
    ToWire(OutboundMessage),
    ToTu(TransactionEvent),
    StartTimer(TimerEvent),
    /// Route events for this key to the current worker from now on
    RegisterChild(TransactionKey),
    /// The child under this key is gone
    ReleaseChild(TransactionKey),
    /// Run this request as a transaction of its own, outside the current one
    StartTransaction(Request),
}

/// Whether the transaction survives the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Destroy,
}
