//! The per-transaction state machine.
//!
//! A [`Transaction`] is plain synchronous data: [`Transaction::process`]
//! consumes one [`Event`] and appends the resulting [`Action`]s. It never
//! touches a channel, a clock or the transaction table; the runner applies
//! the actions. Client-side transitions live in `client.rs`, server-side ones
//! in `server.rs`.

use std::collections::HashMap;
use std::time::Duration;

use sipxact_sip_core::{helper, Message, Method, Request, Response, Tuple};
use tracing::{debug, trace, warn};

use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{
    Action, Disposition, Event, OutboundMessage, TimerEvent, TransactionEvent, TransactionKey,
    TransactionKind, TransactionState,
};

/// One RFC 3261 transaction.
#[derive(Debug)]
pub struct Transaction {
    // Declared first: a parent's CANCEL child is released before anything else.
    pub(super) cancel: Option<Box<Transaction>>,
    pub(super) key: TransactionKey,
    pub(super) kind: TransactionKind,
    pub(super) state: TransactionState,
    pub(super) reliable: bool,
    /// The request that opened the transaction
    pub(super) request: Request,
    /// What a retransmission (timer or duplicate request) resends
    pub(super) msg_to_retransmit: Option<Message>,
    /// Remote end: request destination (client) or request source (server)
    pub(super) remote: Option<Tuple>,
    pub(super) settings: TimerSettings,
    /// Latest arming sequence per timer; anything else that fires is stale
    timers: HashMap<TimerType, u64>,
    next_seq: u64,
    /// Terminated, but a CANCEL child is still running
    pending_destroy: bool,
}

impl Transaction {
    pub(super) fn with_parts(
        key: TransactionKey,
        kind: TransactionKind,
        state: TransactionState,
        request: Request,
        remote: Option<Tuple>,
        settings: TimerSettings,
    ) -> Self {
        let reliable = match remote {
            Some(tuple) => tuple.transport.is_reliable(),
            None => request
                .headers
                .top_via()
                .map(|via| via.transport.is_reliable())
                .unwrap_or(false),
        };
        Self {
            cancel: None,
            key,
            kind,
            state,
            reliable,
            request,
            msg_to_retransmit: None,
            remote,
            settings,
            timers: HashMap::new(),
            next_seq: 0,
            pending_destroy: false,
        }
    }

    pub fn key(&self) -> &TransactionKey {
        &self.key
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    /// The request that created this transaction
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The CANCEL child, if one is running
    pub fn child(&self) -> Option<&Transaction> {
        self.cancel.as_deref()
    }

    pub fn child_key(&self) -> Option<TransactionKey> {
        self.cancel.as_ref().map(|c| c.key.clone())
    }

    /// True once the transaction has terminated but waits for its CANCEL child
    pub fn is_pending_destroy(&self) -> bool {
        self.pending_destroy
    }

    /// Timers that are armed and not yet superseded or fired
    pub fn armed_timers(&self) -> Vec<TimerType> {
        self.timers.keys().copied().collect()
    }

    /// Processes one event, appending side effects to `out`.
    pub fn process(&mut self, event: Event, out: &mut Vec<Action>) -> Disposition {
        if let Some(child_key) = self.child_key() {
            if event.key().as_ref() == Some(&child_key) {
                return self.process_child(event, out);
            }
        }

        if self.pending_destroy {
            trace!(id = %self.key, %event, "terminated, waiting for CANCEL child; dropping");
            return Disposition::Keep;
        }

        if let Event::Timer(timer) = &event {
            if !self.consume_timer(timer) {
                trace!(id = %self.key, timer = %timer.timer, seq = timer.seq, "stale timer");
                return Disposition::Keep;
            }
        }

        let disposition = match event {
            Event::TransportError { reason, .. } => {
                warn!(id = %self.key, %reason, "transport error, destroying transaction");
                self.to_tu(
                    TransactionEvent::TransportError {
                        transaction_id: self.key.clone(),
                        message: reason,
                    },
                    out,
                );
                Disposition::Destroy
            }
            event => match self.kind {
                TransactionKind::ClientInvite => self.process_client_invite(event, out),
                TransactionKind::ClientNonInvite => self.process_client_non_invite(event, out),
                TransactionKind::ServerInvite => self.process_server_invite(event, out),
                TransactionKind::ServerNonInvite => self.process_server_non_invite(event, out),
                TransactionKind::Stale => self.process_stale(event, out),
            },
        };
        self.settle(disposition)
    }

    fn process_child(&mut self, event: Event, out: &mut Vec<Action>) -> Disposition {
        let Some(child) = self.cancel.as_mut() else {
            return Disposition::Keep;
        };
        if child.process(event, out) == Disposition::Destroy {
            let child_key = child.key.clone();
            self.cancel = None;
            debug!(id = %self.key, child = %child_key, "CANCEL child finished");
            out.push(Action::ReleaseChild(child_key));
            if self.pending_destroy {
                return Disposition::Destroy;
            }
        }
        Disposition::Keep
    }

    /// Applies a terminal disposition, deferring it while a child is alive.
    fn settle(&mut self, disposition: Disposition) -> Disposition {
        if disposition == Disposition::Destroy {
            self.state = TransactionState::Terminated;
            self.timers.clear();
            self.msg_to_retransmit = None;
            if self.cancel.is_some() {
                debug!(id = %self.key, "terminated with a live CANCEL child, deferring destruction");
                self.pending_destroy = true;
                return Disposition::Keep;
            }
            debug!(id = %self.key, kind = ?self.kind, "transaction destroyed");
        }
        disposition
    }

    /// Starts the CANCEL child for this INVITE transaction.
    ///
    /// The child's key is registered before the child emits anything, so
    /// whatever the far end answers is routed here.
    pub(super) fn spawn_cancel_child(&mut self, cancel: Request, out: &mut Vec<Action>) {
        let Some(child_key) = TransactionKey::from_request(&cancel) else {
            warn!(id = %self.key, "CANCEL without transaction id, dropping");
            return;
        };
        out.push(Action::RegisterChild(child_key.clone()));
        let child = if self.kind.is_server() {
            Transaction::new_server(child_key, cancel, self.settings, out)
        } else {
            Transaction::new_client(child_key, cancel, self.settings, out)
        };
        debug!(id = %self.key, child = %child.key, "CANCEL child created");
        self.cancel = Some(Box::new(child));
    }

    /// Post-2xx mode for INVITE transactions.
    pub(super) fn enter_stale(&mut self, out: &mut Vec<Action>) {
        debug!(id = %self.key, "2xx seen, switching to stale bookkeeping");
        self.kind = TransactionKind::Stale;
        self.state = TransactionState::Terminated;
        self.timers.clear();
        self.msg_to_retransmit = None;
        self.start_timer(TimerType::Stale, self.settings.stale_window, out);
    }

    fn process_stale(&mut self, event: Event, out: &mut Vec<Action>) -> Disposition {
        match event {
            Event::Request(request) if request.method == Method::Ack => {
                if request.is_from_wire() {
                    self.to_tu(
                        TransactionEvent::Request {
                            transaction_id: self.key.clone(),
                            request,
                        },
                        out,
                    );
                } else {
                    self.send(Message::Request(request), false, out);
                }
                Disposition::Keep
            }
            Event::Response(response) if response.status.is_success() => {
                if response.is_from_wire() {
                    self.deliver_response(response, out);
                } else {
                    self.send(Message::Response(response), false, out);
                }
                Disposition::Keep
            }
            Event::Request(request) if request.method == Method::Cancel && request.is_from_wire() => {
                debug!(id = %self.key, "CANCEL after 2xx, starting it on its own");
                out.push(Action::StartTransaction(request));
                Disposition::Keep
            }
            Event::Timer(timer) if timer.timer == TimerType::Stale => Disposition::Destroy,
            other => {
                self.ignore(&other);
                Disposition::Keep
            }
        }
    }

    // Helpers shared by the four machines

    pub(super) fn send(&self, message: Message, retransmission: bool, out: &mut Vec<Action>) {
        let destination = match &message {
            Message::Request(r) => r.destination.or(self.remote),
            Message::Response(r) => r.destination.or(self.remote),
        };
        out.push(Action::ToWire(OutboundMessage {
            message,
            destination,
            retransmission,
        }));
    }

    pub(super) fn retransmit(&self, out: &mut Vec<Action>) {
        if let Some(message) = self.msg_to_retransmit.clone() {
            trace!(id = %self.key, state = %self.state, "retransmitting");
            self.send(message, true, out);
        }
    }

    pub(super) fn to_tu(&self, event: TransactionEvent, out: &mut Vec<Action>) {
        out.push(Action::ToTu(event));
    }

    pub(super) fn deliver_response(&self, response: Response, out: &mut Vec<Action>) {
        self.to_tu(
            TransactionEvent::Response {
                transaction_id: self.key.clone(),
                response,
            },
            out,
        );
    }

    /// Hands the TU a locally generated 408 for the pending request.
    pub(super) fn deliver_timeout_response(&self, out: &mut Vec<Action>) {
        debug!(id = %self.key, "transaction timed out, synthesizing 408");
        let response = helper::make_response(&self.request, 408, None);
        self.deliver_response(response, out);
    }

    pub(super) fn start_timer(&mut self, timer: TimerType, duration: Duration, out: &mut Vec<Action>) {
        self.next_seq += 1;
        self.timers.insert(timer, self.next_seq);
        out.push(Action::StartTimer(TimerEvent {
            key: self.key.clone(),
            timer,
            duration,
            seq: self.next_seq,
        }));
    }

    pub(super) fn cancel_timer(&mut self, timer: TimerType) {
        self.timers.remove(&timer);
    }

    pub(super) fn cancel_all_timers(&mut self) {
        self.timers.clear();
    }

    /// True (and forgets the arming) if `fired` is the current arming of its timer.
    fn consume_timer(&mut self, fired: &TimerEvent) -> bool {
        if fired.key != self.key || self.timers.get(&fired.timer) != Some(&fired.seq) {
            return false;
        }
        self.timers.remove(&fired.timer);
        true
    }

    pub(super) fn ignore(&self, event: &Event) {
        debug!(id = %self.key, kind = ?self.kind, state = %self.state, %event, "unexpected event, dropping");
    }
}
