//! Server transaction state machines (RFC 3261 §17.2).
//!
//! The INVITE server starts in `Trying` and answers with 100 Trying on its
//! own once `T100` passes without a provisional response from the TU.

use sipxact_sip_core::{helper, Message, Method, Request, Response};
use tracing::{debug, trace, warn};

use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{
    Action, Disposition, Event, TimerEvent, Transaction, TransactionEvent, TransactionKey,
    TransactionKind, TransactionState,
};

impl Transaction {
    /// Creates a server transaction for a request from the wire and hands the
    /// request to the TU.
    pub fn new_server(
        key: TransactionKey,
        request: Request,
        settings: TimerSettings,
        out: &mut Vec<Action>,
    ) -> Self {
        let kind = if request.method == Method::Invite {
            TransactionKind::ServerInvite
        } else {
            TransactionKind::ServerNonInvite
        };
        let remote = request.source;
        let mut tx = Self::with_parts(key, kind, TransactionState::Trying, request, remote, settings);
        debug!(id = %tx.key, ?kind, reliable = tx.reliable, "server transaction created");

        if kind == TransactionKind::ServerInvite {
            let trying = helper::make_response(&tx.request, 100, None);
            tx.msg_to_retransmit = Some(Message::Response(trying));
            tx.start_timer(TimerType::Trying, settings.t100, out);
        }
        tx.to_tu(
            TransactionEvent::Request {
                transaction_id: tx.key.clone(),
                request: tx.request.clone(),
            },
            out,
        );
        tx
    }

    pub(super) fn process_server_invite(&mut self, event: Event, out: &mut Vec<Action>) -> Disposition {
        match event {
            Event::Request(request) if request.is_from_wire() => match request.method {
                Method::Invite => {
                    self.server_invite_retransmission(out);
                    Disposition::Keep
                }
                Method::Ack => self.server_invite_ack(out),
                Method::Cancel => {
                    match self.state {
                        TransactionState::Trying | TransactionState::Proceeding
                            if self.cancel.is_none() =>
                        {
                            self.spawn_cancel_child(request, out);
                        }
                        TransactionState::Trying | TransactionState::Proceeding => {
                            trace!(id = %self.key, "CANCEL child already running, dropping")
                        }
                        _ => {
                            // Crossed our final response; still owed an answer from the TU
                            debug!(id = %self.key, state = %self.state, "CANCEL after final response, starting it on its own");
                            out.push(Action::StartTransaction(request));
                        }
                    }
                    Disposition::Keep
                }
                _ => {
                    self.ignore(&Event::Request(request));
                    Disposition::Keep
                }
            },
            Event::Response(response) if !response.is_from_wire() => {
                self.server_invite_response(response, out);
                Disposition::Keep
            }
            Event::Timer(timer) => self.server_invite_timer(timer, out),
            other => {
                self.ignore(&other);
                Disposition::Keep
            }
        }
    }

    fn server_invite_retransmission(&mut self, out: &mut Vec<Action>) {
        match self.state {
            TransactionState::Trying => {
                // Answer the retransmission right away rather than waiting for T100
                trace!(id = %self.key, "INVITE retransmitted before 100 Trying, sending it now");
                self.cancel_timer(TimerType::Trying);
                self.send_trying(out);
            }
            TransactionState::Proceeding | TransactionState::Completed => self.retransmit(out),
            _ => trace!(id = %self.key, state = %self.state, "absorbing INVITE retransmission"),
        }
    }

    /// First transmission of the prebuilt 100 Trying.
    fn send_trying(&mut self, out: &mut Vec<Action>) {
        self.state = TransactionState::Proceeding;
        if let Some(trying) = self.msg_to_retransmit.clone() {
            self.send(trying, false, out);
        }
    }

    fn server_invite_ack(&mut self, out: &mut Vec<Action>) -> Disposition {
        match self.state {
            TransactionState::Completed if self.reliable => Disposition::Destroy,
            TransactionState::Completed => {
                self.state = TransactionState::Confirmed;
                self.cancel_all_timers();
                self.start_timer(TimerType::I, self.settings.t4, out);
                Disposition::Keep
            }
            TransactionState::Confirmed => {
                trace!(id = %self.key, "absorbing ACK retransmission");
                Disposition::Keep
            }
            state => {
                debug!(id = %self.key, %state, "ACK before final response, dropping");
                Disposition::Keep
            }
        }
    }

    fn server_invite_response(&mut self, response: Response, out: &mut Vec<Action>) {
        let status = response.status;
        if !matches!(self.state, TransactionState::Trying | TransactionState::Proceeding) {
            warn!(id = %self.key, %status, state = %self.state, "response after final, dropping");
            return;
        }

        if status.is_provisional() {
            if status.as_u16() == 100 && self.state == TransactionState::Proceeding {
                trace!(id = %self.key, "100 Trying already sent, dropping");
                return;
            }
            self.state = TransactionState::Proceeding;
            self.cancel_timer(TimerType::Trying);
            let message = Message::Response(response);
            self.send(message.clone(), false, out);
            self.msg_to_retransmit = Some(message);
        } else if status.is_success() {
            self.send(Message::Response(response), false, out);
            self.enter_stale(out);
        } else {
            let message = Message::Response(response);
            self.send(message.clone(), false, out);
            self.state = TransactionState::Completed;
            self.cancel_all_timers();
            self.msg_to_retransmit = Some(message);
            self.start_timer(TimerType::H, self.settings.transaction_timeout(), out);
            if !self.reliable {
                self.start_timer(TimerType::G, self.settings.t1, out);
            }
        }
    }

    fn server_invite_timer(&mut self, timer: TimerEvent, out: &mut Vec<Action>) -> Disposition {
        match (timer.timer, self.state) {
            (TimerType::Trying, TransactionState::Trying) => {
                trace!(id = %self.key, "TU silent for T100, sending 100 Trying");
                self.send_trying(out);
                Disposition::Keep
            }
            (TimerType::G, TransactionState::Completed) => {
                self.retransmit(out);
                self.start_timer(TimerType::G, self.settings.backoff(timer.duration), out);
                Disposition::Keep
            }
            (TimerType::H, TransactionState::Completed) => {
                warn!(id = %self.key, "no ACK for final response");
                self.to_tu(
                    TransactionEvent::Timeout {
                        transaction_id: self.key.clone(),
                    },
                    out,
                );
                Disposition::Destroy
            }
            (TimerType::I, TransactionState::Confirmed) => Disposition::Destroy,
            (fired, state) => {
                trace!(id = %self.key, timer = %fired, %state, "timer not applicable");
                Disposition::Keep
            }
        }
    }

    pub(super) fn process_server_non_invite(&mut self, event: Event, out: &mut Vec<Action>) -> Disposition {
        match event {
            Event::Request(request) if request.is_from_wire() && request.method == self.request.method => {
                match self.state {
                    TransactionState::Trying => {
                        trace!(id = %self.key, "retransmission before any response, absorbing")
                    }
                    _ => self.retransmit(out),
                }
                Disposition::Keep
            }
            Event::Response(response) if !response.is_from_wire() => {
                self.server_non_invite_response(response, out)
            }
            Event::Timer(timer) => match (timer.timer, self.state) {
                (TimerType::J, TransactionState::Completed) => Disposition::Destroy,
                (fired, state) => {
                    trace!(id = %self.key, timer = %fired, %state, "timer not applicable");
                    Disposition::Keep
                }
            },
            other => {
                self.ignore(&other);
                Disposition::Keep
            }
        }
    }

    fn server_non_invite_response(&mut self, response: Response, out: &mut Vec<Action>) -> Disposition {
        let status = response.status;
        if !matches!(self.state, TransactionState::Trying | TransactionState::Proceeding) {
            warn!(id = %self.key, %status, state = %self.state, "response after final, dropping");
            return Disposition::Keep;
        }

        let message = Message::Response(response);
        self.send(message.clone(), false, out);
        self.msg_to_retransmit = Some(message);
        if status.is_provisional() {
            self.state = TransactionState::Proceeding;
            return Disposition::Keep;
        }
        if self.reliable {
            return Disposition::Destroy;
        }
        self.state = TransactionState::Completed;
        self.start_timer(TimerType::J, self.settings.transaction_timeout(), out);
        Disposition::Keep
    }
}
