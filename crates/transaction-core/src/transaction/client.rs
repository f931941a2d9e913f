//! Client transaction state machines (RFC 3261 §17.1).
//!
//! ```text
//!  INVITE:      Calling --1xx--> Proceeding --300-699--> Completed --D--> gone
//!                  |                 |
//!                  +------2xx--------+-----> Stale
//!                  |                 |
//!                  +-------B---------+-----> 408 to TU, gone
//!
//!  non-INVITE:  Trying --1xx--> Proceeding --final--> Completed --K--> gone
//! ```

use sipxact_sip_core::{helper, Message, Method, Request, Response};
use tracing::{debug, trace, warn};

use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{
    Action, Disposition, Event, TimerEvent, Transaction, TransactionKey, TransactionKind,
    TransactionState,
};

impl Transaction {
    /// Creates a client transaction for a TU request and sends it.
    pub fn new_client(
        key: TransactionKey,
        request: Request,
        settings: TimerSettings,
        out: &mut Vec<Action>,
    ) -> Self {
        let (kind, state) = if request.method == Method::Invite {
            (TransactionKind::ClientInvite, TransactionState::Calling)
        } else {
            (TransactionKind::ClientNonInvite, TransactionState::Trying)
        };
        let remote = request.destination;
        let mut tx = Self::with_parts(key, kind, state, request, remote, settings);
        debug!(id = %tx.key, ?kind, reliable = tx.reliable, "client transaction created");

        let message = Message::Request(tx.request.clone());
        tx.send(message.clone(), false, out);
        tx.msg_to_retransmit = Some(message);

        let timeout = settings.transaction_timeout();
        match kind {
            TransactionKind::ClientInvite => {
                tx.start_timer(TimerType::B, timeout, out);
                if !tx.reliable {
                    tx.start_timer(TimerType::A, settings.t1, out);
                }
            }
            _ => {
                tx.start_timer(TimerType::F, timeout, out);
                if !tx.reliable {
                    tx.start_timer(TimerType::E1, settings.t1, out);
                }
            }
        }
        tx
    }

    pub(super) fn process_client_invite(&mut self, event: Event, out: &mut Vec<Action>) -> Disposition {
        match event {
            Event::Request(request) if request.method == Method::Cancel && !request.is_from_wire() => {
                match self.state {
                    TransactionState::Calling | TransactionState::Proceeding if self.cancel.is_none() => {
                        self.spawn_cancel_child(request, out);
                    }
                    _ => debug!(id = %self.key, state = %self.state, "CANCEL not applicable, dropping"),
                }
                Disposition::Keep
            }
            Event::Response(response) if response.is_from_wire() => {
                self.client_invite_response(response, out)
            }
            Event::Timer(timer) => self.client_invite_timer(timer, out),
            other => {
                self.ignore(&other);
                Disposition::Keep
            }
        }
    }

    fn client_invite_response(&mut self, response: Response, out: &mut Vec<Action>) -> Disposition {
        let status = response.status;
        if status.is_provisional() {
            match self.state {
                TransactionState::Calling => {
                    self.state = TransactionState::Proceeding;
                    self.cancel_timer(TimerType::A);
                }
                TransactionState::Proceeding => {}
                _ => {
                    trace!(id = %self.key, %status, state = %self.state, "late provisional, dropping");
                    return Disposition::Keep;
                }
            }
            self.deliver_response(response, out);
            return Disposition::Keep;
        }

        if status.is_success() {
            match self.state {
                TransactionState::Calling | TransactionState::Proceeding => {
                    self.enter_stale(out);
                    self.deliver_response(response, out);
                }
                _ => trace!(id = %self.key, %status, state = %self.state, "2xx after failure, dropping"),
            }
            return Disposition::Keep;
        }

        match self.state {
            TransactionState::Calling | TransactionState::Proceeding => {
                let ack = match helper::make_failure_ack(&self.request, &response) {
                    Ok(ack) => Some(Message::Request(ack)),
                    Err(e) => {
                        warn!(id = %self.key, error = %e, "could not build ACK");
                        None
                    }
                };
                if let Some(ack) = &ack {
                    self.send(ack.clone(), false, out);
                }
                self.deliver_response(response, out);
                if self.reliable {
                    return Disposition::Destroy;
                }
                self.state = TransactionState::Completed;
                self.cancel_all_timers();
                self.msg_to_retransmit = ack;
                self.start_timer(TimerType::D, self.settings.timer_d, out);
                Disposition::Keep
            }
            TransactionState::Completed => {
                // The ACK got lost: acknowledge again
                self.retransmit(out);
                self.deliver_response(response, out);
                Disposition::Keep
            }
            _ => {
                trace!(id = %self.key, %status, state = %self.state, "dropping response");
                Disposition::Keep
            }
        }
    }

    fn client_invite_timer(&mut self, timer: TimerEvent, out: &mut Vec<Action>) -> Disposition {
        match (timer.timer, self.state) {
            (TimerType::A, TransactionState::Calling) => {
                self.retransmit(out);
                self.start_timer(TimerType::A, self.settings.backoff(timer.duration), out);
                Disposition::Keep
            }
            (TimerType::B, TransactionState::Calling | TransactionState::Proceeding) => {
                self.deliver_timeout_response(out);
                Disposition::Destroy
            }
            (TimerType::D, TransactionState::Completed) => Disposition::Destroy,
            (fired, state) => {
                trace!(id = %self.key, timer = %fired, %state, "timer not applicable");
                Disposition::Keep
            }
        }
    }

    pub(super) fn process_client_non_invite(&mut self, event: Event, out: &mut Vec<Action>) -> Disposition {
        match event {
            Event::Response(response) if response.is_from_wire() => {
                self.client_non_invite_response(response, out)
            }
            Event::Timer(timer) => self.client_non_invite_timer(timer, out),
            other => {
                self.ignore(&other);
                Disposition::Keep
            }
        }
    }

    fn client_non_invite_response(&mut self, response: Response, out: &mut Vec<Action>) -> Disposition {
        let status = response.status;
        if status.is_provisional() {
            match self.state {
                TransactionState::Trying => {
                    self.state = TransactionState::Proceeding;
                    self.cancel_timer(TimerType::E1);
                    if !self.reliable {
                        self.start_timer(TimerType::E2, self.settings.t2, out);
                    }
                }
                TransactionState::Proceeding => {}
                _ => {
                    trace!(id = %self.key, %status, state = %self.state, "late provisional, dropping");
                    return Disposition::Keep;
                }
            }
            self.deliver_response(response, out);
            return Disposition::Keep;
        }

        match self.state {
            TransactionState::Trying | TransactionState::Proceeding => {
                self.deliver_response(response, out);
                if self.reliable {
                    return Disposition::Destroy;
                }
                self.state = TransactionState::Completed;
                self.cancel_all_timers();
                self.msg_to_retransmit = None;
                self.start_timer(TimerType::K, self.settings.t4, out);
                Disposition::Keep
            }
            _ => {
                trace!(id = %self.key, %status, "retransmitted final response, absorbing");
                Disposition::Keep
            }
        }
    }

    fn client_non_invite_timer(&mut self, timer: TimerEvent, out: &mut Vec<Action>) -> Disposition {
        match (timer.timer, self.state) {
            (TimerType::E1, TransactionState::Trying) => {
                self.retransmit(out);
                self.start_timer(TimerType::E1, self.settings.backoff(timer.duration), out);
                Disposition::Keep
            }
            (TimerType::E2, TransactionState::Proceeding) => {
                self.retransmit(out);
                self.start_timer(TimerType::E2, self.settings.t2, out);
                Disposition::Keep
            }
            (TimerType::F, TransactionState::Trying | TransactionState::Proceeding) => {
                self.deliver_timeout_response(out);
                Disposition::Destroy
            }
            (TimerType::K, TransactionState::Completed) => Disposition::Destroy,
            (fired, state) => {
                trace!(id = %self.key, timer = %fired, %state, "timer not applicable");
                Disposition::Keep
            }
        }
    }
}
