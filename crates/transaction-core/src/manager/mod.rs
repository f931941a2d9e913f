//! # Transaction Manager
//!
//! The [`TransactionManager`] is the entry point of the transaction layer.
//! It owns the transaction table and a single dispatcher task that consumes
//! every [`Event`] (messages from the transport, messages from the TU,
//! fired timers and transport errors) in arrival order:
//!
//! ```text
//!   transport ──┐                                     ┌──> wire channel (OutboundMessage)
//!   TU ─────────┼──> events ──> dispatcher ──> task ──┤
//!   timers ─────┘                  │                  └──> TU channel (TransactionEvent)
//!                                  └── table: id -> task input
//! ```
//!
//! ## Dispatch rules
//!
//! 1. An event whose id is in the table goes to the owning task.
//! 2. A CANCEL with no entry of its own goes to the INVITE transaction on the
//!    same branch. That transaction starts it as its CANCEL child, or as a
//!    transaction of its own once the INVITE has its final response.
//! 3. Otherwise a request creates a transaction: server side when it came
//!    from the wire, client side when it came from the TU. An ACK never
//!    creates one; it is forwarded statelessly.
//! 4. A response with no transaction is discarded or forwarded, per
//!    [`TransactionConfig::discard_stray_responses`].
//! 5. Timers and transport errors for unknown ids are logged and dropped.
//!
//! The manager must be created inside a tokio runtime.

use std::sync::Arc;

use dashmap::DashMap;
use sipxact_sip_core::{Message, Method, Origin, Request, Response, Tuple};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::TransactionConfig;
use crate::error::{Error, Result};
use crate::timer::TimerQueue;
use crate::transaction::{
    start_transaction, Event, OutboundMessage, TransactionContext, TransactionEvent,
    TransactionKey, TransactionTable,
};

/// Receiving ends of the two outbound channels.
#[derive(Debug)]
pub struct TransactionChannels {
    /// Messages for the transport to send
    pub wire_rx: mpsc::Receiver<OutboundMessage>,
    /// Events for the transaction user
    pub tu_rx: mpsc::Receiver<TransactionEvent>,
}

/// Front door of the transaction layer.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    table: TransactionTable,
    events_tx: mpsc::UnboundedSender<Event>,
    config: TransactionConfig,
}

impl TransactionManager {
    /// Creates the manager and starts its dispatcher task.
    pub fn new(config: TransactionConfig) -> Result<(Self, TransactionChannels)> {
        config.validate().map_err(Error::InvalidConfig)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (wire_tx, wire_rx) = mpsc::channel(config.wire_channel_capacity);
        let (tu_tx, tu_rx) = mpsc::channel(config.tu_channel_capacity);
        let table: TransactionTable = Arc::new(DashMap::new());

        let dispatcher = Dispatcher {
            ctx: TransactionContext {
                table: table.clone(),
                timers: TimerQueue::new(events_tx.clone()),
                settings: config.timers,
                wire_tx,
                tu_tx,
            },
            discard_stray_responses: config.discard_stray_responses,
        };
        tokio::spawn(dispatcher.run(events_rx));
        info!("transaction manager started");

        let manager = Self {
            table,
            events_tx,
            config,
        };
        Ok((manager, TransactionChannels { wire_rx, tu_rx }))
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Sender for injecting raw events.
    pub fn events_tx(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    /// Queues any event for dispatch.
    pub fn submit(&self, event: Event) -> Result<()> {
        self.events_tx.send(event)?;
        Ok(())
    }

    /// Sends a request from the TU, creating a client transaction (or, for a
    /// CANCEL, a child of the INVITE it cancels).
    ///
    /// Returns the id the TU will see on every event of the transaction.
    pub fn send_request(&self, mut request: Request) -> Result<TransactionKey> {
        request.origin = Origin::TransactionUser;
        let key = TransactionKey::from_request(&request)
            .ok_or_else(|| Error::NoTransactionId(format!("{} request", request.method)))?;
        if request.method != Method::Ack && self.table.contains_key(&key) {
            return Err(Error::TransactionExists(key));
        }
        self.submit(Event::Request(request))?;
        Ok(key)
    }

    /// Sends a response from the TU through its server transaction.
    pub fn send_response(&self, mut response: Response) -> Result<TransactionKey> {
        response.origin = Origin::TransactionUser;
        let key = TransactionKey::from_response(&response)
            .ok_or_else(|| Error::NoTransactionId(format!("{} response", response.status)))?;
        if !self.table.contains_key(&key) {
            return Err(Error::TransactionNotFound(key));
        }
        self.submit(Event::Response(response))?;
        Ok(key)
    }

    /// Feeds a message received by the transport.
    pub fn receive(&self, message: Message, source: Tuple) -> Result<()> {
        let event = match message {
            Message::Request(mut request) => {
                request.origin = Origin::Wire;
                request.source = Some(source);
                Event::Request(request)
            }
            Message::Response(mut response) => {
                response.origin = Origin::Wire;
                response.source = Some(source);
                Event::Response(response)
            }
        };
        self.submit(event)
    }

    /// Reports that the transport could not deliver a message of `key`.
    pub fn transport_error(&self, key: TransactionKey, reason: impl Into<String>) -> Result<()> {
        self.submit(Event::TransportError {
            key,
            reason: reason.into(),
        })
    }

    /// True while `key` resolves to a live transaction (or CANCEL child).
    pub fn transaction_exists(&self, key: &TransactionKey) -> bool {
        self.table.contains_key(key)
    }

    pub fn transaction_count(&self) -> usize {
        self.table.len()
    }

    pub fn active_transactions(&self) -> Vec<TransactionKey> {
        self.table.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// State of the dispatcher task.
struct Dispatcher {
    ctx: TransactionContext,
    discard_stray_responses: bool,
}

impl Dispatcher {
    async fn run(self, mut events_rx: mpsc::UnboundedReceiver<Event>) {
        debug!("dispatcher loop starting");
        while let Some(event) = events_rx.recv().await {
            self.dispatch(event);
        }
        debug!("dispatcher loop ended");
    }

    fn dispatch(&self, event: Event) {
        let Some(key) = event.key() else {
            warn!(%event, "event without transaction id, discarding");
            return;
        };

        let event = match self.route(&key, event) {
            Ok(()) => return,
            Err(event) => event,
        };

        // A CANCEL without its own entry belongs to the INVITE on the same branch
        let event = match key.invite_parent() {
            Some(parent) => match self.route(&parent, event) {
                Ok(()) => {
                    trace!(id = %key, parent = %parent, "CANCEL routed to INVITE transaction");
                    return;
                }
                Err(event) => event,
            },
            None => event,
        };

        match event {
            Event::Request(request) if request.method == Method::Ack => self.forward_ack(key, request),
            Event::Request(request) => start_transaction(&self.ctx, key, request),
            Event::Response(response) => self.stray_response(key, response),
            Event::Timer(timer) => {
                trace!(id = %key, timer = %timer.timer, "timer for finished transaction, dropping")
            }
            Event::TransportError { reason, .. } => {
                debug!(id = %key, %reason, "transport error for unknown transaction, dropping")
            }
        }
    }

    /// Hands `event` to the task owning `key`, or gives it back.
    fn route(&self, key: &TransactionKey, event: Event) -> std::result::Result<(), Event> {
        let Some(sender) = self.ctx.table.get(key).map(|entry| entry.value().clone()) else {
            return Err(event);
        };
        if let Err(mpsc::error::SendError(event)) = sender.send(event) {
            // The task finished between lookup and send
            trace!(id = %key, %event, "transaction task gone, dropping event");
        }
        Ok(())
    }

    fn forward_ack(&self, key: TransactionKey, request: Request) {
        trace!(id = %key, origin = ?request.origin, "forwarding ACK statelessly");
        if request.is_from_wire() {
            self.ctx.send_to_tu(TransactionEvent::Request {
                transaction_id: key,
                request,
            });
        } else {
            let destination = request.destination;
            self.ctx.send_to_wire(OutboundMessage {
                message: Message::Request(request),
                destination,
                retransmission: false,
            });
        }
    }

    fn stray_response(&self, key: TransactionKey, response: Response) {
        if self.discard_stray_responses {
            debug!(id = %key, status = %response.status, "no transaction for response, discarding");
            return;
        }
        trace!(id = %key, status = %response.status, "forwarding stray response statelessly");
        if response.is_from_wire() {
            self.ctx.send_to_tu(TransactionEvent::Response {
                transaction_id: key,
                response,
            });
        } else {
            let destination = response.destination;
            self.ctx.send_to_wire(OutboundMessage {
                message: Message::Response(response),
                destination,
                retransmission: false,
            });
        }
    }
}
