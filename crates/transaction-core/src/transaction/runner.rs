//! # Transaction Runner
//!
//! Every live transaction is owned by one tokio task running
//! [`run_transaction_loop`]. The task pulls events for its id (and for its
//! CANCEL child's id) from an unbounded channel, steps the synchronous
//! [`Transaction`] machine and applies the returned [`Action`]s in order:
//!
//! 1. `ToWire` / `ToTu` are handed to the outbound channels without waiting;
//!    a full or closed channel is logged and the message dropped
//! 2. `StartTimer` goes to the [`TimerQueue`]
//! 3. `RegisterChild` / `ReleaseChild` edit the shared transaction table
//! 4. `StartTransaction` spawns a sibling task for a request the current
//!    transaction will not own (a CANCEL that crossed the final response)
//!
//! Because a single task owns the machine, events for one transaction id are
//! processed strictly in arrival order and the machine itself needs no locks.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sipxact_sip_core::Request;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, trace, warn};

use crate::timer::{TimerQueue, TimerSettings};
use crate::transaction::{
    Action, Disposition, Event, OutboundMessage, Transaction, TransactionEvent, TransactionKey,
};

/// Transaction id to the input channel of the task that owns it.
pub type TransactionTable = Arc<DashMap<TransactionKey, mpsc::UnboundedSender<Event>>>;

/// Everything a transaction task shares with the rest of the layer.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub table: TransactionTable,
    pub timers: TimerQueue,
    /// Settings every new transaction is created with
    pub settings: TimerSettings,
    pub wire_tx: mpsc::Sender<OutboundMessage>,
    pub tu_tx: mpsc::Sender<TransactionEvent>,
}

impl TransactionContext {
    pub(crate) fn send_to_wire(&self, message: OutboundMessage) {
        match self.wire_tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(msg = %message.message, "wire channel full, dropping outbound message")
            }
            Err(TrySendError::Closed(_)) => error!("wire channel closed, dropping outbound message"),
        }
    }

    pub(crate) fn send_to_tu(&self, event: TransactionEvent) {
        match self.tu_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(id = %event.transaction_id(), "TU channel full, dropping event")
            }
            Err(TrySendError::Closed(event)) => {
                error!(id = %event.transaction_id(), "TU channel closed, dropping event")
            }
        }
    }

    /// Removes `key` from the table if it still routes to `owner`.
    fn release(&self, key: &TransactionKey, owner: &mpsc::UnboundedSender<Event>) {
        self.table.remove_if(key, |_, sender| sender.same_channel(owner));
        self.send_to_tu(TransactionEvent::TransactionTerminated {
            transaction_id: key.clone(),
        });
    }
}

/// Creates the transaction for `request` under `key` and starts its task.
///
/// If `key` went live in the meantime the request is handed to that
/// transaction instead, so a retransmission never spawns a second one.
pub(crate) fn start_transaction(ctx: &TransactionContext, key: TransactionKey, request: Request) {
    match ctx.table.entry(key.clone()) {
        Entry::Occupied(entry) => {
            trace!(id = %key, "transaction already live, routing request to it");
            if entry.get().send(Event::Request(request)).is_err() {
                trace!(id = %key, "transaction task gone, dropping request");
            }
        }
        Entry::Vacant(entry) => {
            let mut actions = Vec::new();
            let transaction = if request.is_from_wire() {
                Transaction::new_server(key.clone(), request, ctx.settings, &mut actions)
            } else {
                Transaction::new_client(key.clone(), request, ctx.settings, &mut actions)
            };
            let (tx, rx) = mpsc::unbounded_channel();
            entry.insert(tx.clone());
            tokio::spawn(run_transaction_loop(transaction, actions, tx, rx, ctx.clone()));
        }
    }
}

/// Applies one batch of actions produced by a machine step.
pub(crate) fn apply_actions(
    ctx: &TransactionContext,
    self_tx: &mpsc::UnboundedSender<Event>,
    actions: impl IntoIterator<Item = Action>,
) {
    for action in actions {
        match action {
            Action::ToWire(message) => ctx.send_to_wire(message),
            Action::ToTu(event) => ctx.send_to_tu(event),
            Action::StartTimer(timer) => {
                ctx.timers.schedule(timer);
            }
            Action::RegisterChild(key) => {
                trace!(id = %key, "registering child id");
                ctx.table.insert(key, self_tx.clone());
            }
            Action::ReleaseChild(key) => {
                trace!(id = %key, "releasing child id");
                ctx.release(&key, self_tx);
            }
            Action::StartTransaction(request) => match TransactionKey::from_request(&request) {
                Some(key) => start_transaction(ctx, key, request),
                None => warn!(method = %request.method, "request without transaction id, dropping"),
            },
        }
    }
}

/// Drives one transaction until it is destroyed.
///
/// `initial_actions` are the side effects of creating the transaction; they
/// are applied before any queued event is processed.
pub async fn run_transaction_loop(
    mut transaction: Transaction,
    initial_actions: Vec<Action>,
    self_tx: mpsc::UnboundedSender<Event>,
    mut events_rx: mpsc::UnboundedReceiver<Event>,
    ctx: TransactionContext,
) {
    let key = transaction.key().clone();
    debug!(id = %key, kind = ?transaction.kind(), state = %transaction.state(), "transaction loop starting");
    apply_actions(&ctx, &self_tx, initial_actions);

    let mut actions = Vec::new();
    while let Some(event) = events_rx.recv().await {
        trace!(id = %key, state = %transaction.state(), %event, "processing event");
        let disposition = transaction.process(event, &mut actions);
        apply_actions(&ctx, &self_tx, actions.drain(..));
        if disposition == Disposition::Destroy {
            break;
        }
    }

    ctx.release(&key, &self_tx);
    events_rx.close();
    while let Ok(event) = events_rx.try_recv() {
        trace!(id = %key, %event, "transaction gone, dropping queued event");
    }
    debug!(id = %key, "transaction loop ended");
}
