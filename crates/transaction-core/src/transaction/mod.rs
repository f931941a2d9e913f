//! # SIP Transactions
//!
//! A transaction is a request together with every response to it
//! (RFC 3261 §17). This module holds the four RFC state machines, the
//! post-2xx "stale" mode and the task that runs each transaction.
//!
//! | Kind              | Created by                  | States                                        |
//! |-------------------|-----------------------------|-----------------------------------------------|
//! | Client INVITE     | TU sends INVITE             | Calling, Proceeding, Completed, Terminated    |
//! | Client non-INVITE | TU sends any other request  | Trying, Proceeding, Completed, Terminated     |
//! | Server INVITE     | INVITE from the wire        | Trying, Proceeding, Completed, Confirmed, Terminated |
//! | Server non-INVITE | other request from the wire | Trying, Proceeding, Completed, Terminated     |
//!
//! An INVITE transaction that sees a 2xx turns [`TransactionKind::Stale`]: it
//! forwards 2xx retransmissions and their ACKs between wire and TU until
//! the stale window expires.
//!
//! A CANCEL for a pending INVITE runs as a child of the INVITE transaction
//! ([`Transaction::child`]) on the same task, under its own id.

mod client;
mod event;
mod key;
mod machine;
pub mod runner;
mod server;
mod state;

pub use event::{Action, Disposition, Event, OutboundMessage, TimerEvent, TransactionEvent};
pub use key::TransactionKey;
pub use machine::Transaction;
pub use runner::{run_transaction_loop, TransactionContext, TransactionTable};
pub(crate) use runner::start_transaction;
pub use state::{TransactionKind, TransactionState};

#[cfg(test)]
mod tests;
