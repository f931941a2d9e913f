//! # SIP Transaction Layer
//!
//! The transaction layer of RFC 3261 §17, sitting between a transport and a
//! transaction user (TU) such as a dialog layer or a proxy core.
//!
//! - [`transaction`]: the four RFC state machines plus the post-2xx stale
//!   mode and CANCEL children
//! - [`timer`]: timer identifiers, RFC durations and the queue that fires them
//! - [`TransactionManager`]: the transaction table and the dispatcher that
//!   routes every event to its transaction
//!
//! ## Usage
//!
//! ```no_run
//! use sipxact_sip_core::helper;
//! use sipxact_sip_core::{NameAddr, Transport, Tuple, Uri};
//! use sipxact_transaction_core::{TransactionConfig, TransactionEvent, TransactionManager};
//!
//! # async fn run() -> sipxact_transaction_core::Result<()> {
//! let (manager, mut channels) = TransactionManager::new(TransactionConfig::default())?;
//!
//! let bob = NameAddr::new(Uri::sip("example.com").with_user("bob"));
//! let alice = NameAddr::new(Uri::sip("example.org").with_user("alice"));
//! let options = helper::make_request(&bob, &alice, &alice, sipxact_sip_core::Method::Options)
//!     .with_destination(Tuple::new("192.0.2.1:5060".parse().unwrap(), Transport::Udp));
//! let id = manager.send_request(options)?;
//!
//! // The transport drains `channels.wire_rx`; the TU drains `channels.tu_rx`.
//! while let Some(event) = channels.tu_rx.recv().await {
//!     if let TransactionEvent::Response { transaction_id, response } = event {
//!         assert_eq!(transaction_id, id);
//!         println!("got {}", response.status);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod manager;
pub mod timer;
pub mod transaction;

pub use config::TransactionConfig;
pub use error::{Error, Result};
pub use manager::{TransactionChannels, TransactionManager};
pub use timer::{TimerQueue, TimerSettings, TimerType};
pub use transaction::{
    Event, OutboundMessage, TimerEvent, Transaction, TransactionEvent, TransactionKey,
    TransactionKind, TransactionState,
};
