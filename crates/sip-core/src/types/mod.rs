//! Strongly typed building blocks of a SIP message.

pub mod address;
pub mod auth;
pub mod cseq;
pub mod method;
pub mod param;
pub mod status;
pub mod transport;
pub mod uri;
pub mod via;

pub use address::NameAddr;
pub use auth::{Algorithm, DigestChallenge, DigestCredentials, Qop};
pub use cseq::CSeq;
pub use method::Method;
pub use param::Param;
pub use status::StatusCode;
pub use transport::{Transport, Tuple};
pub use uri::Uri;
pub use via::{Via, BRANCH_MAGIC_COOKIE};
