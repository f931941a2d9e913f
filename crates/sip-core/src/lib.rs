//! SIP message model, message factory and digest authentication for the
//! sipxact transaction stack.
//!
//! This crate has no async code. Wire parsing and serialization live outside
//! it; what arrives here is an already structured [`Request`] or
//! [`Response`].
//!
//! - [`types`]: methods, status codes, URIs, Via, CSeq and digest headers
//! - [`message`]: requests, responses and the typed header record
//! - [`helper`]: the message factory (requests, responses, CANCEL, failure ACK,
//!   branch / Call-ID / tag generation, strict-route fixup)
//! - [`auth`]: RFC 2617 digest challenge, response and verification

mod error;
pub mod auth;
pub mod helper;
pub mod message;
pub mod types;

pub use auth::{add_authorization, make_response_md5, AuthConfig, AuthResult, DigestAuthenticator};
pub use error::{Error, Result};
pub use message::{Headers, Message, Origin, Request, Response, SIP_VERSION};
pub use types::{
    Algorithm, CSeq, DigestChallenge, DigestCredentials, Method, NameAddr, Param, Qop, StatusCode,
    Transport, Tuple, Uri, Via, BRANCH_MAGIC_COOKIE,
};

/// Common imports for users of this crate
pub mod prelude {
    pub use crate::auth::{AuthConfig, AuthResult, DigestAuthenticator};
    pub use crate::helper;
    pub use crate::message::{Headers, Message, Origin, Request, Response};
    pub use crate::types::*;
    pub use crate::{Error, Result};
}
