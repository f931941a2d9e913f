//! Structured SIP requests and responses.
//!
//! Messages reach this crate already parsed; the headers the transaction
//! layer cares about live in a typed [`Headers`] record rather than a
//! lazily-parsed list. Bodies are immutable [`Bytes`] so a response derived
//! from a request never aliases mutable state.

use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::types::{
    CSeq, DigestChallenge, DigestCredentials, Method, NameAddr, StatusCode, Tuple, Uri, Via,
};

/// The SIP version string every message carries
pub const SIP_VERSION: &str = "SIP/2.0";

/// Which side of the stack a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Origin {
    /// Received from the network
    #[default]
    Wire,
    /// Handed down by the transaction user (application)
    TransactionUser,
}

impl Origin {
    /// The direction a reply to this message travels in.
    pub fn flipped(self) -> Origin {
        match self {
            Origin::Wire => Origin::TransactionUser,
            Origin::TransactionUser => Origin::Wire,
        }
    }
}

/// Headers the transaction layer and message factory operate on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers {
    pub to: Option<NameAddr>,
    pub from: Option<NameAddr>,
    pub call_id: Option<String>,
    pub cseq: Option<CSeq>,
    /// Ordered, topmost first
    pub vias: Vec<Via>,
    pub max_forwards: Option<u32>,
    pub contacts: Vec<NameAddr>,
    pub routes: Vec<NameAddr>,
    pub record_routes: Vec<NameAddr>,
    pub authorizations: Vec<DigestCredentials>,
    pub proxy_authorizations: Vec<DigestCredentials>,
    pub www_authenticates: Vec<DigestChallenge>,
    pub proxy_authenticates: Vec<DigestChallenge>,
    pub allows: Vec<Method>,
}

impl Headers {
    pub fn to(&self) -> Result<&NameAddr> {
        self.to.as_ref().ok_or(Error::MissingHeader("To"))
    }

    pub fn from(&self) -> Result<&NameAddr> {
        self.from.as_ref().ok_or(Error::MissingHeader("From"))
    }

    pub fn call_id(&self) -> Result<&str> {
        self.call_id.as_deref().ok_or(Error::MissingHeader("Call-ID"))
    }

    pub fn cseq(&self) -> Result<&CSeq> {
        self.cseq.as_ref().ok_or(Error::MissingHeader("CSeq"))
    }

    pub fn top_via(&self) -> Option<&Via> {
        self.vias.first()
    }

    /// Branch of the topmost Via
    pub fn top_branch(&self) -> Option<&str> {
        self.top_via().and_then(Via::branch)
    }

    /// Transaction id for RFC 2543 peers that do not send a magic-cookie
    /// branch: a hash over Call-ID, CSeq number, From tag and the top Via
    /// sent-by. Requests and the responses derived from them share it.
    pub fn rfc2543_transaction_id(&self) -> Option<String> {
        let call_id = self.call_id.as_deref()?;
        let cseq = self.cseq.as_ref()?;
        let from_tag = self.from.as_ref().and_then(NameAddr::tag).unwrap_or_default();
        let sent_by = self.top_via()?.sent_by();
        let input = format!("{}|{}|{}|{}", call_id, cseq.seq, from_tag, sent_by);
        Some(format!("{:x}", md5::compute(input)))
    }
}

/// A SIP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub version: String,
    pub headers: Headers,
    pub body: Bytes,
    pub origin: Origin,
    /// Where the request was received from (wire-originated only)
    pub source: Option<Tuple>,
    /// Where the request should be sent (TU-originated only)
    pub destination: Option<Tuple>,
    /// Next hop chosen by strict-route processing, overriding the Request-URI
    pub forced_target: Option<Uri>,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: SIP_VERSION.to_string(),
            headers: Headers::default(),
            body: Bytes::new(),
            origin: Origin::TransactionUser,
            source: None,
            destination: None,
            forced_target: None,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_source(mut self, source: Tuple) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_destination(mut self, destination: Tuple) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_from_wire(&self) -> bool {
        self.origin == Origin::Wire
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.uri, self.version)
    }
}

/// A SIP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    /// Empty when the code has no known phrase and none was supplied
    pub reason: String,
    pub version: String,
    pub headers: Headers,
    pub body: Bytes,
    pub origin: Origin,
    pub source: Option<Tuple>,
    pub destination: Option<Tuple>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.reason_phrase().unwrap_or_default().to_string(),
            version: SIP_VERSION.to_string(),
            headers: Headers::default(),
            body: Bytes::new(),
            origin: Origin::TransactionUser,
            source: None,
            destination: None,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_source(mut self, source: Tuple) -> Self {
        self.source = Some(source);
        self
    }

    pub fn is_from_wire(&self) -> bool {
        self.origin == Origin::Wire
    }

    /// Method of the request this response answers, taken from CSeq
    pub fn method(&self) -> Option<&Method> {
        self.headers.cseq.as_ref().map(|c| &c.method)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.version, self.status, self.reason)
    }
}

/// Either kind of SIP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn headers(&self) -> &Headers {
        match self {
            Message::Request(r) => &r.headers,
            Message::Response(r) => &r.headers,
        }
    }

    pub fn origin(&self) -> Origin {
        match self {
            Message::Request(r) => r.origin,
            Message::Response(r) => r.origin,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(r) => Some(r),
            Message::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(r) => Some(r),
            Message::Request(_) => None,
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Message::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Message::Response(r)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request(r) => r.fmt(f),
            Message::Response(r) => r.fmt(f),
        }
    }
}
