//! Message factory: builds requests, derives responses, CANCELs and failure
//! ACKs, and generates the random identifiers (branch, Call-ID, tag) every
//! new request needs.
//!
//! All functions are free functions over the typed message model. Operations
//! whose input can violate an RFC 3261 precondition return
//! [`Error::ProtocolPrecondition`] instead of guessing.

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::error::{Error, Result};
use crate::message::{Headers, Message, Request, Response};
use crate::types::{
    CSeq, Method, NameAddr, Param, StatusCode, Transport, Uri, Via, BRANCH_MAGIC_COOKIE,
};

/// Max-Forwards value placed on every new request
pub const DEFAULT_MAX_FORWARDS: u32 = 70;

const BRANCH_SEPARATOR: &str = "C1";

/// `len` bytes from the OS CSPRNG, hex encoded (`2 * len` characters).
pub fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// A new RFC 3261 branch: magic cookie, random hex, a fixed separator, more random hex.
pub fn compute_unique_branch() -> String {
    format!(
        "{}{}{}{}",
        BRANCH_MAGIC_COOKIE,
        random_hex(8),
        BRANCH_SEPARATOR,
        random_hex(4)
    )
}

/// A new Call-ID (128 random bits)
pub fn compute_call_id() -> String {
    random_hex(16)
}

/// A new From/To tag (32 random bits)
pub fn compute_tag() -> String {
    random_hex(4)
}

/// A Via with no sent-by yet (the transport fills it in) and a fresh branch.
pub fn placeholder_via() -> Via {
    Via::new(Transport::Udp, "", None).with_branch(compute_unique_branch())
}

/// Builds a new out-of-dialog request from the transaction user.
///
/// To is `target`, From is `from` with a fresh tag, CSeq is `1 <method>`,
/// and the request gets a placeholder Via, a fresh Call-ID and Max-Forwards 70.
pub fn make_request(target: &NameAddr, from: &NameAddr, contact: &NameAddr, method: Method) -> Request {
    let mut request = Request::new(method.clone(), target.uri.clone());
    let mut from = from.clone();
    from.set_tag(compute_tag());

    request.headers = Headers {
        to: Some(target.clone()),
        from: Some(from),
        call_id: Some(compute_call_id()),
        cseq: Some(CSeq::new(1, method)),
        vias: vec![placeholder_via()],
        max_forwards: Some(DEFAULT_MAX_FORWARDS),
        contacts: vec![contact.clone()],
        ..Default::default()
    };
    request
}

pub fn make_invite(target: &NameAddr, from: &NameAddr, contact: &NameAddr) -> Request {
    make_request(target, from, contact, Method::Invite)
}

pub fn make_subscribe(target: &NameAddr, from: &NameAddr, contact: &NameAddr) -> Request {
    make_request(target, from, contact, Method::Subscribe)
}

/// Builds a REGISTER for `aor`.
///
/// The Request-URI is the registrar: scheme, host, port and `transport`
/// parameter of the AOR, with no user part.
pub fn make_register(to: &NameAddr, from: &NameAddr, contact: &NameAddr) -> Request {
    let transport = to.uri.transport().map(str::to_string);
    register_with_registrar(to, from, contact, transport.as_deref())
}

/// REGISTER to the AOR's registrar over an explicit transport.
pub fn make_register_with_transport(aor: &NameAddr, transport: Option<&str>, contact: &NameAddr) -> Request {
    register_with_registrar(aor, aor, contact, transport)
}

fn register_with_registrar(
    to: &NameAddr,
    from: &NameAddr,
    contact: &NameAddr,
    transport: Option<&str>,
) -> Request {
    let mut request = make_request(to, from, contact, Method::Register);
    let mut registrar = Uri {
        scheme: to.uri.scheme.clone(),
        user: None,
        host: to.uri.host.clone(),
        port: to.uri.port,
        params: Vec::new(),
    };
    if let Some(transport) = transport {
        registrar.params.push(Param::Transport(transport.to_string()));
    }
    request.uri = registrar;
    request
}

/// Derives a response from `request`.
///
/// Copies To, From, Call-ID, CSeq, the full Via stack and Record-Route. A new
/// To-tag is added only when the To has none and `100 < code < 300`. The
/// response travels the opposite direction from the request and is addressed
/// to the request's source.
pub fn make_response(request: &Request, code: u16, reason: Option<&str>) -> Response {
    let status = StatusCode(code);
    let mut response = Response::new(status);
    response.reason = match reason {
        Some(reason) => reason.to_string(),
        None => status.reason_phrase().unwrap_or_default().to_string(),
    };

    let mut to = request.headers.to.clone();
    if let Some(to) = to.as_mut() {
        if to.tag().is_none() && code > 100 && code < 300 {
            to.set_tag(compute_tag());
        }
    }

    response.headers = Headers {
        to,
        from: request.headers.from.clone(),
        call_id: request.headers.call_id.clone(),
        cseq: request.headers.cseq.clone(),
        vias: request.headers.vias.clone(),
        record_routes: request.headers.record_routes.clone(),
        ..Default::default()
    };
    response.origin = request.origin.flipped();
    response.destination = request.source;
    response.source = request.destination;
    response
}

/// [`make_response`] for a message not yet known to be a request.
pub fn make_response_from_message(message: &Message, code: u16, reason: Option<&str>) -> Result<Response> {
    match message {
        Message::Request(request) => Ok(make_response(request, code, reason)),
        Message::Response(_) => Err(Error::precondition(
            "cannot derive a response from a response",
        )),
    }
}

/// [`make_response`] plus a single Contact.
pub fn make_response_with_contact(request: &Request, code: u16, contact: &NameAddr, reason: Option<&str>) -> Response {
    let mut response = make_response(request, code, reason);
    response.headers.contacts = vec![contact.clone()];
    response
}

/// 405 Method Not Allowed listing `allowed`, or every known method when empty.
pub fn make_405(request: &Request, allowed: &[Method]) -> Response {
    let mut response = make_response(request, 405, None);
    response.headers.allows = if allowed.is_empty() {
        Method::all_known()
    } else {
        allowed.to_vec()
    };
    response
}

/// Builds the CANCEL for a pending INVITE.
///
/// Only the top Via is copied, so the CANCEL matches the INVITE's client
/// transaction hop by hop.
pub fn make_cancel(request: &Request) -> Result<Request> {
    if request.method != Method::Invite {
        return Err(Error::precondition(format!(
            "CANCEL can only be built for INVITE, not {}",
            request.method
        )));
    }
    let top_via = request
        .headers
        .top_via()
        .cloned()
        .ok_or_else(|| Error::precondition("INVITE has no Via to cancel"))?;

    let mut cancel = Request::new(Method::Cancel, request.uri.clone());
    cancel.version = request.version.clone();
    cancel.origin = request.origin;
    cancel.destination = request.destination;
    cancel.forced_target = request.forced_target.clone();
    cancel.headers = Headers {
        to: request.headers.to.clone(),
        from: request.headers.from.clone(),
        call_id: request.headers.call_id.clone(),
        cseq: request.headers.cseq.as_ref().map(|c| c.with_method(Method::Cancel)),
        vias: vec![top_via],
        max_forwards: Some(DEFAULT_MAX_FORWARDS),
        routes: request.headers.routes.clone(),
        authorizations: request.headers.authorizations.clone(),
        proxy_authorizations: request.headers.proxy_authorizations.clone(),
        ..Default::default()
    };
    Ok(cancel)
}

/// Builds the ACK for a non-2xx final response to an INVITE.
///
/// The To comes from the response so the ACK carries the remote tag.
pub fn make_failure_ack(request: &Request, response: &Response) -> Result<Request> {
    if request.method != Method::Invite {
        return Err(Error::precondition(format!(
            "failure ACK can only be built for INVITE, not {}",
            request.method
        )));
    }
    let top_via = request
        .headers
        .top_via()
        .cloned()
        .ok_or_else(|| Error::precondition("INVITE has no Via"))?;

    let mut ack = Request::new(Method::Ack, request.uri.clone());
    ack.version = request.version.clone();
    ack.origin = request.origin;
    ack.destination = request.destination;
    ack.forced_target = request.forced_target.clone();
    ack.headers = Headers {
        to: response.headers.to.clone(),
        from: request.headers.from.clone(),
        call_id: request.headers.call_id.clone(),
        cseq: request.headers.cseq.as_ref().map(|c| c.with_method(Method::Ack)),
        vias: vec![top_via],
        max_forwards: Some(DEFAULT_MAX_FORWARDS),
        routes: request.headers.routes.clone(),
        ..Default::default()
    };
    Ok(ack)
}

/// Parses `aor` under the given scheme, e.g. `make_uri("bob@example.com", "sip")`.
pub fn make_uri(aor: &str, scheme: &str) -> Result<Uri> {
    format!("{}:{}", scheme, aor).parse()
}

/// Strict-route fixup (RFC 3261 §16.4).
///
/// If the top Route lacks `;lr`, it becomes the Request-URI and the old
/// Request-URI is appended to the route set. The popped route is also the
/// forced next hop.
pub fn process_strict_route(request: &mut Request) {
    let strict = match request.headers.routes.first() {
        Some(route) => !route.is_loose_route(),
        None => false,
    };
    if !strict {
        return;
    }

    let top = request.headers.routes.remove(0);
    let old_uri = std::mem::replace(&mut request.uri, top.uri.clone());
    debug!(next_hop = %top.uri, "strict router detected, rewriting Request-URI");
    request.headers.routes.push(NameAddr::new(old_uri));
    request.forced_target = Some(top.uri);
}

/// Port the request was sent from: the received source port when `rport`
/// is present, otherwise the top Via port (default 5060).
pub fn get_sent_port(request: &Request) -> u16 {
    let Some(via) = request.headers.top_via() else {
        return Transport::Udp.default_port();
    };
    if via.rport().is_some() {
        if let Some(source) = request.source {
            return source.addr.port();
        }
    }
    via.port.unwrap_or_else(|| via.transport.default_port())
}
