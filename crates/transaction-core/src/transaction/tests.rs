use std::time::Duration;

use sipxact_sip_core::helper::{make_cancel, make_failure_ack, make_request, make_response};
use sipxact_sip_core::{Message, Method, NameAddr, Origin, Request, Response, Transport, Tuple, Uri};

use super::*;
use crate::timer::{TimerSettings, TimerType};

fn remote(transport: Transport) -> Tuple {
    Tuple::new("192.0.2.10:5060".parse().unwrap(), transport)
}

fn tu_request(method: Method, transport: Transport) -> Request {
    let bob = NameAddr::new(Uri::sip("example.com").with_user("bob"));
    let alice = NameAddr::new(Uri::sip("example.org").with_user("alice"));
    let contact = NameAddr::new(Uri::sip("198.51.100.1").with_user("alice"));
    make_request(&bob, &alice, &contact, method).with_destination(remote(transport))
}

fn wire_request(method: Method, transport: Transport) -> Request {
    let mut request = tu_request(method, transport);
    request.destination = None;
    request.origin = Origin::Wire;
    request.source = Some(remote(transport));
    request
}

fn wire_msgs(actions: &[Action]) -> Vec<&OutboundMessage> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::ToWire(m) => Some(m),
            _ => None,
        })
        .collect()
}

fn tu_events(actions: &[Action]) -> Vec<&TransactionEvent> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::ToTu(e) => Some(e),
            _ => None,
        })
        .collect()
}

fn started(actions: &[Action], timer: TimerType) -> TimerEvent {
    actions
        .iter()
        .rev()
        .find_map(|a| match a {
            Action::StartTimer(t) if t.timer == timer => Some(t.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("timer {} not started in {:?}", timer, actions))
}

fn tu_status(event: &TransactionEvent) -> u16 {
    match event {
        TransactionEvent::Response { response, .. } => response.status.as_u16(),
        other => panic!("expected response, got {:?}", other),
    }
}

fn client(request: Request) -> (Transaction, Vec<Action>) {
    let mut out = Vec::new();
    let key = TransactionKey::from_request(&request).unwrap();
    let tx = Transaction::new_client(key, request, TimerSettings::default(), &mut out);
    (tx, out)
}

fn server(request: Request) -> (Transaction, Vec<Action>) {
    let mut out = Vec::new();
    let key = TransactionKey::from_request(&request).unwrap();
    let tx = Transaction::new_server(key, request, TimerSettings::default(), &mut out);
    (tx, out)
}

fn step(tx: &mut Transaction, event: Event) -> (Disposition, Vec<Action>) {
    let mut out = Vec::new();
    let disposition = tx.process(event, &mut out);
    (disposition, out)
}

fn fire(tx: &mut Transaction, timer: TimerEvent) -> (Disposition, Vec<Action>) {
    step(tx, Event::Timer(timer))
}

#[test]
fn test_non_invite_client_retransmits_then_times_out() {
    let (mut tx, out) = client(tu_request(Method::Options, Transport::Udp));
    assert_eq!(tx.kind(), TransactionKind::ClientNonInvite);
    assert_eq!(tx.state(), TransactionState::Trying);
    assert_eq!(wire_msgs(&out).len(), 1);
    assert!(!wire_msgs(&out)[0].retransmission);

    let f = started(&out, TimerType::F);
    assert_eq!(f.duration, Duration::from_secs(32));
    let e1 = started(&out, TimerType::E1);
    assert_eq!(e1.duration, Duration::from_millis(500));

    let (d, out) = fire(&mut tx, e1.clone());
    assert_eq!(d, Disposition::Keep);
    assert!(wire_msgs(&out)[0].retransmission);
    let e1_second = started(&out, TimerType::E1);
    assert_eq!(e1_second.duration, Duration::from_millis(1000));

    // The superseded arming is ignored
    let (_, out) = fire(&mut tx, e1);
    assert!(out.is_empty());

    let (_, out) = fire(&mut tx, e1_second);
    assert_eq!(started(&out, TimerType::E1).duration, Duration::from_millis(2000));

    let (d, out) = fire(&mut tx, f);
    assert_eq!(d, Disposition::Destroy);
    let events = tu_events(&out);
    assert_eq!(events.len(), 1);
    assert_eq!(tu_status(events[0]), 408);
    assert_eq!(tx.state(), TransactionState::Terminated);
}

#[test]
fn test_non_invite_client_backoff_caps_at_t2() {
    let (mut tx, out) = client(tu_request(Method::Register, Transport::Udp));
    let mut e1 = started(&out, TimerType::E1);
    let mut intervals = Vec::new();
    for _ in 0..5 {
        let (_, out) = fire(&mut tx, e1);
        e1 = started(&out, TimerType::E1);
        intervals.push(e1.duration.as_millis());
    }
    assert_eq!(intervals, vec![1000, 2000, 4000, 4000, 4000]);
}

#[test]
fn test_non_invite_client_proceeding_and_completed() {
    let request = tu_request(Method::Options, Transport::Udp);
    let (mut tx, _) = client(request.clone());

    let (_, out) = step(&mut tx, Event::Response(make_response(&request, 100, None)));
    assert_eq!(tx.state(), TransactionState::Proceeding);
    assert_eq!(tu_status(tu_events(&out)[0]), 100);
    let e2 = started(&out, TimerType::E2);
    assert_eq!(e2.duration, Duration::from_secs(4));

    let (_, out) = fire(&mut tx, e2);
    assert!(wire_msgs(&out)[0].retransmission);
    assert_eq!(started(&out, TimerType::E2).duration, Duration::from_secs(4));

    let ok = make_response(&request, 200, None);
    let (d, out) = step(&mut tx, Event::Response(ok.clone()));
    assert_eq!(d, Disposition::Keep);
    assert_eq!(tx.state(), TransactionState::Completed);
    assert_eq!(tu_status(tu_events(&out)[0]), 200);
    let k = started(&out, TimerType::K);
    assert_eq!(k.duration, Duration::from_secs(5));
    assert_eq!(tx.armed_timers(), vec![TimerType::K]);

    // Retransmitted final is absorbed
    let (_, out) = step(&mut tx, Event::Response(ok));
    assert!(out.is_empty());

    let (d, _) = fire(&mut tx, k);
    assert_eq!(d, Disposition::Destroy);
}

#[test]
fn test_reliable_client_destroys_on_final() {
    let request = tu_request(Method::Options, Transport::Tcp);
    let (mut tx, out) = client(request.clone());
    assert!(tx.is_reliable());
    assert!(out
        .iter()
        .all(|a| !matches!(a, Action::StartTimer(t) if t.timer == TimerType::E1)));

    let (d, out) = step(&mut tx, Event::Response(make_response(&request, 404, None)));
    assert_eq!(d, Disposition::Destroy);
    assert_eq!(tu_status(tu_events(&out)[0]), 404);
}

#[test]
fn test_invite_client_failure_acks_and_absorbs() {
    let request = tu_request(Method::Invite, Transport::Udp);
    let (mut tx, out) = client(request.clone());
    assert_eq!(tx.state(), TransactionState::Calling);
    assert_eq!(started(&out, TimerType::B).duration, Duration::from_secs(32));
    let a = started(&out, TimerType::A);

    let (_, out) = fire(&mut tx, a);
    assert!(wire_msgs(&out)[0].retransmission);
    assert_eq!(started(&out, TimerType::A).duration, Duration::from_millis(1000));

    let busy = make_response(&request, 486, None);
    let (d, out) = step(&mut tx, Event::Response(busy.clone()));
    assert_eq!(d, Disposition::Keep);
    assert_eq!(tx.state(), TransactionState::Completed);
    let sent = wire_msgs(&out);
    assert_eq!(sent.len(), 1);
    match &sent[0].message {
        Message::Request(ack) => {
            assert_eq!(ack.method, Method::Ack);
            assert_eq!(ack.headers.top_branch(), request.headers.top_branch());
        }
        other => panic!("expected ACK, got {}", other),
    }
    assert_eq!(tu_status(tu_events(&out)[0]), 486);
    let timer_d = started(&out, TimerType::D);
    assert_eq!(timer_d.duration, Duration::from_secs(32));

    // A retransmitted failure is ACKed again and reported again
    let (_, out) = step(&mut tx, Event::Response(busy));
    assert!(wire_msgs(&out)[0].retransmission);
    assert_eq!(tu_events(&out).len(), 1);

    let (d, _) = fire(&mut tx, timer_d);
    assert_eq!(d, Disposition::Destroy);
}

#[test]
fn test_invite_client_timer_b_ends_proceeding() {
    let request = tu_request(Method::Invite, Transport::Udp);
    let (mut tx, out) = client(request.clone());
    let b = started(&out, TimerType::B);
    step(&mut tx, Event::Response(make_response(&request, 180, None)));
    assert_eq!(tx.state(), TransactionState::Proceeding);
    assert_eq!(tx.armed_timers(), vec![TimerType::B]);

    // Ringing forever still ends at 64*T1
    let (d, out) = fire(&mut tx, b);
    assert_eq!(d, Disposition::Destroy);
    assert_eq!(tx.state(), TransactionState::Terminated);
    assert_eq!(tu_status(tu_events(&out)[0]), 408);
    assert!(wire_msgs(&out).is_empty());

    let (mut tx, out) = client(tu_request(Method::Invite, Transport::Udp));
    let (d, out) = fire(&mut tx, started(&out, TimerType::B));
    assert_eq!(d, Disposition::Destroy);
    assert_eq!(tu_status(tu_events(&out)[0]), 408);
}

#[test]
fn test_invite_client_success_goes_stale() {
    let request = tu_request(Method::Invite, Transport::Udp);
    let (mut tx, out) = client(request.clone());
    let a = started(&out, TimerType::A);

    let ok = make_response(&request, 200, None);
    let (d, out) = step(&mut tx, Event::Response(ok.clone()));
    assert_eq!(d, Disposition::Keep);
    assert_eq!(tx.kind(), TransactionKind::Stale);
    assert_eq!(tu_status(tu_events(&out)[0]), 200);
    let stale = started(&out, TimerType::Stale);
    assert_eq!(stale.duration, TimerSettings::default().stale_window);

    // Retransmission timers from before the 2xx are dead
    let (_, out) = fire(&mut tx, a);
    assert!(out.is_empty());

    // 2xx retransmissions keep reaching the TU, its ACK goes to the wire
    let (_, out) = step(&mut tx, Event::Response(ok.clone()));
    assert_eq!(tu_status(tu_events(&out)[0]), 200);
    let mut ack = make_failure_ack(&request, &ok).unwrap();
    ack.origin = Origin::TransactionUser;
    let (_, out) = step(&mut tx, Event::Request(ack));
    assert_eq!(wire_msgs(&out).len(), 1);

    let (d, _) = fire(&mut tx, stale);
    assert_eq!(d, Disposition::Destroy);
}

#[test]
fn test_invite_client_cancel_child() {
    let invite = tu_request(Method::Invite, Transport::Udp);
    let (mut tx, _) = client(invite.clone());
    step(&mut tx, Event::Response(make_response(&invite, 180, None)));

    let cancel = make_cancel(&invite).unwrap();
    let cancel_key = TransactionKey::from_request(&cancel).unwrap();
    let (_, out) = step(&mut tx, Event::Request(cancel.clone()));
    assert!(matches!(&out[0], Action::RegisterChild(k) if *k == cancel_key));
    let sent = wire_msgs(&out);
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0].message, Message::Request(r) if r.method == Method::Cancel));
    assert_eq!(tx.child_key(), Some(cancel_key.clone()));

    // Only one CANCEL per INVITE
    let (_, out) = step(&mut tx, Event::Request(cancel.clone()));
    assert!(out.is_empty());

    // 200 for the CANCEL is the child's business
    let (_, out) = step(&mut tx, Event::Response(make_response(&cancel, 200, None)));
    let events = tu_events(&out);
    assert_eq!(events[0].transaction_id(), &cancel_key);
    let child_k = started(&out, TimerType::K);
    assert_eq!(child_k.key, cancel_key);
    assert_eq!(tx.state(), TransactionState::Proceeding);

    // 487 for the INVITE is the parent's
    let (_, out) = step(&mut tx, Event::Response(make_response(&invite, 487, None)));
    assert_eq!(tu_events(&out)[0].transaction_id(), tx.key());
    assert_eq!(tx.state(), TransactionState::Completed);
    let timer_d = started(&out, TimerType::D);

    // Parent finishes first and waits for the child
    let (d, _) = fire(&mut tx, timer_d);
    assert_eq!(d, Disposition::Keep);
    assert!(tx.is_pending_destroy());
    assert_eq!(tx.state(), TransactionState::Terminated);

    let (d, out) = fire(&mut tx, child_k);
    assert_eq!(d, Disposition::Destroy);
    assert!(matches!(&out[..], [Action::ReleaseChild(k)] if *k == cancel_key));
    assert!(tx.child().is_none());
}

#[test]
fn test_cancel_ignored_after_final() {
    let invite = tu_request(Method::Invite, Transport::Udp);
    let (mut tx, _) = client(invite.clone());
    step(&mut tx, Event::Response(make_response(&invite, 603, None)));
    let (_, out) = step(&mut tx, Event::Request(make_cancel(&invite).unwrap()));
    assert!(out.is_empty());
    assert!(tx.child().is_none());
}

#[test]
fn test_invite_server_failure_ack_confirmed() {
    let invite = wire_request(Method::Invite, Transport::Udp);
    let (mut tx, out) = server(invite.clone());
    assert_eq!(tx.kind(), TransactionKind::ServerInvite);
    assert_eq!(tx.state(), TransactionState::Trying);
    assert!(matches!(tu_events(&out)[0], TransactionEvent::Request { .. }));
    let trying = started(&out, TimerType::Trying);
    assert_eq!(trying.duration, Duration::from_millis(200));

    let (_, out) = fire(&mut tx, trying);
    assert_eq!(tx.state(), TransactionState::Proceeding);
    match &wire_msgs(&out)[0].message {
        Message::Response(r) => assert_eq!(r.status.as_u16(), 100),
        other => panic!("expected 100, got {}", other),
    }

    let busy = make_response(&invite, 486, None);
    let (_, out) = step(&mut tx, Event::Response(busy.clone()));
    assert_eq!(tx.state(), TransactionState::Completed);
    assert_eq!(wire_msgs(&out)[0].destination, invite.source);
    assert_eq!(started(&out, TimerType::H).duration, Duration::from_secs(32));
    let g = started(&out, TimerType::G);

    let (_, out) = fire(&mut tx, g.clone());
    assert!(wire_msgs(&out)[0].retransmission);
    assert_eq!(started(&out, TimerType::G).duration, Duration::from_millis(1000));

    // The INVITE retransmission gets the final again
    let (_, out) = step(&mut tx, Event::Request(invite.clone()));
    assert!(matches!(&wire_msgs(&out)[0].message, Message::Response(r) if r.status.as_u16() == 486));

    let ack = make_failure_ack(&invite, &busy).unwrap();
    let (d, out) = step(&mut tx, Event::Request(ack.clone()));
    assert_eq!(d, Disposition::Keep);
    assert_eq!(tx.state(), TransactionState::Confirmed);
    let i = started(&out, TimerType::I);
    assert_eq!(i.duration, Duration::from_secs(5));

    let (_, out) = step(&mut tx, Event::Request(ack));
    assert!(out.is_empty());
    let (_, out) = fire(&mut tx, g);
    assert!(out.is_empty());

    let (d, _) = fire(&mut tx, i);
    assert_eq!(d, Disposition::Destroy);
}

#[test]
fn test_invite_server_timer_h_reports_timeout() {
    let invite = wire_request(Method::Invite, Transport::Udp);
    let (mut tx, _) = server(invite.clone());
    let (_, out) = step(&mut tx, Event::Response(make_response(&invite, 500, None)));
    let (d, out) = fire(&mut tx, started(&out, TimerType::H));
    assert_eq!(d, Disposition::Destroy);
    assert!(matches!(tu_events(&out)[0], TransactionEvent::Timeout { .. }));
}

#[test]
fn test_invite_server_provisional_suppresses_auto_trying() {
    let invite = wire_request(Method::Invite, Transport::Udp);
    let (mut tx, out) = server(invite.clone());
    let trying = started(&out, TimerType::Trying);

    let (_, out) = step(&mut tx, Event::Response(make_response(&invite, 180, None)));
    assert_eq!(tx.state(), TransactionState::Proceeding);
    assert_eq!(wire_msgs(&out).len(), 1);
    let (_, out) = fire(&mut tx, trying);
    assert!(out.is_empty());

    let (_, out) = step(&mut tx, Event::Response(make_response(&invite, 200, None)));
    assert_eq!(wire_msgs(&out).len(), 1);
    assert_eq!(tx.kind(), TransactionKind::Stale);
    started(&out, TimerType::Stale);
}

#[test]
fn test_reliable_server_invite_destroys_on_ack() {
    let invite = wire_request(Method::Invite, Transport::Tcp);
    let (mut tx, _) = server(invite.clone());
    let busy = make_response(&invite, 486, None);
    let (_, out) = step(&mut tx, Event::Response(busy.clone()));
    assert!(out
        .iter()
        .all(|a| !matches!(a, Action::StartTimer(t) if t.timer == TimerType::G)));
    let (d, _) = step(&mut tx, Event::Request(make_failure_ack(&invite, &busy).unwrap()));
    assert_eq!(d, Disposition::Destroy);
}

#[test]
fn test_invite_server_cancel_child() {
    let invite = wire_request(Method::Invite, Transport::Udp);
    let (mut tx, _) = server(invite.clone());

    let mut cancel = make_cancel(&invite).unwrap();
    cancel.source = invite.source;
    let cancel_key = TransactionKey::from_request(&cancel).unwrap();
    assert!(cancel_key.is_server());

    let (_, out) = step(&mut tx, Event::Request(cancel.clone()));
    assert!(matches!(&out[0], Action::RegisterChild(k) if *k == cancel_key));
    match tu_events(&out).as_slice() {
        [TransactionEvent::Request { transaction_id, request }] => {
            assert_eq!(transaction_id, &cancel_key);
            assert_eq!(request.method, Method::Cancel);
        }
        other => panic!("expected CANCEL for TU, got {:?}", other),
    }

    let (_, out) = step(&mut tx, Event::Response(make_response(&cancel, 200, None)));
    assert_eq!(wire_msgs(&out).len(), 1);
    assert_eq!(started(&out, TimerType::J).key, cancel_key);

    let (_, out) = step(&mut tx, Event::Response(make_response(&invite, 487, None)));
    assert!(matches!(&wire_msgs(&out)[0].message, Message::Response(r) if r.status.as_u16() == 487));
    assert_eq!(tx.state(), TransactionState::Completed);
}

fn wire_cancel(invite: &Request) -> Request {
    let mut cancel = make_cancel(invite).unwrap();
    cancel.source = invite.source;
    cancel
}

fn started_elsewhere(actions: &[Action]) -> Vec<&Request> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::StartTransaction(r) => Some(r),
            _ => None,
        })
        .collect()
}

#[test]
fn test_invite_server_cancel_after_failure_runs_on_its_own() {
    let invite = wire_request(Method::Invite, Transport::Udp);
    let (mut tx, _) = server(invite.clone());
    step(&mut tx, Event::Response(make_response(&invite, 486, None)));
    assert_eq!(tx.state(), TransactionState::Completed);

    let cancel = wire_cancel(&invite);
    let (d, out) = step(&mut tx, Event::Request(cancel.clone()));
    assert_eq!(d, Disposition::Keep);
    assert_eq!(started_elsewhere(&out), vec![&cancel]);
    assert!(tu_events(&out).is_empty());
    assert!(tx.child().is_none());
    assert_eq!(tx.state(), TransactionState::Completed);

    // Same once the ACK is in
    let ack = make_failure_ack(&invite, &make_response(&invite, 486, None)).unwrap();
    step(&mut tx, Event::Request(ack));
    assert_eq!(tx.state(), TransactionState::Confirmed);
    let (_, out) = step(&mut tx, Event::Request(cancel.clone()));
    assert_eq!(started_elsewhere(&out), vec![&cancel]);
}

#[test]
fn test_invite_server_cancel_after_success_runs_on_its_own() {
    let invite = wire_request(Method::Invite, Transport::Udp);
    let (mut tx, _) = server(invite.clone());
    step(&mut tx, Event::Response(make_response(&invite, 200, None)));
    assert_eq!(tx.kind(), TransactionKind::Stale);

    let cancel = wire_cancel(&invite);
    let (d, out) = step(&mut tx, Event::Request(cancel.clone()));
    assert_eq!(d, Disposition::Keep);
    assert_eq!(started_elsewhere(&out), vec![&cancel]);
    assert!(tx.child().is_none());
}

#[test]
fn test_non_invite_server() {
    let request = wire_request(Method::Options, Transport::Udp);
    let (mut tx, out) = server(request.clone());
    assert_eq!(tx.kind(), TransactionKind::ServerNonInvite);
    assert_eq!(tu_events(&out).len(), 1);
    assert!(wire_msgs(&out).is_empty());

    // Nothing to resend yet
    let (_, out) = step(&mut tx, Event::Request(request.clone()));
    assert!(out.is_empty());

    let ok = make_response(&request, 200, None);
    let (_, out) = step(&mut tx, Event::Response(ok.clone()));
    assert_eq!(tx.state(), TransactionState::Completed);
    let j = started(&out, TimerType::J);
    assert_eq!(j.duration, Duration::from_secs(32));

    let (_, out) = step(&mut tx, Event::Request(request.clone()));
    let resent = wire_msgs(&out);
    assert!(resent[0].retransmission);
    assert!(matches!(&resent[0].message, Message::Response(r) if r == &ok));

    // TU cannot answer twice
    let (_, out) = step(&mut tx, Event::Response(make_response(&request, 500, None)));
    assert!(out.is_empty());

    let (d, _) = fire(&mut tx, j);
    assert_eq!(d, Disposition::Destroy);
}

#[test]
fn test_reliable_non_invite_server_destroys_on_final() {
    let request = wire_request(Method::Message, Transport::Tls);
    let (mut tx, _) = server(request.clone());
    let (d, out) = step(&mut tx, Event::Response(make_response(&request, 202, Some("Accepted"))));
    assert_eq!(d, Disposition::Destroy);
    assert_eq!(wire_msgs(&out).len(), 1);
}

#[test]
fn test_transport_error_notifies_tu() {
    let (mut tx, _) = client(tu_request(Method::Options, Transport::Udp));
    let key = tx.key().clone();
    let (d, out) = step(
        &mut tx,
        Event::TransportError {
            key: key.clone(),
            reason: "connection refused".to_string(),
        },
    );
    assert_eq!(d, Disposition::Destroy);
    match tu_events(&out).as_slice() {
        [TransactionEvent::TransportError { transaction_id, message }] => {
            assert_eq!(transaction_id, &key);
            assert_eq!(message, "connection refused");
        }
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[test]
fn test_stale_window_is_configurable() {
    let request = tu_request(Method::Invite, Transport::Tcp);
    let settings = TimerSettings::default().with_stale_window(Duration::from_secs(3));
    let mut out = Vec::new();
    let key = TransactionKey::from_request(&request).unwrap();
    let mut tx = Transaction::new_client(key, request.clone(), settings, &mut out);

    let response: Response = make_response(&request, 200, None);
    let (_, out) = step(&mut tx, Event::Response(response));
    assert_eq!(started(&out, TimerType::Stale).duration, Duration::from_secs(3));
}
