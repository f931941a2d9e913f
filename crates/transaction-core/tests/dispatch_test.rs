//! Routing of events that match no transaction.


use std::time::Duration;

use serial_test::serial;

use sipxact_sip_core::helper::{make_failure_ack, make_response};
use sipxact_sip_core::{Message, Method, Origin, Transport};
use sipxact_transaction_core::{Error, TimerSettings, TransactionConfig};

use transaction_test_utils::*;

#[tokio::test(start_paused = true)]
#[serial]
async fn test_stray_response_discarded_by_default() {
    let mut env = TestEnv::new();
    let never_sent = outgoing(Method::Options, Transport::Udp);
    env.manager
        .receive(answer(&never_sent, 200), peer(Transport::Udp))
        .unwrap();
    assert!(env.tu_quiet_for(Duration::from_secs(1)).await);
    assert_eq!(env.manager.transaction_count(), 0);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_stray_response_forwarded_when_enabled() {
    let mut env = TestEnv::with_config(TransactionConfig::new().with_discard_stray_responses(false));
    let never_sent = outgoing(Method::Options, Transport::Udp);
    env.manager
        .receive(answer(&never_sent, 200), peer(Transport::Udp))
        .unwrap();
    let (_, response) = env.next_tu_response().await;
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.origin, Origin::Wire);
    assert_eq!(env.manager.transaction_count(), 0);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_unmatched_ack_is_forwarded_statelessly() {
    let mut env = TestEnv::new();

    // ACK for a 2xx from a peer, new branch: straight to the TU
    let invite = incoming(Method::Invite);
    let ok = make_response(&invite, 200, None);
    let ack = make_failure_ack(&invite, &ok).unwrap();
    env.manager
        .receive(Message::Request(ack), peer(Transport::Udp))
        .unwrap();
    let (_, forwarded) = env.next_tu_request().await;
    assert_eq!(forwarded.method, Method::Ack);

    // ACK from the TU with no transaction: straight to the wire
    let invite = outgoing(Method::Invite, Transport::Udp);
    let ok = make_response(&invite, 200, None);
    let ack = make_failure_ack(&invite, &ok).unwrap();
    env.manager.send_request(ack).unwrap();
    let sent = env.next_wire().await;
    assert_eq!(method_of(&sent), Some(Method::Ack));
    assert_eq!(sent.destination, Some(peer(Transport::Udp)));

    assert_eq!(env.manager.transaction_count(), 0);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_cancel_without_invite_gets_own_transaction() {
    let mut env = TestEnv::new();
    env.manager
        .receive(Message::Request(incoming(Method::Cancel)), peer(Transport::Udp))
        .unwrap();
    let (id, cancel) = env.next_tu_request().await;
    assert_eq!(cancel.method, Method::Cancel);
    assert!(env.manager.transaction_exists(&id));

    env.manager.send_response(make_response(&cancel, 481, None)).unwrap();
    assert_eq!(status_of(&env.next_wire().await), Some(481));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_response_for_unknown_transaction_rejected() {
    let env = TestEnv::new();
    let request = incoming(Method::Options);
    match env.manager.send_response(make_response(&request, 200, None)) {
        Err(Error::TransactionNotFound(key)) => assert!(key.is_server()),
        other => panic!("expected TransactionNotFound, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_invalid_config_rejected() {
    transaction_test_utils::init_tracing();
    let config = TransactionConfig::new().with_timers(TimerSettings::default().with_t1(Duration::ZERO));
    assert!(matches!(
        sipxact_transaction_core::TransactionManager::new(config),
        Err(Error::InvalidConfig(_))
    ));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_custom_timers_apply() {
    let timers = TimerSettings::default()
        .with_t1(Duration::from_millis(100))
        .with_t2(Duration::from_millis(400));
    let mut env = TestEnv::with_config(TransactionConfig::new().with_timers(timers));
    let id = env
        .manager
        .send_request(outgoing(Method::Options, Transport::Udp))
        .unwrap();

    // 64 * 100ms
    let start = tokio::time::Instant::now();
    let (tid, response) = env.next_tu_response().await;
    assert_eq!(tid, id);
    assert_eq!(response.status.as_u16(), 408);
    assert_eq!(start.elapsed(), Duration::from_millis(6400));
    env.wait_terminated(&id).await;
}
