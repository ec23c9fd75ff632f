//! Session lifecycle and request/response tests

use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use zbc_client::config::ClientConfig;
use zbc_client::protocol::{Frame, Request, Response, FAILURE_OVERFLOW, FAILURE_UNSUPPORTED};
use zbc_client::transport::{Address, Transport};
use zbc_client::{ClientError, ClientRegistry, SessionPhase};

use crate::common::{refused_addr, start_server};

fn config() -> ClientConfig {
    ClientConfig {
        connect_timeout_ms: 1_000,
        request_timeout_ms: 5_000,
        ..ClientConfig::default()
    }
}

#[test]
fn test_create_and_lookup() {
    let addr = start_server(0);
    let registry = ClientRegistry::new(config());

    let handle = registry.create(&addr.to_string()).unwrap();
    assert!(handle.is_valid());
    assert_eq!(registry.len(), 1);

    let session = registry.lookup(handle).unwrap();
    assert_eq!(session.phase(), SessionPhase::Connected);
    assert_eq!(session.address().port(), addr.port());

    registry.close(handle);
    assert!(registry.is_empty());
}

#[test]
fn test_create_unreachable_leaves_registry_unchanged() {
    let addr = start_server(0);
    let registry = ClientRegistry::new(config());
    let live = registry.create(&addr.to_string()).unwrap();

    for address in [refused_addr().to_string(), "not an address".to_string()] {
        match registry.create(&address) {
            Err(ClientError::ConnectFailed { .. }) => {}
            other => panic!("expected ConnectFailed for {}, got {:?}", address, other),
        }
    }

    assert_eq!(registry.len(), 1);
    assert!(registry.lookup(live).is_ok());
}

#[test]
fn test_invoke_after_close_is_invalid_handle() {
    let addr = start_server(0);
    let registry = ClientRegistry::new(config());
    let handle = registry.create(&addr.to_string()).unwrap();

    assert_eq!(registry.add(handle, 1, 1).unwrap(), 2);
    registry.close(handle);

    for _ in 0..3 {
        match registry.add(handle, 1, 1) {
            Err(ClientError::InvalidHandle(h)) => assert_eq!(h, handle),
            other => panic!("expected InvalidHandle, got {:?}", other),
        }
    }
}

#[test]
fn test_remote_add() {
    let addr = start_server(0);
    let registry = ClientRegistry::new(config());
    let handle = registry.create(&addr.to_string()).unwrap();

    assert_eq!(registry.add(handle, 40, 2).unwrap(), 42);
    assert_eq!(registry.add(handle, -5, 5).unwrap(), 0);

    match registry.add(handle, i64::MAX, 1) {
        Err(ClientError::RemoteError { code, .. }) => assert_eq!(code, FAILURE_OVERFLOW),
        other => panic!("expected RemoteError, got {:?}", other),
    }

    // Remote errors leave the session usable
    assert_eq!(registry.add(handle, i64::MIN, 1).unwrap(), i64::MIN + 1);
    registry.ping(handle).unwrap();

    let info = registry.lookup(handle).unwrap().info();
    assert_eq!(info.requests_ok, 4);
    assert_eq!(info.requests_failed, 1);
}

#[test]
fn test_invoke_named() {
    let addr = start_server(0);
    let registry = ClientRegistry::new(config());
    let handle = registry.create(&addr.to_string()).unwrap();

    let reply = registry.invoke_named(handle, "Add", &[20, 22], None).unwrap();
    assert_eq!(reply.as_i64(), 42);
    let reply = registry.invoke_named(handle, "ping", &[], None).unwrap();
    assert_eq!(reply.as_i64(), 0);

    assert!(matches!(
        registry.invoke_named(handle, "multiply", &[1, 2], None),
        Err(ClientError::UnknownOperation(_))
    ));
    assert!(matches!(
        registry.invoke_named(handle, "add", &[1], None),
        Err(ClientError::InvalidArguments { expected: 2, got: 1, .. })
    ));
}

#[test]
fn test_concurrent_invokes_get_their_own_results() {
    let addr = start_server(0);
    let registry = ClientRegistry::new(config());
    let handle = registry.create(&addr.to_string()).unwrap();

    let workers: Vec<_> = (0..16i64)
        .map(|worker| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..25i64 {
                    let a = worker * 1_000;
                    let sum = registry.add(handle, a, i).unwrap();
                    assert_eq!(sum, a + i);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let info = registry.lookup(handle).unwrap().info();
    assert_eq!(info.requests_ok, 16 * 25);
}

#[test]
fn test_close_interrupts_blocked_invoke() {
    let addr = start_server(3_000);
    let registry = ClientRegistry::new(config());
    let handle = registry.create(&addr.to_string()).unwrap();

    let caller = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            registry.invoke(handle, &Request::Add { a: 1, b: 2 }, Some(Duration::from_secs(30)))
        })
    };

    thread::sleep(Duration::from_millis(200));
    let closed_at = Instant::now();
    registry.close(handle);

    let result = caller.join().unwrap();
    assert!(closed_at.elapsed() < Duration::from_secs(2));
    assert!(
        matches!(result, Err(ClientError::NotConnected(h)) if h == handle),
        "{:?}",
        result
    );
    assert!(registry.is_empty());
}

#[test]
fn test_timeout_keeps_session_in_sync() {
    let addr = start_server(300);
    let registry = ClientRegistry::new(config());
    let handle = registry.create(&addr.to_string()).unwrap();

    let result = registry.invoke(
        handle,
        &Request::Add { a: 1, b: 1 },
        Some(Duration::from_millis(50)),
    );
    assert!(matches!(result, Err(ClientError::Timeout)), "{:?}", result);
    assert!(registry.lookup(handle).unwrap().is_connected());

    // The late reply to the first request must not be taken for this one
    let reply = registry
        .invoke(handle, &Request::Add { a: 3, b: 4 }, Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(reply.as_i64(), 7);
}

#[test]
fn test_unbounded_timeout() {
    let addr = start_server(0);
    let registry = ClientRegistry::new(config());
    let handle = registry.create(&addr.to_string()).unwrap();

    let reply = registry
        .invoke(handle, &Request::Add { a: 40, b: 2 }, Some(Duration::MAX))
        .unwrap();
    assert_eq!(reply.as_i64(), 42);
    assert_eq!(registry.poll(handle, Duration::from_millis(10)).unwrap(), 0);
}

#[test]
fn test_pushes_reach_subscriber() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = ClientRegistry::new(config());

    let handle = registry.create(&addr.to_string()).unwrap();
    let (mut server, _) = listener.accept().unwrap();
    let mut pushes = registry.subscribe(handle, 8).unwrap();

    for body in [&b"task-1"[..], &b"task-2"[..]] {
        let frame = Frame::SingleMessage {
            body: body.to_vec().into(),
        };
        server.write_all(&frame.to_bytes()).unwrap();
    }

    assert_eq!(registry.poll(handle, Duration::from_millis(200)).unwrap(), 2);
    assert_eq!(&pushes.try_recv().unwrap()[..], b"task-1");
    assert_eq!(&pushes.try_recv().unwrap()[..], b"task-2");

    registry.keep_alive(handle).unwrap();
    registry.close(handle);
    assert!(pushes.blocking_recv().is_none());
}

#[test]
fn test_session_api_failure_unregisters() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = ClientRegistry::new(config());

    let handle = registry.create(&addr.to_string()).unwrap();
    let (server, _) = listener.accept().unwrap();
    drop(server);

    let session = registry.lookup(handle).unwrap();
    assert!(session.ping(Duration::from_secs(2)).unwrap_err().is_fatal());
    assert_eq!(registry.len(), 0);
    assert!(matches!(
        registry.lookup(handle),
        Err(ClientError::InvalidHandle(_))
    ));
}

#[test]
fn test_peer_hangup_removes_session() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = ClientRegistry::new(config());

    let handle = registry.create(&addr.to_string()).unwrap();
    let (server, _) = listener.accept().unwrap();
    drop(server);

    let err = registry.ping(handle).unwrap_err();
    assert!(err.is_fatal(), "{:?}", err);
    assert!(registry.is_empty());
    assert!(matches!(
        registry.ping(handle),
        Err(ClientError::InvalidHandle(_))
    ));
}

#[test]
fn test_server_rejects_unknown_operation() {
    let addr = start_server(0);
    let address = Address::parse(&addr.to_string()).unwrap();
    let mut transport = Transport::connect(&address, &config()).unwrap();

    transport
        .send(&Frame::request_response(9, 77, vec![0x00, 0x2a, 0x00]))
        .unwrap();
    let frame = transport
        .receive(Some(Instant::now() + Duration::from_secs(5)))
        .unwrap();

    let correlation = frame.correlation().unwrap();
    assert_eq!(correlation.connection_id, 9);
    assert_eq!(correlation.request_id, 77);
    match Response::decode(frame.body()).unwrap() {
        Response::Failure { operation, code, .. } => {
            assert_eq!(operation, 0x2a);
            assert_eq!(code, FAILURE_UNSUPPORTED);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_list_sessions() {
    let addr = start_server(0);
    let registry = ClientRegistry::new(config());
    let first = registry.create(&addr.to_string()).unwrap();
    let second = registry.create(&addr.to_string()).unwrap();
    registry.add(second, 2, 2).unwrap();

    let sessions = registry.list_sessions();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].handle, first.as_u64());
    assert_eq!(sessions[1].handle, second.as_u64());
    assert_eq!(sessions[1].requests_ok, 1);

    registry.close_all();
    assert!(registry.is_empty());
}
