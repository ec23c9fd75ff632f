//! Two-value boundary against a live server

use zbc_client::boundary;

use crate::common::{refused_addr, start_server};

#[test]
fn test_boundary_round_trip() {
    let addr = start_server(0);

    let (handle, err) = boundary::new_client(&addr.to_string());
    assert!(err.is_none(), "{:?}", err);
    assert!(handle > 0);

    assert_eq!(boundary::invoke(handle, "add", &[40, 2]), (42, None));
    assert_eq!(boundary::invoke(handle, "Ping", &[]), (0, None));

    let (_, err) = boundary::invoke(handle, "add", &[i64::MAX, 1]);
    assert!(err.unwrap().contains("remote error 1"));

    boundary::close(handle);
    boundary::close(handle);

    let (value, err) = boundary::invoke(handle, "add", &[1, 2]);
    assert_eq!(value, 0);
    assert!(err.unwrap().contains("invalid session handle"));
}

#[test]
fn test_boundary_connect_failure() {
    let (handle, err) = boundary::new_client(&refused_addr().to_string());
    assert_eq!(handle, boundary::INVALID_HANDLE);
    assert!(err.unwrap().starts_with("failed to connect"));
}
