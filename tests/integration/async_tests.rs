//! Async facade tests

use zbc_client::config::ClientConfig;
use zbc_client::protocol::{Reply, Request};
use zbc_client::{AsyncClient, ClientError, ClientRegistry};

use crate::common::start_server;

#[tokio::test]
async fn test_async_session_lifecycle() {
    let addr = start_server(0);
    let client = AsyncClient::new(ClientRegistry::new(ClientConfig::default()));

    let handle = client.create(&addr.to_string()).await.unwrap();
    assert_eq!(client.add(handle, 40, 2).await.unwrap(), 42);
    client.ping(handle).await.unwrap();

    let reply = client.invoke(handle, Request::Ping, None).await.unwrap();
    assert_eq!(reply, Reply::Pong);
    let reply = client.invoke_named(handle, "add", &[-5, 5]).await.unwrap();
    assert_eq!(reply, Reply::Sum(0));

    client.close(handle).await;
    assert!(matches!(
        client.add(handle, 1, 1).await,
        Err(ClientError::InvalidHandle(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_concurrent_adds() {
    let addr = start_server(0);
    let client = AsyncClient::new(ClientRegistry::new(ClientConfig::default()));
    let handle = client.create(&addr.to_string()).await.unwrap();

    let tasks: Vec<_> = (0..32i64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { (i, client.add(handle, i, i).await) })
        })
        .collect();

    for task in tasks {
        let (i, sum) = task.await.unwrap();
        assert_eq!(sum.unwrap(), 2 * i);
    }
}
