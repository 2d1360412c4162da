use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use same_orchestrator::{Reply, RetargetContext, RetargetRequest, RetargetServer, ServerConfig};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time;

fn server(dir: &TempDir) -> RetargetServer {
    let config = ServerConfig {
        output_dir: dir.path().to_path_buf(),
        statistics_path: Some(same_test_fixtures::statistics::path("ms-dict").unwrap()),
        accept_timeout_ms: 100,
        ..ServerConfig::default()
    };
    RetargetServer::new(RetargetContext::from_config(config).unwrap())
}

async fn send(addr: SocketAddr, text: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(text.as_bytes()).await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    reply
}

#[tokio::test]
async fn serves_one_request_per_connection() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let wire = RetargetRequest {
        target: same_test_fixtures::skeletons::path("abe").unwrap(),
        source: same_test_fixtures::motions::path("walk-12").unwrap(),
    }
    .to_wire();

    let client = async move {
        let bad = send(addr, "onlyonefield").await;
        let good = send(addr, &wire).await;
        // a connection that sends nothing is dropped quietly
        drop(TcpStream::connect(addr).await.unwrap());
        let again = send(addr, &wire).await;
        let _ = stop_tx.send(());
        (bad, good, again)
    };
    let stop = async move {
        let _ = stop_rx.await;
    };
    let (served, (bad, good, again)) = tokio::join!(server.serve(listener, stop), client);
    served.unwrap();

    assert!(matches!(
        Reply::parse(&bad),
        Reply::Error { ref category, .. } if category == "malformed_request"
    ));
    match (Reply::parse(&good), Reply::parse(&again)) {
        (Reply::Output(first), Reply::Output(second)) => {
            assert!(first.is_file());
            assert!(second.is_file());
            assert_ne!(first, second);
        }
        other => panic!("unexpected replies {other:?}"),
    }
    assert_eq!(server.context().requests_served(), 2);
}

#[tokio::test]
async fn silent_client_does_not_block_the_next_request() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let wire = RetargetRequest {
        target: same_test_fixtures::skeletons::path("abe").unwrap(),
        source: same_test_fixtures::motions::path("walk-12").unwrap(),
    }
    .to_wire();

    let client = async move {
        let mut silent = TcpStream::connect(addr).await.unwrap();
        let reply = time::timeout(Duration::from_secs(10), send(addr, &wire))
            .await
            .expect("request behind a silent client was never served");
        // the server gave up on the silent connection and closed it
        let mut rest = Vec::new();
        let closed = silent.read_to_end(&mut rest).await.map(|_| rest.is_empty());
        let _ = stop_tx.send(());
        (reply, closed)
    };
    let stop = async move {
        let _ = stop_rx.await;
    };
    let (served, (reply, closed)) = tokio::join!(server.serve(listener, stop), client);
    served.unwrap();

    assert!(matches!(Reply::parse(&reply), Reply::Output(ref path) if path.is_file()));
    assert!(closed.unwrap_or(true));
    assert_eq!(server.context().requests_served(), 1);
}

#[tokio::test]
async fn shutdown_flag_stops_the_accept_loop() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    server.shutdown_handle().store(true, Ordering::SeqCst);

    // returns without any connection or interrupt
    server
        .serve(listener, std::future::pending::<()>())
        .await
        .unwrap();
}
