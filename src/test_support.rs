//! Local HTTP servers for exercising the relay and its clients in tests.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral loopback port for the rest of the test.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("local TCP listener should bind");
    let addr = listener.local_addr().expect("resolved local listener address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// A loopback address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("local TCP listener should bind");
    listener.local_addr().expect("resolved local listener address")
}
