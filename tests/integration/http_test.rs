//! HTTP surface tests
//!
//! The router is served on an ephemeral port; upgrade attempts are written
//! as raw HTTP so rejections can be checked before any websocket exists.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use collabdoc::backend::access::SpaceRole;
use collabdoc::backend::routes::create_router;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;
use uuid::Uuid;

use crate::assert_contains;
use crate::common::Harness;

async fn serve(harness: &Harness) -> SocketAddr {
    let app = create_router(harness.state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

/// Send a websocket upgrade request and return the response head plus the
/// still-open stream
async fn upgrade(addr: SocketAddr, path: &str, token: Option<&str>) -> (String, TcpStream) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let authorization = token
        .map(|token| format!("Authorization: Bearer {}\r\n", token))
        .unwrap_or_default();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n{}\r\n",
        path, addr, authorization
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = vec![0u8; 2048];
    let n = stream.read(&mut buf).await.unwrap();
    (String::from_utf8_lossy(&buf[..n]).to_string(), stream)
}

fn status_of(head: &str) -> u16 {
    head.split_whitespace().nth(1).and_then(|code| code.parse().ok()).unwrap_or(0)
}

#[tokio::test]
async fn test_health_reports_open_documents() {
    let harness = Harness::new();
    let app = create_router(harness.state.clone());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["openDocuments"], 0);
}

#[tokio::test]
async fn test_unknown_route_renders_json_error() {
    let harness = Harness::new();
    let app = create_router(harness.state.clone());

    let response = app
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], 404);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_upgrade_rejections() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let outsider = harness.member(None).await;
    let addr = serve(&harness).await;

    let (head, _) = upgrade(addr, "/collab/not-a-page", Some(&harness.token(outsider))).await;
    assert_eq!(status_of(&head), 404);

    let (head, _) = upgrade(addr, &format!("/collab/{}", name), None).await;
    assert_eq!(status_of(&head), 401);

    let (head, _) = upgrade(addr, &format!("/collab/{}", name), Some("garbage")).await;
    assert_eq!(status_of(&head), 401);

    let (head, _) = upgrade(addr, &format!("/collab/{}", name), Some(&harness.token(outsider))).await;
    assert_eq!(status_of(&head), 403);

    let missing = format!("/collab/page.{}", Uuid::new_v4());
    let (head, _) = upgrade(addr, &missing, Some(&harness.token(outsider))).await;
    assert_eq!(status_of(&head), 404);
    assert_contains!(head.to_lowercase(), "application/json");

    assert!(harness.gateway().open_documents().await.is_empty());
}

#[tokio::test]
async fn test_query_token_upgrades_and_close_releases() {
    let harness = Harness::new();
    let name = harness.page(None).await;
    let reader = harness.member(Some(SpaceRole::Reader)).await;
    let addr = serve(&harness).await;

    let path = format!("/collab/{}?token={}", name, harness.token(reader));
    let (head, stream) = upgrade(addr, &path, None).await;
    assert_eq!(status_of(&head), 101);
    assert_eq!(harness.gateway().peer_count(&name).await, 1);

    drop(stream);
    for _ in 0..50 {
        if harness.gateway().open_documents().await.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("document was not retired after the socket closed");
}
