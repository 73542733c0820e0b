//! Integration tests for linkwire-client.
//!
//! Each test runs the full stack against a scripted TCP peer.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use linkwire_client::protocol::build_request_document;
use linkwire_client::request::check_reply;
use linkwire_client::{
    ActionState, Client, ClientBuilder, Connection, ConnectionConfig, ErrorKind, JsonRequest,
    LinkError, Request, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use common::{init_tracing, MockServer};

async fn client(server: &MockServer) -> Client {
    init_tracing();
    ClientBuilder::new()
        .host("127.0.0.1")
        .port(server.port)
        .start()
        .await
        .unwrap()
}

fn echo(n: i64) -> JsonRequest<Value> {
    JsonRequest::new("echo", json!({"n": n}))
}

fn failing(kind: &str) -> JsonRequest<Value> {
    JsonRequest::new("fail", json!({"kind": kind}))
        .declare(&[ErrorKind::SyntaxError, ErrorKind::RateLimit])
}

/// Echo request that records whether another exchange was in flight when
/// it was sent.
struct Probe {
    id: usize,
    in_flight: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
}

#[async_trait]
impl Request for Probe {
    type Output = usize;

    fn name(&self) -> &str {
        "echo"
    }

    fn params(&self) -> Value {
        json!({"id": self.id})
    }

    fn parse(&self, body: Value) -> Result<usize> {
        Ok(serde_json::from_value(body["id"].clone())?)
    }

    async fn send(&self, conn: &Connection) -> Result<()> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        conn.send_json(&build_request_document(self.name(), self.params()))
            .await
    }

    async fn receive_response(&self, conn: &Connection) -> Result<usize> {
        let doc: Value = conn.read_json().await?;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let body = check_reply(self.name(), self.declared_errors(), doc)?;
        self.parse(body)
    }
}

#[tokio::test]
async fn test_echo_round_trip() {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: u32,
        title: String,
        tags: Vec<String>,
    }

    let server = MockServer::start().await;
    let client = client(&server).await;

    let note = Note {
        id: 7,
        title: "grüße".into(),
        tags: vec!["a".into(), "b".into()],
    };
    let request = JsonRequest::<Note>::new("echo", serde_json::to_value(&note).unwrap());

    assert_eq!(client.inquire(&request).await.unwrap(), note);
    client.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inquiries_are_totally_ordered() {
    let server = MockServer::start().await;
    let client = Arc::new(client(&server).await);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..4)
        .map(|task| {
            let client = client.clone();
            let in_flight = in_flight.clone();
            let overlaps = overlaps.clone();
            tokio::spawn(async move {
                for i in 0..25 {
                    let id = task * 100 + i;
                    let probe = Probe {
                        id,
                        in_flight: in_flight.clone(),
                        overlaps: overlaps.clone(),
                    };
                    assert_eq!(client.inquire(&probe).await.unwrap(), id);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(server.count("echo"), 100);
}

#[tokio::test]
async fn test_declared_error_surfaces() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let err = client.inquire(&failing("rate_limit")).await.unwrap_err();
    match err {
        LinkError::Protocol(e) => {
            assert_eq!(e.kind, ErrorKind::RateLimit);
            assert_eq!(e.message.as_deref(), Some("scripted failure"));
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undeclared_error_is_illegal_protocol() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    for kind in ["access_denied", "no_such_kind"] {
        let err = client.inquire(&failing(kind)).await.unwrap_err();
        assert!(
            matches!(err, LinkError::IllegalProtocol { ref request, .. } if request == "fail"),
            "{} gave {:?}",
            kind,
            err
        );
    }

    // The exchange stayed in step: the next request still works.
    assert_eq!(client.inquire(&echo(1)).await.unwrap()["n"], 1);
}

#[tokio::test]
async fn test_payload_follows_document() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let request = JsonRequest::<Value>::new("upload", json!({"file": "blob.bin"}))
        .with_payload(Bytes::from(vec![0xAB; 100_000]));
    let reply = client.inquire(&request).await.unwrap();
    assert_eq!(reply["len"], 100_000);
}

#[tokio::test]
async fn test_chain_replays_whole_parent_chain() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let root = client.submit(echo(1));
    let middle = root.then_inquire(|doc| echo(doc["n"].as_i64().unwrap_or_default() + 1));
    let leaf = middle.then(|doc| Ok(doc["n"].as_i64().unwrap_or_default() * 10));

    assert_eq!(leaf.get().await.unwrap(), 20);
    assert_eq!(server.count("echo"), 2);

    // A second descendant of `middle` replays root and middle again.
    let other = middle.then(|doc| Ok(doc["n"].as_i64().unwrap_or_default()));
    assert_eq!(other.get().await.unwrap(), 2);
    assert_eq!(server.count("echo"), 4);

    // None of the ancestors were completed by running descendants.
    assert_eq!(root.state(), ActionState::Unqueued);
    assert_eq!(middle.state(), ActionState::Unqueued);
}

#[tokio::test]
async fn test_queue_twice_sends_once() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let action = client.submit(echo(5));
    action.queue().unwrap();
    action.queue().unwrap();

    assert_eq!(action.get().await.unwrap()["n"], 5);
    action.queue().unwrap();
    assert_eq!(server.total(), 1);
}

#[tokio::test]
async fn test_get_on_complete_is_local() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let action = client.submit(echo(3));
    action.get().await.unwrap();
    let before = server.total();

    for _ in 0..5 {
        assert_eq!(action.get().await.unwrap()["n"], 3);
    }
    assert_eq!(action.poll().unwrap()["n"], 3);
    assert_eq!(server.total(), before);
}

#[tokio::test]
async fn test_queued_actions_run_in_order() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let actions: Vec<_> = (0..10).map(|n| client.submit(echo(n))).collect();
    for action in &actions {
        action.queue().unwrap();
    }
    for (n, action) in actions.iter().enumerate() {
        assert_eq!(action.get().await.unwrap()["n"], n as i64);
    }
    assert_eq!(server.count("echo"), 10);
}

#[tokio::test]
async fn test_handle_absorbs_declared_error() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let action = client.submit(failing("rate_limit")).handle(|result| match result {
        Err(e) if e.server_kind() == Some(ErrorKind::RateLimit) => Ok("throttled".to_string()),
        Err(e) => Err(e),
        Ok(_) => Ok("ok".to_string()),
    });
    assert_eq!(action.get().await.unwrap(), "throttled");
}

#[tokio::test]
async fn test_inquire_after_stop_is_not_started() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    client.serializer().stop().await;
    let err = client.inquire(&echo(1)).await.unwrap_err();
    assert!(matches!(err, LinkError::NotStarted));
}

#[tokio::test]
async fn test_builder_from_json_config() {
    let server = MockServer::start().await;
    init_tracing();

    let config: ConnectionConfig = serde_json::from_value(json!({
        "host": "127.0.0.1",
        "port": server.port,
        "connect_timeout": 2.0,
    }))
    .unwrap();
    let client = ClientBuilder::from_config(config).start().await.unwrap();

    assert!(client.connection().is_live());
    assert_eq!(client.connection().config().port, server.port);
    assert_eq!(client.inquire(&echo(9)).await.unwrap()["n"], 9);
    client.stop().await;
}
