//! Scripted TCP peer shared by the integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use linkwire_client::protocol::{request_name, BlockWidth, Reply};
use linkwire_client::transport::Transport;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Route table:
/// - `upload`: reads one wide payload block, replies `{"len": n}`
/// - `fail`: replies with the error kind given in `"kind"`
/// - anything else: echoes the request document
pub struct MockServer {
    pub port: u16,
    seen: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(Mutex::new(HashMap::new()));

        let counts = seen.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(Transport::new(Box::new(stream)), counts.clone()));
            }
        });

        Self { port, seen }
    }

    /// How many requests named `name` arrived.
    pub fn count(&self, name: &str) -> usize {
        self.seen.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    /// Requests of any name.
    pub fn total(&self) -> usize {
        self.seen.lock().unwrap().values().sum()
    }
}

async fn serve(mut peer: Transport, seen: Arc<Mutex<HashMap<String, usize>>>) {
    while let Ok(doc) = peer.read_json::<Value>().await {
        let name = request_name(&doc).unwrap_or_default().to_string();
        *seen.lock().unwrap().entry(name.clone()).or_default() += 1;

        let reply = match name.as_str() {
            "upload" => match peer.read_block(BlockWidth::Wide, None).await {
                Ok(payload) => json!({"len": payload.len()}),
                Err(_) => break,
            },
            "fail" => {
                let kind = doc["kind"].as_str().unwrap_or("server_error");
                Reply::error_document(kind, Some("scripted failure"))
            }
            _ => doc,
        };

        if peer.send_json(&reply).await.is_err() {
            break;
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
