//! Echo round trips against an in-process peer.
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo
//! ```

use linkwire_client::protocol::request_name;
use linkwire_client::request::JsonRequest;
use linkwire_client::transport::Transport;
use linkwire_client::ClientBuilder;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Echoes every request document back, tagged with a sequence number.
async fn run_peer(listener: TcpListener) {
    while let Ok((stream, addr)) = listener.accept().await {
        tracing::info!(%addr, "peer accepted connection");
        tokio::spawn(async move {
            let mut peer = Transport::new(Box::new(stream));
            let mut seq = 0u64;
            while let Ok(mut doc) = peer.read_json::<Value>().await {
                seq += 1;
                tracing::debug!(request = request_name(&doc).unwrap_or("?"), seq, "peer got request");
                doc["seq"] = json!(seq);
                if peer.send_json(&doc).await.is_err() {
                    break;
                }
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(run_peer(listener));

    let client = ClientBuilder::new().host("127.0.0.1").port(port).start().await?;

    // Direct inquiry.
    let reply: Value = client
        .inquire(&JsonRequest::<Value>::new("echo", json!({"text": "hello"})))
        .await?;
    println!("inquire -> {}", reply);

    // Queued actions run one after another on the engine worker.
    let actions: Vec<_> = ["one", "two", "three"]
        .into_iter()
        .map(|text| client.submit(JsonRequest::<Value>::new("echo", json!({ "text": text }))))
        .collect();
    for action in &actions {
        action.queue()?;
    }
    for action in &actions {
        let reply = action.get().await?;
        println!("queued -> {} (seq {})", reply["text"], reply["seq"]);
    }

    client.stop().await;
    Ok(())
}
