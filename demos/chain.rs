//! Chained actions against an in-process peer.
//!
//! The peer serves a tiny user directory: `find_user` looks up a name and
//! `profile` returns details for an id. Unknown names get `not_found`.
//!
//! ```text
//! RUST_LOG=linkwire_client=debug cargo run --example chain
//! ```

use linkwire_client::protocol::{request_name, ErrorKind, Reply};
use linkwire_client::request::JsonRequest;
use linkwire_client::transport::Transport;
use linkwire_client::{ClientBuilder, LinkError};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Deserialize)]
struct Profile {
    id: u64,
    name: String,
    email: String,
}

fn directory(doc: &Value) -> Value {
    match request_name(doc) {
        Some("find_user") => match doc["name"].as_str() {
            Some("ada") => json!({"id": 1}),
            Some("linus") => json!({"id": 2}),
            _ => Reply::error_document(ErrorKind::NotFound.as_str(), Some("no such user")),
        },
        Some("profile") => {
            let id = doc["id"].as_u64().unwrap_or_default();
            json!({"id": id, "name": format!("user{}", id), "email": format!("user{}@example.org", id)})
        }
        _ => Reply::error_document(ErrorKind::InvalidArgument.as_str(), None),
    }
}

async fn run_peer(listener: TcpListener) {
    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(async move {
            let mut peer = Transport::new(Box::new(stream));
            while let Ok(doc) = peer.read_json::<Value>().await {
                if peer.send_json(&directory(&doc)).await.is_err() {
                    break;
                }
            }
        });
    }
}

fn find_user(name: &str) -> JsonRequest<Value> {
    JsonRequest::new("find_user", json!({ "name": name })).declare(&[ErrorKind::NotFound])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(run_peer(listener));

    let client = ClientBuilder::new().port(port).start().await?;

    // find_user -> profile, both inside one session.
    let profile = client.submit(find_user("ada")).then_inquire(|found| {
        JsonRequest::<Profile>::new("profile", json!({ "id": found["id"] }))
    });
    profile.queue()?;
    let p = profile.get().await?;
    println!("profile: #{} {} <{}>", p.id, p.name, p.email);

    // A declared error can be turned into a fallback value.
    let email = client
        .submit(find_user("grace"))
        .then_inquire(|found| JsonRequest::<Profile>::new("profile", json!({ "id": found["id"] })))
        .handle(|result| match result {
            Ok(p) => Ok(p.email),
            Err(e) if e.server_kind() == Some(ErrorKind::NotFound) => Ok("<unknown>".to_string()),
            Err(e) => Err(e),
        });
    println!("grace: {}", email.get().await?);

    // Constant actions compose without touching the network.
    let cached = client.completed(Profile {
        id: 2,
        name: "linus".into(),
        email: "cached@example.org".into(),
    });
    let name = cached.then(|p| Ok(p.name));
    println!("cached: {}", name.get().await?);
    if let Err(LinkError::ConstantQueued) = cached.queue() {
        println!("constant actions cannot be queued");
    }

    // Cancelled before it starts: resolves as Skipped.
    let skipped = client.submit(find_user("linus"));
    skipped.cancel();
    println!("cancelled: {:?}", skipped.get().await.err());

    client.stop().await;
    Ok(())
}
