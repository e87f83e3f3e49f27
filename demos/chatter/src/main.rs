//! Multicast chat over Castline.
//!
//! ```text
//! chatter [NAME] [URL]
//! RUST_LOG=castline=debug chatter alice udpm://239.255.76.67:7667?ttl=1
//! ```
//!
//! Every line typed on stdin is published on `CHAT_<NAME>`; every message on
//! any `CHAT_*` channel from another participant is printed.

use castline::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "udpm://239.255.76.67:7667?ttl=0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChatLine {
    from: String,
    text: String,
}

fn channel_for(name: &str) -> String {
    format!("CHAT_{name}")
}

fn decode_line(message: &ReceivedMessage) -> Option<ChatLine> {
    match serde_json::from_slice(&message.payload) {
        Ok(line) => Some(line),
        Err(e) => {
            tracing::debug!(channel = %message.channel, error = %e, "not a chat line");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "anon".to_string());
    let url = args.next().unwrap_or_else(|| DEFAULT_URL.to_string());

    let conn = Connection::open_url(&url).await?;
    tracing::info!(%url, %name, "joined chat");

    let (tx, mut incoming) = mpsc::unbounded_channel();
    let _subscription = conn.subscribe_regex("CHAT_.*", forward_unbounded(tx))?;

    let own_channel = channel_for(&name);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(text) = line? else { break };
                let payload = serde_json::to_vec(&ChatLine { from: name.clone(), text })?;
                conn.publish(&own_channel, &payload).await?;
            }
            Some(message) = incoming.recv() => {
                if message.channel == own_channel {
                    continue;
                }
                if let Some(line) = decode_line(&message) {
                    println!("<{}> {}", line.from, line.text);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    conn.disconnect().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use castline::{MemoryBus, MemoryTransport};

    use super::*;

    #[tokio::test]
    async fn test_chat_line_travels_between_participants() {
        let bus = MemoryBus::new();
        let alice = Connection::<MemoryTransport>::open(ConnectionConfig::new(bus.clone()))
            .await
            .unwrap();
        let bob = Connection::<MemoryTransport>::open(ConnectionConfig::new(bus))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        bob.subscribe_regex("CHAT_.*", forward_unbounded(tx)).unwrap();

        let line = ChatLine {
            from: "alice".into(),
            text: "hello".into(),
        };
        alice
            .publish(&channel_for("alice"), &serde_json::to_vec(&line).unwrap())
            .await
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.channel, "CHAT_alice");
        assert_eq!(decode_line(&message), Some(line));
    }

    #[test]
    fn test_decode_line_rejects_non_json() {
        let message = ReceivedMessage {
            channel: "CHAT_x".into(),
            payload: b"\x00\x01".to_vec(),
        };
        assert_eq!(decode_line(&message), None);
    }
}
