//! Minimal console probe for the client core.
//!
//! Logs in with credentials from the environment, prints bus events and
//! relays stdin lines to the selected friend:
//!
//! ```text
//! CAMPUSMEET_HOST=localhost:8000 \
//! CAMPUSMEET_USER_ID=1 \
//! CAMPUSMEET_TOKEN=... \
//! cargo run --bin chat_console
//! ```

use anyhow::{Context, Result};
use campusmeet_client::{ChatSystem, ClientEvent};
use campusmeet_shared::User;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = std::env::var("CAMPUSMEET_HOST").unwrap_or_else(|_| "localhost:8000".to_string());
    let token = std::env::var("CAMPUSMEET_TOKEN").context("CAMPUSMEET_TOKEN is required")?;
    let user_id: i64 = std::env::var("CAMPUSMEET_USER_ID")
        .context("CAMPUSMEET_USER_ID is required")?
        .parse()
        .context("CAMPUSMEET_USER_ID must be an integer")?;
    let username =
        std::env::var("CAMPUSMEET_USERNAME").unwrap_or_else(|_| format!("user-{user_id}"));

    let system = ChatSystem::new(&host);
    let mut events = system.subscribe();

    let user = User {
        id: user_id,
        username,
        email: String::new(),
        first_name: None,
        last_name: None,
        interests: None,
    };
    system.login(user, token).await;

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClientEvent::MessageReceived(msg)) => {
                    println!("[{}] {}: {}", msg.timestamp, msg.sender_id, msg.content)
                }
                Ok(ClientEvent::MessageElsewhere(msg)) => {
                    println!("(unread from {})", msg.sender_id)
                }
                Ok(ClientEvent::Notice { level, text }) => println!("({level:?}) {text}"),
                Ok(ClientEvent::SessionExpired) => {
                    println!("session expired, exiting");
                    std::process::exit(1);
                }
                Ok(other) => println!("{other:?}"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("commands: /friends, /friend <id>, /quit; anything else is sent as a message");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if line == "/friends" {
            for friend in system.friends() {
                println!("{}: {}", friend.id, friend.username);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("/friend ") {
            let id: i64 = rest.trim().parse().context("friend id must be an integer")?;
            match system.friends().into_iter().find(|f| f.id == id) {
                Some(friend) => {
                    println!("opening conversation with {}", friend.username);
                    system.select_conversation(friend);
                }
                None => println!("no friend with id {id}"),
            }
            continue;
        }
        if let Err(err) = system.send_message(&line) {
            println!("send failed: {err}");
        }
    }

    system.logout();
    Ok(())
}
