//! Room popup demo — wires the client core together against a running
//! backend: silent login from a stored credential, one chat popup, and
//! stdin as the message box.
//!
//! Usage:
//!   DUGOUT_API=http://localhost:8080/api DUGOUT_CHAT=localhost:9190 \
//!     cargo run --example popup_demo -- <room-id>

use anyhow::Result;
use dugout_sdk::{ChatEvent, DugoutClient, RoomState, SdkConfig, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let room_id: u64 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "1".to_string())
        .parse()?;

    let mut config = SdkConfig::default();
    if let Ok(api) = std::env::var("DUGOUT_API") {
        config.api_base_url = api;
    }
    if let Ok(chat) = std::env::var("DUGOUT_CHAT") {
        config.chat.addr = chat;
    }

    let client = DugoutClient::new(config)?;

    // Watch for forced logout while the demo runs.
    let mut session_events = client.session().events();
    tokio::spawn(async move {
        while let Ok(event) = session_events.recv().await {
            if let SessionEvent::SessionExpired { reason } = event {
                eprintln!("! session expired: {reason}");
            }
        }
    });

    if client.session().try_auto_login().await.is_err() {
        anyhow::bail!("no stored session — log in through the app first (remember me)");
    }
    let me = client.session().user().expect("authenticated");
    println!("signed in as {} ({})", me.nickname, me.email);

    let (handle, mut events) = client.open_room(room_id, "demo room", None)?;
    let mut room = RoomState::new(client.config().chat.room_log_cap);
    println!("room {room_id} open — type to chat, ctrl-d to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                room.apply(&event);
                match event {
                    ChatEvent::Connected => println!("* connected"),
                    ChatEvent::MemberEntered { nickname } => {
                        println!("* {nickname} entered ({} here)", room.member_count());
                    }
                    ChatEvent::MemberLeft { nickname } => {
                        println!("* {nickname} left ({} here)", room.member_count());
                    }
                    ChatEvent::Message(message) => {
                        println!("<{}> {}", message.sender, message.text);
                    }
                    ChatEvent::Reconnecting { delay } => {
                        println!("* connection lost, retrying in {delay:?}");
                    }
                    ChatEvent::Disconnected { reason } => {
                        println!("* disconnected: {reason}");
                        break;
                    }
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(text) if !text.trim().is_empty() => handle.send_message(text.trim()),
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    handle.close();
    client.close_room(room_id);
    Ok(())
}
