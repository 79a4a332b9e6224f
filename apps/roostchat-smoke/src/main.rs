//! Headless smoke run: wires the in-memory SDK into the client runtime,
//! drives a short scripted session, and logs every published state change.

mod config;
mod logging;

use std::{error::Error, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use client_core::{
    ChatEvent, ClientChannels, ClientCommand, Message, MessagePayload, MessageStatus, RoomSummary,
};
use client_runtime::ChatRuntime;
use client_sdk::InMemoryChatSdk;

use config::SmokeConfig;

#[tokio::main]
async fn main() {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };
    info!(user_id = %config.user_id, "starting smoke run");

    let sdk = InMemoryChatSdk::new(config.user_id.clone());
    seed(&sdk);

    let (channels, command_rx) = ClientChannels::new(config.command_buffer, config.event_buffer);
    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let mut events = channels.subscribe();
    let shutdown = CancellationToken::new();

    let runtime = ChatRuntime::new(sdk, config.user_id.clone(), channels.event_sender());
    let runtime_task = tokio::spawn(runtime.run(command_rx, inbound_rx, shutdown.clone()));

    if let Err(err) = drive_script(&channels, &inbound_tx).await {
        warn!(%err, "smoke script aborted early");
    }

    // Drain whatever the runtime published, then stop.
    loop {
        match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
            Ok(Ok(event)) => info!(?event, "state change"),
            Ok(Err(_)) | Err(_) => break,
        }
    }

    shutdown.cancel();
    let _ = runtime_task.await;
    info!("smoke run complete");
}

fn seed(sdk: &InMemoryChatSdk) {
    sdk.seed_room(
        room(1, "general", 5),
        vec![
            history(1, 4, "welcome to general"),
            history(1, 5, "anyone around?"),
        ],
    );
    sdk.seed_room(room(2, "random", 9), vec![history(2, 9, "lunch plans?")]);
    sdk.set_unread(2, 1);
}

async fn drive_script(
    channels: &ClientChannels,
    inbound_tx: &mpsc::Sender<ChatEvent>,
) -> Result<(), Box<dyn Error>> {
    channels.send_command(ClientCommand::RefreshRooms).await?;
    channels
        .send_command(ClientCommand::OpenRoom { room_id: 1 })
        .await?;
    channels
        .send_command(ClientCommand::SendText {
            room_id: 1,
            body: "hello from the smoke run".to_owned(),
        })
        .await?;

    // A push for the other room should bump its badge and reorder the list.
    inbound_tx
        .send(ChatEvent::NewMessage(history(2, 10, "incoming!")))
        .await
        .map_err(|err| err.to_string())?;
    inbound_tx
        .send(ChatEvent::Typing {
            room_id: 1,
            username: "bob".to_owned(),
        })
        .await
        .map_err(|err| err.to_string())?;
    Ok(())
}

fn room(id: u64, name: &str, last_comment_id: u64) -> RoomSummary {
    RoomSummary {
        id,
        name: name.to_owned(),
        avatar_url: None,
        unread_count: 0,
        last_message_preview: String::new(),
        last_activity_at_ms: 0,
        last_comment_id,
    }
}

fn history(room_id: u64, server_id: u64, body: &str) -> Message {
    Message {
        local_id: None,
        server_id: Some(server_id),
        room_id,
        sender: "bob@example.org".to_owned(),
        timestamp_ms: server_id * 1_000,
        status: MessageStatus::Sent,
        payload: MessagePayload::Text {
            body: body.to_owned(),
        },
    }
}
