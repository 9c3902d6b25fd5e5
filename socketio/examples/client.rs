use std::time::Duration;

use serde::{Deserialize, Serialize};
use socketio_client::{ClientBuilder, Event};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    username: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Login {
    num_users: u64,
}

// talks to the chat demo that ships with socket.io
#[tokio::main]
async fn main() -> socketio_client::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("engineio_client=info,socketio_client=info")
        .init();

    let client = ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .connect("http://localhost:3000/")
        .await?;

    client
        .on("login", |login: Login| {
            println!("{} users in the chat", login.num_users)
        })
        .on("new message", |message: ChatMessage| {
            println!("{}: {}", message.username, message.message)
        })
        .on_text("typing", |user| println!("{} is typing", user));

    client.on_event(|event| match event {
        Event::UnhandledEventReceived(args) => println!("unhandled: {}", args.value),
        Event::Disconnected(reason) => println!("disconnected: {}", reason.reason),
        _ => (),
    });

    client.emit("add user", "rustacean").await?;
    client
        .emit_json(
            "new message",
            &ChatMessage {
                username: "rustacean".to_owned(),
                message: "Hello from rust".to_owned(),
            },
        )
        .await?;

    tokio::time::sleep(Duration::from_secs(5)).await;

    client.disconnect(&CancellationToken::new()).await
}
