//! A socket.io (protocol revision 4, over engine.io 3) client.
//!
//! ```no_run
//! use socketio_client::ClientBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> socketio_client::Result<()> {
//!     let socket = ClientBuilder::new()
//!         .namespace("/chat")
//!         .connect("http://localhost:3000/")
//!         .await?;
//!
//!     socket.of("/chat").on_text("typing", |user| println!("{} is typing", user));
//!     socket.emit("add user", "rust").await?;
//!
//!     socket.disconnect(&CancellationToken::new()).await
//! }
//! ```

pub(crate) mod callback;
pub(crate) mod client;
pub(crate) mod error;
pub(crate) mod event;
pub(crate) mod json;
pub(crate) mod packet;
pub(crate) mod payload;

pub use client::{Client, ClientBuilder, Namespace, SOCKET_IO_FRAMEWORK};
pub use engineio_client::{CloseReason, ListenerId, Subscription};
pub use error::{Error, Result};
pub use event::{ErrorArgs, Event, EventArgs, Received};
pub use json::{json_array_values, split_json_array};
pub use packet::{Packet, PacketType};
pub use payload::Payload;
