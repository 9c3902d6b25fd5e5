pub(crate) mod builder;
#[allow(clippy::module_inception)]
pub(crate) mod client;

pub use builder::{ClientBuilder, DEFAULT_PING_INTERVAL};
pub use client::Client;
