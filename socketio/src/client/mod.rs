pub(crate) mod builder;
#[allow(clippy::module_inception)]
pub(crate) mod client;
pub(crate) mod namespace;

pub use builder::{ClientBuilder, SOCKET_IO_FRAMEWORK};
pub use client::Client;
pub use namespace::Namespace;
