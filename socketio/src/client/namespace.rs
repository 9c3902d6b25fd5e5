use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use super::Client;
use crate::{callback, error::Result, Payload};

/// A view of a [`Client`] bound to one namespace, see [`Client::of`].
#[derive(Clone, Debug)]
pub struct Namespace {
    client: Client,
    nsp: String,
}

impl Namespace {
    pub(crate) fn new(client: Client, nsp: String) -> Self {
        Namespace { client, nsp }
    }

    pub fn name(&self) -> &str {
        &self.nsp
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Joins the namespace, see [`Client::connect_to_namespace`].
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.client.connect_to_namespace(&self.nsp, cancel).await
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected_to(&self.nsp)
    }

    pub fn on<T, F>(&self, event: &str, handler: F) -> &Self
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.client
            .register(event, &self.nsp, callback::typed(handler));
        self
    }

    pub fn on_with_text<T, F>(&self, event: &str, handler: F) -> &Self
    where
        T: DeserializeOwned,
        F: Fn(T, &str) + Send + Sync + 'static,
    {
        self.client
            .register(event, &self.nsp, callback::typed_with_text(handler));
        self
    }

    pub fn on_text<F>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.client
            .register(event, &self.nsp, callback::text(handler));
        self
    }

    pub fn on_signal<F>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.client
            .register(event, &self.nsp, callback::signal(handler));
        self
    }

    pub async fn emit<P: Into<Payload>>(&self, event: &str, payload: P) -> Result<()> {
        self.client
            .emit_to(event, payload.into(), Some(&self.nsp))
            .await
    }

    pub async fn emit_json<T: Serialize>(&self, event: &str, value: &T) -> Result<()> {
        self.emit(event, serde_json::to_value(value)?).await
    }

    pub async fn send_event(&self, message: &str) -> Result<()> {
        self.client.send_event(message, Some(&self.nsp)).await
    }
}
