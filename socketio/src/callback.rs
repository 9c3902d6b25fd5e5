use std::{
    fmt::{self, Debug},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::{json::unquote, Error, Result};

/// One inbound event as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Invocation<'a> {
    pub(crate) event: &'a str,
    /// The raw json of the event's argument, if it had one.
    pub(crate) raw: Option<&'a str>,
}

impl<'a> Invocation<'a> {
    /// The argument with surrounding quotes removed, empty if there is none.
    pub(crate) fn text(&self) -> &'a str {
        self.raw.map(unquote).unwrap_or_default()
    }

    /// Deserializes the argument. Without one, `T` has to accept json `null`.
    pub(crate) fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        match self.raw {
            Some(raw) => serde_json::from_str(raw).map_err(|source| Error::InvalidPayload {
                event: self.event.to_owned(),
                source,
            }),
            None => serde_json::from_value(Value::Null)
                .map_err(|_| Error::MissingPayload(self.event.to_owned())),
        }
    }
}

/// A type-erased event handler. The payload type is fixed when it is built.
pub(crate) type Callback = Arc<dyn Fn(&Invocation<'_>) -> Result<()> + Send + Sync>;

pub(crate) fn typed<T, F>(handler: F) -> Callback
where
    T: DeserializeOwned,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |invocation: &Invocation<'_>| {
        handler(invocation.payload()?);
        Ok(())
    })
}

pub(crate) fn typed_with_text<T, F>(handler: F) -> Callback
where
    T: DeserializeOwned,
    F: Fn(T, &str) + Send + Sync + 'static,
{
    Arc::new(move |invocation: &Invocation<'_>| {
        handler(invocation.payload()?, invocation.text());
        Ok(())
    })
}

pub(crate) fn text<F>(handler: F) -> Callback
where
    F: Fn(&str) + Send + Sync + 'static,
{
    Arc::new(move |invocation: &Invocation<'_>| {
        handler(invocation.text());
        Ok(())
    })
}

pub(crate) fn signal<F>(handler: F) -> Callback
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(move |_: &Invocation<'_>| {
        handler();
        Ok(())
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct HandlerKey {
    event: String,
    nsp: String,
}

impl HandlerKey {
    fn new(event: &str, nsp: &str) -> Self {
        HandlerKey {
            event: event.to_owned(),
            nsp: nsp.to_owned(),
        }
    }
}

/// Event handlers keyed by event name and namespace. Every handler
/// registered under a key runs, in registration order.
#[derive(Default)]
pub(crate) struct Handlers {
    map: DashMap<HandlerKey, Vec<Callback>>,
}

/// What a dispatch did: whether any handler matched and which of them failed.
#[derive(Debug, Default)]
pub(crate) struct Dispatch {
    pub(crate) is_handled: bool,
    pub(crate) errors: Vec<Error>,
}

impl Handlers {
    pub(crate) fn add(&self, event: &str, nsp: &str, callback: Callback) {
        self.map
            .entry(HandlerKey::new(event, nsp))
            .or_default()
            .push(callback);
    }

    fn snapshot(&self, event: &str, nsp: &str) -> Vec<Callback> {
        self.map
            .get(&HandlerKey::new(event, nsp))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Runs the handlers of `(event, nsp)`. A failing or panicking handler
    /// does not keep the others from running.
    pub(crate) fn dispatch(&self, nsp: &str, invocation: &Invocation<'_>) -> Dispatch {
        // handlers may register more handlers, so the map is not borrowed
        // while they run
        let callbacks = self.snapshot(invocation.event, nsp);
        trace!(event = invocation.event, nsp, handlers = callbacks.len(), "dispatching event");

        let mut dispatch = Dispatch {
            is_handled: !callbacks.is_empty(),
            errors: Vec::new(),
        };
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(invocation))) {
                Ok(Ok(())) => (),
                Ok(Err(err)) => dispatch.errors.push(err),
                Err(_) => dispatch
                    .errors
                    .push(Error::HandlerPanicked(invocation.event.to_owned())),
            }
        }
        dispatch
    }
}

impl Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<_> = self.map.iter().map(|entry| entry.key().clone()).collect();
        f.debug_struct("Handlers").field("keys", &keys).finish()
    }
}
