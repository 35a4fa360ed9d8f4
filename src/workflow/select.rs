use super::channel::{ReceiveChannel, SendChannel};
use super::context::Context;
use super::future::Future;
use crate::engine::{RawSelectCase, RawSelected};
use crate::error::{EngineError, Error};
use crate::payload::Payload;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

type OnReady<'a> = Box<dyn FnOnce(RawSelected) -> Result<(), Error> + Send + 'a>;

/// One alternative of a [`select`]
///
/// The callback runs synchronously inside `select` when this case is the
/// one that fired.
pub struct SelectCase<'a> {
    raw: Result<RawSelectCase, Error>,
    on_ready: OnReady<'a>,
}

impl<'a> SelectCase<'a> {
    /// Fires when a value can be received; the callback gets `T::default()`
    /// when the channel is closed and drained
    pub fn receive<T, F>(channel: &ReceiveChannel<T>, callback: F) -> Self
    where
        T: DeserializeOwned + Default + 'a,
        F: FnOnce(T) -> Result<(), Error> + Send + 'a,
    {
        Self {
            raw: Ok(RawSelectCase::Receive(Arc::clone(channel.raw()))),
            on_ready: Box::new(move |selected: RawSelected| {
                callback(decode_received(selected)?.unwrap_or_default())
            }),
        }
    }

    /// Fires when a value can be received or the channel is closed; the
    /// callback gets `None` in the latter case
    pub fn try_receive<T, F>(channel: &ReceiveChannel<T>, callback: F) -> Self
    where
        T: DeserializeOwned + 'a,
        F: FnOnce(Option<T>) -> Result<(), Error> + Send + 'a,
    {
        Self {
            raw: Ok(RawSelectCase::Receive(Arc::clone(channel.raw()))),
            on_ready: Box::new(move |selected: RawSelected| callback(decode_received(selected)?)),
        }
    }

    /// Fires once `value` has been handed to the channel
    pub fn send<T, F>(channel: &SendChannel<T>, value: T, callback: F) -> Self
    where
        T: Serialize,
        F: FnOnce() -> Result<(), Error> + Send + 'a,
    {
        Self {
            raw: Payload::encode(&value)
                .map(|payload| RawSelectCase::Send(Arc::clone(channel.raw()), payload)),
            on_ready: Box::new(move |_: RawSelected| callback()),
        }
    }

    /// Fires when the future is ready; the callback fetches the value itself
    pub fn future<T, F>(future: &Future<T>, callback: F) -> Self
    where
        F: FnOnce() -> Result<(), Error> + Send + 'a,
    {
        Self {
            raw: Ok(RawSelectCase::Future(Arc::clone(future.raw()))),
            on_ready: Box::new(move |_: RawSelected| callback()),
        }
    }

    /// Fires only if no other case is ready
    pub fn default<F>(callback: F) -> Self
    where
        F: FnOnce() -> Result<(), Error> + Send + 'a,
    {
        Self {
            raw: Ok(RawSelectCase::Default),
            on_ready: Box::new(move |_: RawSelected| callback()),
        }
    }

    fn is_default(&self) -> bool {
        matches!(self.raw, Ok(RawSelectCase::Default))
    }
}

fn decode_received<T: DeserializeOwned>(selected: RawSelected) -> Result<Option<T>, Error> {
    match selected {
        RawSelected::Received {
            value: Some(payload),
            ..
        } => payload.decode().map(Some),
        _ => Ok(None),
    }
}

/// Wait until exactly one case is ready, run its callback and return the
/// callback's result
///
/// Cases are evaluated in order. Panics on an empty case list or more than
/// one default case.
pub async fn select(ctx: &Context, cases: Vec<SelectCase<'_>>) -> Result<(), Error> {
    assert!(!cases.is_empty(), "select requires at least one case");
    assert!(
        cases.iter().filter(|case| case.is_default()).count() <= 1,
        "select accepts at most one default case"
    );

    let count = cases.len();
    let mut raw_cases = Vec::with_capacity(count);
    let mut callbacks = Vec::with_capacity(count);
    for case in cases {
        raw_cases.push(case.raw?);
        callbacks.push(case.on_ready);
    }

    let selected = ctx.raw().select(&raw_cases).await?;
    let index = selected.index();
    let callback = callbacks.into_iter().nth(index).ok_or_else(|| {
        EngineError::Internal(format!("engine selected case {} of {}", index, count))
    })?;
    callback(selected)
}
