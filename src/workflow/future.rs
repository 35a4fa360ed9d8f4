use super::context::Context;
use crate::engine::{RawFuture, RawSettable};
use crate::error::Error;
use crate::payload::Payload;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Read side of a typed single-assignment future
pub struct Future<T> {
    raw: Arc<dyn RawFuture>,
    _marker: PhantomData<fn() -> T>,
}

/// Write side of a typed single-assignment future
pub struct FutureResolver<T> {
    raw: Arc<dyn RawSettable>,
    _marker: PhantomData<fn(T)>,
}

/// Create an unresolved future and its resolver
pub fn new_future<T>(ctx: &Context) -> (Future<T>, FutureResolver<T>) {
    let (future, settable) = ctx.raw().new_future();
    (Future::from_raw(future), FutureResolver::from_raw(settable))
}

impl<T> Future<T> {
    pub fn from_raw(raw: Arc<dyn RawFuture>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn raw(&self) -> &Arc<dyn RawFuture> {
        &self.raw
    }

    /// Whether a value or error has been stored; never suspends
    pub fn is_ready(&self) -> bool {
        self.raw.is_ready()
    }
}

impl<T: DeserializeOwned> Future<T> {
    /// Wait for the future to settle and decode its value
    pub async fn get(&self, ctx: &Context) -> Result<T, Error> {
        self.raw.get(ctx.raw().as_ref()).await?.decode()
    }
}

impl<T> FutureResolver<T> {
    pub fn from_raw(raw: Arc<dyn RawSettable>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Settle the future with an error
    pub fn resolve_error(&self, err: Error) {
        self.raw.set(Err(err));
    }
}

impl<T: Serialize> FutureResolver<T> {
    /// Settle the future with a value; an encode failure settles it with
    /// that error instead
    pub fn resolve(&self, value: T) {
        self.raw.set(Payload::encode(&value));
    }

    /// Settle the future from a result
    pub fn settle(&self, result: Result<T, Error>) {
        self.raw.set(result.and_then(|value| Payload::encode(&value)));
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self::from_raw(Arc::clone(&self.raw))
    }
}

impl<T> Clone for FutureResolver<T> {
    fn clone(&self) -> Self {
        Self::from_raw(Arc::clone(&self.raw))
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("ready", &self.raw.is_ready())
            .finish()
    }
}
