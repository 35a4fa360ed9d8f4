use super::context::Context;
use crate::engine::{RawChannel, RawReceive};
use crate::error::Error;
use crate::payload::Payload;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Send side of a typed channel
pub struct SendChannel<T> {
    raw: Arc<dyn RawChannel>,
    _marker: PhantomData<fn(T)>,
}

/// Receive side of a typed channel
pub struct ReceiveChannel<T> {
    raw: Arc<dyn RawChannel>,
    _marker: PhantomData<fn() -> T>,
}

/// Bidirectional typed channel bound to one execution
pub struct Channel<T> {
    raw: Arc<dyn RawChannel>,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> SendChannel<T> {
    pub fn from_raw(raw: Arc<dyn RawChannel>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn raw(&self) -> &Arc<dyn RawChannel> {
        &self.raw
    }

    /// Close the channel; receivers drain buffered values first
    pub fn close(&self) {
        self.raw.close();
    }
}

impl<T: Serialize> SendChannel<T> {
    /// Send a value, suspending until a receiver or buffer slot takes it
    pub async fn send(&self, ctx: &Context, value: T) -> Result<(), Error> {
        let payload = Payload::encode(&value)?;
        self.raw.send(ctx.raw().as_ref(), payload).await
    }
}

impl<T> ReceiveChannel<T> {
    pub fn from_raw(raw: Arc<dyn RawChannel>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn raw(&self) -> &Arc<dyn RawChannel> {
        &self.raw
    }

    /// Number of buffered, undelivered values
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.raw.is_closed()
    }
}

impl<T: DeserializeOwned> ReceiveChannel<T> {
    /// Receive the next value, or `None` once the channel is closed and drained
    pub async fn receive_opt(&self, ctx: &Context) -> Result<Option<T>, Error> {
        self.raw
            .receive(ctx.raw().as_ref())
            .await
            .map(|payload| payload.decode())
            .transpose()
    }

    /// Receive without suspending; `None` if nothing is available or the
    /// channel is closed and drained
    pub fn try_receive(&self, _ctx: &Context) -> Result<Option<T>, Error> {
        match self.raw.try_receive() {
            RawReceive::Value(payload) => payload.decode().map(Some),
            RawReceive::Empty | RawReceive::Closed => Ok(None),
        }
    }
}

impl<T: DeserializeOwned + Default> ReceiveChannel<T> {
    /// Receive the next value, or `T::default()` once the channel is closed
    /// and drained
    pub async fn receive(&self, ctx: &Context) -> Result<T, Error> {
        Ok(self.receive_opt(ctx).await?.unwrap_or_default())
    }
}

impl<T> Channel<T> {
    /// Create a channel; `capacity == 0` makes every send a rendezvous
    pub fn new(ctx: &Context, capacity: usize) -> Self {
        Self::from_raw(ctx.raw().new_channel(capacity))
    }

    pub fn from_raw(raw: Arc<dyn RawChannel>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn raw(&self) -> &Arc<dyn RawChannel> {
        &self.raw
    }

    pub fn sender(&self) -> SendChannel<T> {
        SendChannel::from_raw(Arc::clone(&self.raw))
    }

    pub fn receiver(&self) -> ReceiveChannel<T> {
        ReceiveChannel::from_raw(Arc::clone(&self.raw))
    }

    pub fn close(&self) {
        self.raw.close();
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }
}

impl<T: Serialize> Channel<T> {
    pub async fn send(&self, ctx: &Context, value: T) -> Result<(), Error> {
        self.sender().send(ctx, value).await
    }
}

impl<T: DeserializeOwned> Channel<T> {
    pub async fn receive_opt(&self, ctx: &Context) -> Result<Option<T>, Error> {
        self.receiver().receive_opt(ctx).await
    }

    pub fn try_receive(&self, ctx: &Context) -> Result<Option<T>, Error> {
        self.receiver().try_receive(ctx)
    }
}

impl<T: DeserializeOwned + Default> Channel<T> {
    pub async fn receive(&self, ctx: &Context) -> Result<T, Error> {
        self.receiver().receive(ctx).await
    }
}

macro_rules! impl_clone_debug {
    ($($ty:ident),*) => {
        $(
            impl<T> Clone for $ty<T> {
                fn clone(&self) -> Self {
                    Self::from_raw(Arc::clone(&self.raw))
                }
            }

            impl<T> std::fmt::Debug for $ty<T> {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.debug_struct(stringify!($ty))
                        .field("type", &std::any::type_name::<T>())
                        .field("len", &self.raw.len())
                        .finish()
                }
            }
        )*
    };
}

impl_clone_debug!(SendChannel, ReceiveChannel, Channel);
