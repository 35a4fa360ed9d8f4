use super::require_name;
use crate::engine::types::{ActivityInfo, ActivityOptions};
use crate::error::Error;
use crate::payload::Payload;
use crate::worker::{ActivityFunction, Worker};
use crate::workflow::{Context, Future};
use serde::de::DeserializeOwned;
use serde::Serialize;
use slog::Logger;
use std::borrow::Cow;
use std::marker::PhantomData;

/// Context passed to activity implementations
#[derive(Clone, Debug)]
pub struct ActivityContext {
    info: ActivityInfo,
    logger: Logger,
}

impl ActivityContext {
    pub fn new(info: ActivityInfo, logger: Logger) -> Self {
        Self { info, logger }
    }

    pub fn info(&self) -> &ActivityInfo {
        &self.info
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

/// An activity type taking `In` and producing `Out`
pub struct Activity<In, Out> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out> Activity<In, Out> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<In, Out> Activity<In, Out>
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
{
    /// Register the implementation of this activity on a worker
    ///
    /// # Panics
    ///
    /// Panics if the activity has no name.
    pub fn register<F>(&self, worker: &Worker, f: F) -> Result<(), Error>
    where
        F: ActivityFunction<In, Out>,
    {
        require_name("activity", &self.name);
        worker.register_activity(&self.name, f)
    }
}

impl<In: Serialize, Out> Activity<In, Out> {
    /// Schedule the activity from workflow code
    ///
    /// Failures, including an input that cannot be encoded, are reported
    /// through the returned future.
    pub fn execute(&self, ctx: &Context, input: In, options: ActivityOptions) -> Future<Out> {
        require_name("activity", &self.name);
        match Payload::encode(&input) {
            Ok(payload) => Future::from_raw(ctx.raw().execute_activity(&self.name, payload, options)),
            Err(e) => {
                let (future, settable) = ctx.raw().new_future();
                settable.set(Err(e));
                Future::from_raw(future)
            }
        }
    }
}

impl<In, Out> Clone for Activity<In, Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<In, Out> std::fmt::Debug for Activity<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activity").field("name", &self.name).finish()
    }
}
