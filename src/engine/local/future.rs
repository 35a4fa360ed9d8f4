use crate::engine::{EngineContext, RawFuture, RawSettable};
use crate::error::Error;
use crate::payload::Payload;
use async_trait::async_trait;
use slog::{debug, Logger};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Single-assignment result cell
pub(crate) struct LocalFuture {
    value: Mutex<Option<Result<Payload, Error>>>,
    wake: Arc<Notify>,
    logger: Logger,
}

impl LocalFuture {
    pub(crate) fn new(wake: Arc<Notify>, logger: Logger) -> Self {
        Self {
            value: Mutex::new(None),
            wake,
            logger,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Result<Payload, Error>>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settle the future; later settlements are ignored
    pub(crate) fn settle(&self, result: Result<Payload, Error>) -> bool {
        {
            let mut value = self.lock();
            if value.is_some() {
                debug!(self.logger, "Ignoring second settlement of future");
                return false;
            }
            *value = Some(result);
        }
        self.wake.notify_waiters();
        true
    }
}

#[async_trait]
impl RawFuture for LocalFuture {
    async fn get(&self, _ctx: &dyn EngineContext) -> Result<Payload, Error> {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let settled = self.lock().clone();
            if let Some(result) = settled {
                return result;
            }
            notified.await;
        }
    }

    fn is_ready(&self) -> bool {
        self.lock().is_some()
    }
}

impl RawSettable for LocalFuture {
    fn set(&self, result: Result<Payload, Error>) {
        self.settle(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard};

    #[test]
    fn test_first_settlement_wins() {
        let future = LocalFuture::new(Arc::new(Notify::new()), Logger::root(Discard, o!()));
        assert!(!future.is_ready());
        assert!(future.settle(Ok(Payload::encode(&1).unwrap())));
        assert!(!future.settle(Ok(Payload::encode(&2).unwrap())));
        assert!(future.is_ready());
        let stored = future.lock().clone().unwrap().unwrap();
        assert_eq!(stored.decode::<i32>().unwrap(), 1);
    }
}
