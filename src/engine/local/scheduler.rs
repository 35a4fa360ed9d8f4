use crate::error::Error;
use crate::payload::Payload;
use futures::future::{poll_fn, BoxFuture};
use futures::task::AtomicWaker;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};
use std::task::Poll;

type Coroutine = BoxFuture<'static, std::thread::Result<()>>;

/// Coroutines started by one run, waiting to be picked up by its task
#[derive(Default)]
pub(crate) struct Coroutines {
    spawned: Mutex<Vec<Coroutine>>,
    waker: AtomicWaker,
}

impl Coroutines {
    pub(crate) fn spawn(&self, coroutine: BoxFuture<'static, ()>) {
        let coroutine = AssertUnwindSafe(coroutine).catch_unwind().boxed();
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(coroutine);
        self.waker.wake();
    }

    fn take_spawned(&self) -> Vec<Coroutine> {
        std::mem::take(&mut *self.spawned.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Drive a run's main future and its coroutines on the calling task
///
/// Each pass polls the main future first, then every coroutine in spawn
/// order, so only one piece of workflow code runs at a time. The run ends
/// with the main future; coroutines still suspended at that point are
/// dropped. `on_first_yield` fires once the main future has suspended for
/// the first time.
pub(crate) async fn drive(
    main: BoxFuture<'static, Result<Payload, Error>>,
    coroutines: &Coroutines,
    on_first_yield: impl FnOnce() + Send,
) -> Result<Payload, Error> {
    let mut main = AssertUnwindSafe(main).catch_unwind();
    let mut running: Vec<Option<Coroutine>> = Vec::new();
    let mut on_first_yield = Some(on_first_yield);

    poll_fn(move |cx| {
        coroutines.waker.register(cx.waker());
        if let Poll::Ready(outcome) = main.poll_unpin(cx) {
            return Poll::Ready(outcome.unwrap_or_else(|_| {
                Err(Error::application("workflow function panicked"))
            }));
        }

        let mut index = 0;
        loop {
            running.extend(coroutines.take_spawned().into_iter().map(Some));
            let Some(slot) = running.get_mut(index) else {
                break;
            };
            if let Some(coroutine) = slot {
                if let Poll::Ready(outcome) = coroutine.poll_unpin(cx) {
                    *slot = None;
                    if outcome.is_err() {
                        return Poll::Ready(Err(Error::application(
                            "workflow coroutine panicked",
                        )));
                    }
                }
            }
            index += 1;
        }
        running.retain(Option::is_some);

        if let Some(first_yield) = on_first_yield.take() {
            first_yield();
        }
        Poll::Pending
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_coroutines_polled_in_spawn_order() {
        let coroutines = Arc::new(Coroutines::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let spawner = Arc::clone(&coroutines);
        let seen = Arc::clone(&order);
        let main = async move {
            for i in 0..3 {
                let seen = Arc::clone(&seen);
                spawner.spawn(Box::pin(async move {
                    seen.lock().unwrap().push(i);
                }));
            }
            tokio::task::yield_now().await;
            Ok::<_, Error>(Payload::unit())
        };

        let mut yielded = false;
        drive(Box::pin(main), &coroutines, || yielded = true)
            .await
            .unwrap();
        assert!(yielded);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_coroutine_panic_fails_the_run() {
        let coroutines = Arc::new(Coroutines::default());
        let spawner = Arc::clone(&coroutines);
        let main = async move {
            spawner.spawn(Box::pin(async {
                panic!("boom");
            }));
            futures::future::pending::<()>().await;
            Ok::<_, Error>(Payload::unit())
        };

        let err = drive(Box::pin(main), &coroutines, || {}).await.unwrap_err();
        assert!(err.to_string().contains("workflow coroutine panicked"));
    }
}
