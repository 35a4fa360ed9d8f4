mod common;

use common::run_workflow;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use typeflow::workflow::{new_future, select, Channel, ReceiveChannel, SelectCase};
use typeflow::{Context, Error};

#[tokio::test]
async fn test_buffered_channel_is_fifo() {
    let received = run_workflow("BufferedFifo", (), |ctx: Context, _: ()| async move {
        let channel = Channel::<u32>::new(&ctx, 3);
        for i in 1..=3 {
            channel.send(&ctx, i).await?;
        }
        assert_eq!(channel.len(), 3);
        channel.close();

        let mut received = Vec::new();
        while let Some(value) = channel.receive_opt(&ctx).await? {
            received.push(value);
        }
        // Closed and drained
        assert_eq!(channel.receive(&ctx).await?, 0);
        assert_eq!(channel.try_receive(&ctx)?, None);
        Ok(received)
    })
    .await
    .unwrap();

    assert_eq!(received, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_unbuffered_channel_between_coroutines() {
    let received = run_workflow("Rendezvous", (), |ctx: Context, _: ()| async move {
        let channel = Channel::<String>::new(&ctx, 0);
        let sender = channel.sender();
        ctx.go(move |ctx: Context| async move {
            for word in ["alpha", "beta", "gamma"] {
                if sender.send(&ctx, word.to_string()).await.is_err() {
                    return;
                }
            }
            sender.close();
        });

        let receiver = channel.receiver();
        let mut received = Vec::new();
        while let Some(word) = receiver.receive_opt(&ctx).await? {
            received.push(word);
        }
        Ok(received)
    })
    .await
    .unwrap();

    assert_eq!(received, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn test_send_on_closed_channel_fails() {
    let failed = run_workflow("SendClosed", (), |ctx: Context, _: ()| async move {
        let channel = Channel::<u32>::new(&ctx, 1);
        channel.close();
        Ok(channel.send(&ctx, 7).await.is_err())
    })
    .await
    .unwrap();

    assert!(failed);
}

#[tokio::test]
async fn test_receive_reports_decode_failure() {
    let decode_failed = run_workflow("DecodeFailure", (), |ctx: Context, _: ()| async move {
        let channel = Channel::<String>::new(&ctx, 1);
        channel.send(&ctx, "not a number".to_string()).await?;

        let numbers: ReceiveChannel<u32> = ReceiveChannel::from_raw(channel.raw().clone());
        Ok(matches!(numbers.receive(&ctx).await, Err(Error::Decode(_))))
    })
    .await
    .unwrap();

    assert!(decode_failed);
}

#[tokio::test]
async fn test_future_keeps_first_settlement() {
    let value = run_workflow("FirstSettlement", (), |ctx: Context, _: ()| async move {
        let (future, resolver) = new_future::<u32>(&ctx);
        assert!(!future.is_ready());

        resolver.resolve(1);
        resolver.resolve(2);
        resolver.resolve_error(Error::application("too late"));

        assert!(future.is_ready());
        // Reading twice returns the same value
        assert_eq!(future.get(&ctx).await?, 1);
        future.get(&ctx).await
    })
    .await
    .unwrap();

    assert_eq!(value, 1);
}

#[tokio::test]
async fn test_future_resolved_by_coroutine() {
    let value = run_workflow("CoroutineFuture", (), |ctx: Context, _: ()| async move {
        let (future, resolver) = new_future::<String>(&ctx);
        ctx.go(move |ctx: Context| async move {
            if ctx.sleep(Duration::from_millis(20)).await.is_ok() {
                resolver.resolve("woke up".to_string());
            }
        });
        future.get(&ctx).await
    })
    .await
    .unwrap();

    assert_eq!(value, "woke up");
}

#[tokio::test]
async fn test_select_fires_first_ready_case() {
    let fired = run_workflow("SelectOrder", (), |ctx: Context, _: ()| async move {
        let first = Channel::<String>::new(&ctx, 1);
        let second = Channel::<String>::new(&ctx, 1);
        first.send(&ctx, "first".to_string()).await?;
        second.send(&ctx, "second".to_string()).await?;

        let mut from_first = None;
        let mut from_second = None;
        select(
            &ctx,
            vec![
                SelectCase::receive(&first.receiver(), |v: String| {
                    from_first = Some(v);
                    Ok(())
                }),
                SelectCase::receive(&second.receiver(), |v: String| {
                    from_second = Some(v);
                    Ok(())
                }),
            ],
        )
        .await?;

        // The second value was not consumed
        assert_eq!(second.len(), 1);
        Ok((from_first, from_second))
    })
    .await
    .unwrap();

    assert_eq!(fired, (Some("first".to_string()), None));
}

#[tokio::test]
async fn test_select_default_when_nothing_ready() {
    let took_default = run_workflow("SelectDefault", (), |ctx: Context, _: ()| async move {
        let channel = Channel::<u32>::new(&ctx, 1);
        let (future, _resolver) = new_future::<u32>(&ctx);

        let mut took_default = false;
        select(
            &ctx,
            vec![
                SelectCase::receive(&channel.receiver(), |_: u32| Ok(())),
                SelectCase::future(&future, || Ok(())),
                SelectCase::default(|| {
                    took_default = true;
                    Ok(())
                }),
            ],
        )
        .await?;
        Ok(took_default)
    })
    .await
    .unwrap();

    assert!(took_default);
}

#[tokio::test]
async fn test_select_waits_for_future() {
    let value = run_workflow("SelectFuture", (), |ctx: Context, _: ()| async move {
        let idle = Channel::<u32>::new(&ctx, 1);
        let (future, resolver) = new_future::<u32>(&ctx);
        ctx.go(move |_ctx: Context| async move {
            resolver.resolve(42);
        });

        let mut future_fired = false;
        select(
            &ctx,
            vec![
                SelectCase::try_receive(&idle.receiver(), |_: Option<u32>| Ok(())),
                SelectCase::future(&future, || {
                    future_fired = true;
                    Ok(())
                }),
            ],
        )
        .await?;
        assert!(future_fired);
        future.get(&ctx).await
    })
    .await
    .unwrap();

    assert_eq!(value, 42);
}

#[tokio::test]
async fn test_select_send_case() {
    let received = run_workflow("SelectSend", (), |ctx: Context, _: ()| async move {
        let channel = Channel::<u32>::new(&ctx, 1);
        let mut sent = false;
        select(
            &ctx,
            vec![SelectCase::send(&channel.sender(), 9, || {
                sent = true;
                Ok(())
            })],
        )
        .await?;
        assert!(sent);
        channel.receive(&ctx).await
    })
    .await
    .unwrap();

    assert_eq!(received, 9);
}

#[tokio::test]
async fn test_select_callback_error_is_returned() {
    let result = run_workflow("SelectCallbackError", (), |ctx: Context, _: ()| async move {
        select(
            &ctx,
            vec![SelectCase::default(|| Err(Error::application("callback failed")))],
        )
        .await?;
        Ok(())
    })
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("callback failed"), "{}", err);
}

/// Context of a finished run, for exercising argument checks
async fn captured_context(name: &'static str) -> Context {
    let slot: Arc<Mutex<Option<Context>>> = Arc::default();
    let captured = Arc::clone(&slot);
    run_workflow(name, (), move |ctx: Context, _: ()| {
        let captured = Arc::clone(&captured);
        async move {
            *captured.lock().unwrap() = Some(ctx);
            Ok(())
        }
    })
    .await
    .unwrap();
    let ctx = slot.lock().unwrap().take().unwrap();
    ctx
}

#[tokio::test]
#[should_panic(expected = "select requires at least one case")]
async fn test_select_without_cases_panics() {
    let ctx = captured_context("SelectNoCases").await;
    let _ = select(&ctx, Vec::new()).await;
}

#[tokio::test]
#[should_panic(expected = "select accepts at most one default case")]
async fn test_select_with_two_defaults_panics() {
    let ctx = captured_context("SelectTwoDefaults").await;
    let _ = select(
        &ctx,
        vec![SelectCase::default(|| Ok(())), SelectCase::default(|| Ok(()))],
    )
    .await;
}

#[tokio::test]
async fn test_select_send_meets_select_receive_on_unbuffered_channel() {
    let workflow = run_workflow("SelectRendezvous", (), |ctx: Context, _: ()| async move {
        let channel = Channel::<u32>::new(&ctx, 0);
        let sender = channel.sender();
        ctx.go(move |ctx: Context| async move {
            let _ = select(&ctx, vec![SelectCase::send(&sender, 7, || Ok(()))]).await;
        });

        let mut received = 0;
        select(
            &ctx,
            vec![SelectCase::receive(&channel.receiver(), |value: u32| {
                received = value;
                Ok(())
            })],
        )
        .await?;
        Ok(received)
    });

    let received = tokio::time::timeout(Duration::from_secs(2), workflow)
        .await
        .expect("select cases never met")
        .unwrap();
    assert_eq!(received, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_coroutines_of_one_run_never_overlap() {
    let (peak, threads) = run_workflow("NoOverlap", (), |ctx: Context, _: ()| async move {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let threads = Arc::new(Mutex::new(HashSet::new()));
        let finished = Channel::<()>::new(&ctx, 2);

        for _ in 0..2 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let threads = Arc::clone(&threads);
            let finished = finished.sender();
            ctx.go(move |ctx: Context| async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                threads.lock().unwrap().insert(std::thread::current().id());
                std::thread::sleep(Duration::from_millis(100));
                active.fetch_sub(1, Ordering::SeqCst);
                let _ = finished.send(&ctx, ()).await;
            });
        }
        for _ in 0..2 {
            finished.receive(&ctx).await?;
        }
        let distinct_threads = threads.lock().unwrap().len();
        Ok((peak.load(Ordering::SeqCst), distinct_threads))
    })
    .await
    .unwrap();

    assert_eq!(peak, 1);
    assert_eq!(threads, 1);
}

#[tokio::test]
async fn test_coroutines_start_in_spawn_order() {
    let order = run_workflow("SpawnOrder", (), |ctx: Context, _: ()| async move {
        let log = Channel::<u32>::new(&ctx, 3);
        for i in 1..=3 {
            let log = log.sender();
            ctx.go(move |ctx: Context| async move {
                let _ = log.send(&ctx, i).await;
            });
        }
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(log.receive(&ctx).await?);
        }
        Ok(order)
    })
    .await
    .unwrap();

    assert_eq!(order, vec![1, 2, 3]);
}
