use super::channel::{LocalChannel, ParkedReceiver};
use super::execution::Shared;
use super::future::LocalFuture;
use super::scheduler::Coroutines;
use crate::descriptor::ActivityContext;
use crate::engine::types::{ActivityInfo, ActivityOptions, HistoryEventKind, WorkflowInfo};
use crate::engine::{
    EngineContext, RawChannel, RawFuture, RawQueryHandler, RawReceive, RawSelectCase,
    RawSelected, RawSettable, RawUpdateHandler,
};
use crate::error::{EngineError, Error};
use crate::payload::Payload;
use crate::worker::Registry;
use async_trait::async_trait;
use futures::future::BoxFuture;
use slog::{debug, o, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Execution frame handed to workflow code by the local engine
pub(crate) struct LocalContext {
    shared: Arc<Shared>,
    info: WorkflowInfo,
    registry: Arc<Registry>,
    done: Arc<LocalChannel>,
    coroutines: Arc<Coroutines>,
    logger: Logger,
}

impl LocalContext {
    pub(crate) fn new(
        shared: Arc<Shared>,
        info: WorkflowInfo,
        registry: Arc<Registry>,
        done: Arc<LocalChannel>,
        coroutines: Arc<Coroutines>,
        logger: Logger,
    ) -> Self {
        Self {
            shared,
            info,
            registry,
            done,
            coroutines,
            logger,
        }
    }

    fn run_id(&self) -> &str {
        &self.info.run_id
    }

    /// Tie a background task to the run so it stops when the run closes
    fn track(&self, task: AbortHandle) {
        let mut task = Some(task);
        self.shared.with_run(self.run_id(), |run| {
            if run.is_open() {
                run.tasks.extend(task.take());
            }
        });
        if let Some(task) = task {
            task.abort();
        }
    }

    fn new_local_future(&self) -> Arc<LocalFuture> {
        Arc::new(LocalFuture::new(
            Arc::clone(&self.shared.wake),
            self.logger.clone(),
        ))
    }
}

#[async_trait]
impl EngineContext for LocalContext {
    fn info(&self) -> WorkflowInfo {
        self.info.clone()
    }

    fn logger(&self) -> Logger {
        self.logger.clone()
    }

    fn done(&self) -> Arc<dyn RawChannel> {
        self.done.clone()
    }

    fn is_canceled(&self) -> bool {
        self.shared
            .with_run(self.run_id(), |run| run.cancel_requested)
            .unwrap_or(false)
    }

    fn header(&self, key: &str) -> Option<Payload> {
        self.shared
            .with_run(self.run_id(), |run| run.header.get(key).cloned())
            .flatten()
    }

    fn new_channel(&self, capacity: usize) -> Arc<dyn RawChannel> {
        Arc::new(LocalChannel::new(capacity, Arc::clone(&self.shared.wake)))
    }

    fn new_future(&self) -> (Arc<dyn RawFuture>, Arc<dyn RawSettable>) {
        let future = self.new_local_future();
        let read: Arc<dyn RawFuture> = future.clone();
        (read, future)
    }

    fn new_timer(&self, duration: Duration) -> Arc<dyn RawFuture> {
        let timer = self.new_local_future();
        let timer_id = Uuid::new_v4().to_string();

        let canceled = self
            .shared
            .with_run(self.run_id(), |run| {
                run.record(HistoryEventKind::TimerStarted {
                    timer_id: timer_id.clone(),
                    duration,
                });
                if !run.cancel_requested {
                    run.timers.push(Arc::clone(&timer));
                }
                run.cancel_requested
            })
            .unwrap_or(true);
        if canceled {
            timer.settle(Err(Error::Canceled));
            return timer;
        }

        let shared = Arc::clone(&self.shared);
        let run_id = self.run_id().to_string();
        let fired = Arc::clone(&timer);
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            shared.with_run(&run_id, |run| {
                run.record(HistoryEventKind::TimerFired { timer_id });
                run.timers.retain(|pending| !Arc::ptr_eq(pending, &fired));
            });
            fired.settle(Ok(Payload::unit()));
        });
        self.track(task.abort_handle());
        timer
    }

    fn signal_channel(&self, name: &str) -> Arc<dyn RawChannel> {
        let wake = Arc::clone(&self.shared.wake);
        match self
            .shared
            .with_run(self.run_id(), |run| run.signal_channel(name, &wake))
        {
            Some(channel) => channel,
            None => Arc::new(LocalChannel::new(0, wake)),
        }
    }

    fn set_query_handler(&self, name: &str, handler: RawQueryHandler) -> Result<(), Error> {
        self.shared
            .with_run(self.run_id(), |run| {
                run.queries.insert(name.to_string(), handler);
            })
            .ok_or_else(|| EngineError::Internal(format!("run {} is gone", self.run_id())))?;
        self.shared.wake.notify_waiters();
        Ok(())
    }

    fn set_update_handler(&self, name: &str, handler: RawUpdateHandler) -> Result<(), Error> {
        self.shared
            .with_run(self.run_id(), |run| {
                run.updates.insert(name.to_string(), handler);
            })
            .ok_or_else(|| EngineError::Internal(format!("run {} is gone", self.run_id())))?;
        self.shared.wake.notify_waiters();
        Ok(())
    }

    fn execute_activity(
        &self,
        activity_type: &str,
        input: Payload,
        options: ActivityOptions,
    ) -> Arc<dyn RawFuture> {
        let result = self.new_local_future();
        let activity_id = options
            .activity_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.shared.with_run(self.run_id(), |run| {
            run.record(HistoryEventKind::ActivityTaskScheduled {
                activity_id: activity_id.clone(),
                activity_type: activity_type.to_string(),
            });
            run.pending_activities += 1;
        });

        let Some(function) = self.registry.activity(activity_type) else {
            let missing = EngineError::NoWorker {
                kind: "activity".to_string(),
                name: activity_type.to_string(),
                task_queue: self.info.task_queue.clone(),
            };
            self.shared.with_run(self.run_id(), |run| {
                run.pending_activities = run.pending_activities.saturating_sub(1);
                run.record(HistoryEventKind::ActivityTaskFailed {
                    activity_id: activity_id.clone(),
                    message: missing.to_string(),
                });
            });
            result.settle(Err(missing.into()));
            return result;
        };

        let logger = self.logger.new(o!(
            "activity_id" => activity_id.clone(),
            "activity_type" => activity_type.to_string()));
        debug!(logger, "Scheduling activity");
        let activity_ctx = ActivityContext::new(
            ActivityInfo {
                activity_id: activity_id.clone(),
                activity_type: activity_type.to_string(),
                workflow_id: self.info.workflow_id.clone(),
                workflow_run_id: self.info.run_id.clone(),
                task_queue: self.info.task_queue.clone(),
                attempt: 1,
            },
            logger,
        );

        let shared = Arc::clone(&self.shared);
        let run_id = self.run_id().to_string();
        let activity_type = activity_type.to_string();
        let settled = Arc::clone(&result);
        let task = tokio::spawn(async move {
            let execution = function.execute(activity_ctx, input);
            let outcome = match options.start_to_close_timeout {
                Some(limit) => match tokio::time::timeout(limit, execution).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::application(format!(
                        "start-to-close timeout of {:?} exceeded",
                        limit
                    ))),
                },
                None => execution.await,
            };
            let outcome = outcome.map_err(|e| {
                Error::from(EngineError::ActivityFailed {
                    activity_type,
                    message: e.to_string(),
                })
            });

            shared.with_run(&run_id, |run| {
                run.pending_activities = run.pending_activities.saturating_sub(1);
                let kind = match &outcome {
                    Ok(_) => HistoryEventKind::ActivityTaskCompleted { activity_id },
                    Err(e) => HistoryEventKind::ActivityTaskFailed {
                        activity_id,
                        message: e.to_string(),
                    },
                };
                run.record(kind);
            });
            settled.settle(outcome);
        });
        self.track(task.abort_handle());
        result
    }

    fn spawn(&self, coroutine: BoxFuture<'static, ()>) {
        self.coroutines.spawn(coroutine);
    }

    async fn select(&self, cases: &[RawSelectCase]) -> Result<RawSelected, Error> {
        // Receive cases count as parked receivers until the select returns
        let mut parked: Vec<ParkedReceiver<'_>> = Vec::new();
        loop {
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut default_index = None;
            for (index, case) in cases.iter().enumerate() {
                match case {
                    RawSelectCase::Receive(channel) => match channel.try_receive() {
                        RawReceive::Value(value) => {
                            return Ok(RawSelected::Received {
                                index,
                                value: Some(value),
                            })
                        }
                        RawReceive::Closed => {
                            return Ok(RawSelected::Received { index, value: None })
                        }
                        RawReceive::Empty => {}
                    },
                    RawSelectCase::Send(channel, value) => {
                        if channel.try_send(value)? {
                            return Ok(RawSelected::Sent { index });
                        }
                    }
                    RawSelectCase::Future(future) => {
                        if future.is_ready() {
                            return Ok(RawSelected::FutureReady { index });
                        }
                    }
                    RawSelectCase::Default => {
                        default_index.get_or_insert(index);
                    }
                }
            }
            if let Some(index) = default_index {
                return Ok(RawSelected::Default { index });
            }
            if parked.is_empty() {
                parked = cases
                    .iter()
                    .filter_map(|case| match case {
                        RawSelectCase::Receive(channel) => Some(ParkedReceiver::new(channel.as_ref())),
                        _ => None,
                    })
                    .collect();
            }
            notified.await;
        }
    }
}
