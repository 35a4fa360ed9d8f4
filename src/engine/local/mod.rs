//! In-process engine
//!
//! `LocalEngine` keeps every run in memory and drives workflow code on the
//! tokio runtime. It serves as the development engine for workers and
//! clients living in one process, and as the test engine for the facade.

mod channel;
mod context;
mod execution;
mod future;
mod scheduler;
mod visibility;

use crate::engine::types::{
    CancelRequest, HistoryEventKind, HistoryPage, HistoryRequest, ListRequest, ListResponse,
    QueryRejectCondition, QueryRequest, QueryResponse, SignalRequest, SignalWithStartRequest,
    SingleRunOptions, StartWorkflowRequest, StartedRun, TerminateRequest, UpdateRequest,
    WorkflowExecutionDescription, WorkflowExecutionStatus,
};
use crate::engine::{EngineClient, RawChannel, RawUpdateHandle};
use crate::error::{EngineError, Error, QueryRejected};
use crate::payload::Payload;
use crate::worker::Registry;
use async_trait::async_trait;
use execution::{RunOutcome, Shared};
use slog::{debug, info, Logger};
use std::sync::Arc;
use uuid::Uuid;
use visibility::ListFilter;

const DEFAULT_PAGE_SIZE: usize = 100;

/// In-memory orchestration engine
#[derive(Clone)]
pub struct LocalEngine {
    shared: Arc<Shared>,
}

impl LocalEngine {
    pub fn new(namespace: impl Into<String>, logger: Logger) -> Self {
        Self {
            shared: Arc::new(Shared::new(namespace.into(), logger)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.shared.namespace
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("namespace", &self.shared.namespace)
            .finish()
    }
}

/// Update that already ran to completion
struct LocalUpdateHandle {
    update_id: String,
    workflow_id: String,
    run_id: String,
    result: Result<Payload, Error>,
}

#[async_trait]
impl RawUpdateHandle for LocalUpdateHandle {
    fn update_id(&self) -> &str {
        &self.update_id
    }

    fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn get(&self) -> Result<Payload, Error> {
        self.result.clone()
    }
}

fn decode_page_token(token: &[u8]) -> Result<usize, Error> {
    if token.is_empty() {
        return Ok(0);
    }
    std::str::from_utf8(token)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| EngineError::InvalidArgument("malformed page token".to_string()).into())
}

/// Slice one page out of `items`, returning the token for the next page
fn paginate<T: Clone>(items: &[T], token: &[u8], page_size: usize) -> Result<(Vec<T>, Vec<u8>), Error> {
    let offset = decode_page_token(token)?.min(items.len());
    let page_size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    };
    let end = offset.saturating_add(page_size).min(items.len());
    let next_page_token = if end < items.len() {
        end.to_string().into_bytes()
    } else {
        Vec::new()
    };
    Ok((items[offset..end].to_vec(), next_page_token))
}

#[async_trait]
impl EngineClient for LocalEngine {
    async fn start_workflow(&self, request: StartWorkflowRequest) -> Result<StartedRun, Error> {
        let mut state = self.shared.lock();
        self.shared.start_locked(&mut state, request)
    }

    async fn signal_with_start_workflow(
        &self,
        request: SignalWithStartRequest,
    ) -> Result<StartedRun, Error> {
        let SignalWithStartRequest {
            start,
            signal_name,
            signal_input,
        } = request;
        let workflow_id = start.workflow_id.clone();
        let identity = start.identity.clone();

        let mut state = self.shared.lock();
        let running = state
            .latest
            .get(&workflow_id)
            .and_then(|run_id| state.runs.get(run_id))
            .filter(|run| run.is_open())
            .map(|run| run.run_id.clone());
        let run_id = match running {
            Some(run_id) => run_id,
            None => self.shared.start_locked(&mut state, start)?.run_id,
        };
        self.shared
            .signal_locked(&mut state, &run_id, &signal_name, signal_input, &identity)?;
        Ok(StartedRun {
            workflow_id,
            run_id,
        })
    }

    async fn get_workflow_result(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
        follow_runs: bool,
    ) -> Result<Payload, Error> {
        let mut current = self.shared.lock().resolve(workflow_id, run_id)?;
        loop {
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.shared.outcome(&current)? {
                None => notified.await,
                Some(RunOutcome::Completed(result)) => return Ok(result),
                Some(RunOutcome::Failed(message)) => {
                    return Err(EngineError::WorkflowFailed { message }.into())
                }
                Some(RunOutcome::Canceled) => return Err(EngineError::Canceled.into()),
                Some(RunOutcome::Terminated(reason)) => {
                    return Err(EngineError::Terminated { reason }.into())
                }
                Some(RunOutcome::TimedOut) => {
                    return Err(EngineError::TimedOut(format!(
                        "workflow {} run {} exceeded its execution timeout",
                        workflow_id, current
                    ))
                    .into())
                }
                Some(RunOutcome::ContinuedAsNew(new_run_id)) => {
                    if !follow_runs {
                        return Err(EngineError::ContinuedAsNew { new_run_id }.into());
                    }
                    debug!(self.shared.logger, "Following continued-as-new run";
                        "workflow_id" => workflow_id, "run_id" => &new_run_id);
                    current = new_run_id;
                }
            }
        }
    }

    async fn signal_workflow(&self, request: SignalRequest) -> Result<(), Error> {
        let mut state = self.shared.lock();
        let run_id = state.resolve(&request.workflow_id, request.run_id.as_deref())?;
        self.shared.signal_locked(
            &mut state,
            &run_id,
            &request.signal_name,
            request.input,
            &request.identity,
        )
    }

    async fn query_workflow(&self, request: QueryRequest) -> Result<QueryResponse, Error> {
        loop {
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let handler = {
                let state = self.shared.lock();
                let run_id = state.resolve(&request.workflow_id, request.run_id.as_deref())?;
                let run = state.run(&run_id)?;
                let status = run.status();
                let rejected = match request.reject_condition {
                    QueryRejectCondition::None => false,
                    QueryRejectCondition::NotOpen => !run.is_open(),
                    QueryRejectCondition::NotCompletedCleanly => !matches!(
                        status,
                        WorkflowExecutionStatus::Running | WorkflowExecutionStatus::Completed
                    ),
                };
                if rejected {
                    return Ok(QueryResponse::Rejected(QueryRejected { status }));
                }
                match run.queries.get(&request.query_type) {
                    Some(handler) => Some(Arc::clone(handler)),
                    None => match run.missing_handler("query", &request.query_type) {
                        Some(err) => return Err(err),
                        None => None,
                    },
                }
            };

            // Handlers registered before the first suspension are waited for
            match handler {
                Some(handler) => return handler(request.input).map(QueryResponse::Answered),
                None => notified.await,
            }
        }
    }

    async fn update_workflow(
        &self,
        request: UpdateRequest,
    ) -> Result<Arc<dyn RawUpdateHandle>, Error> {
        let update_id = if request.update_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            request.update_id.clone()
        };

        let (run_id, handler) = loop {
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let found = {
                let state = self.shared.lock();
                let run_id = state.resolve(&request.workflow_id, request.run_id.as_deref())?;
                let run = state.run(&run_id)?;
                let chain_mismatch = request
                    .first_execution_run_id
                    .as_deref()
                    .is_some_and(|first| first != run.first_execution_run_id);
                if !run.is_open() || chain_mismatch {
                    return Err(EngineError::NotFound {
                        workflow_id: request.workflow_id.clone(),
                        run_id: Some(run_id),
                    }
                    .into());
                }
                match run.updates.get(&request.update_name) {
                    Some(handler) => Some((run_id.clone(), Arc::clone(handler))),
                    None => match run.missing_handler("update", &request.update_name) {
                        Some(err) => return Err(err),
                        None => None,
                    },
                }
            };
            match found {
                Some(found) => break found,
                None => notified.await,
            }
        };

        let result = handler(request.input);
        self.shared.with_run(&run_id, |run| {
            run.record(HistoryEventKind::UpdateCompleted {
                update_id: update_id.clone(),
                update_name: request.update_name.clone(),
            });
        });
        debug!(self.shared.logger, "Completed update";
            "workflow_id" => &request.workflow_id, "run_id" => &run_id,
            "update_id" => &update_id, "ok" => result.is_ok());

        Ok(Arc::new(LocalUpdateHandle {
            update_id,
            workflow_id: request.workflow_id,
            run_id,
            result,
        }))
    }

    async fn cancel_workflow(&self, request: CancelRequest) -> Result<(), Error> {
        let mut state = self.shared.lock();
        let run_id = state.resolve(&request.workflow_id, request.run_id.as_deref())?;
        let run = state.run_mut(&run_id)?;
        if !run.is_open() {
            return Err(EngineError::NotFound {
                workflow_id: request.workflow_id,
                run_id: Some(run_id),
            }
            .into());
        }
        if run.cancel_requested {
            return Ok(());
        }
        run.cancel_requested = true;
        run.record(HistoryEventKind::WorkflowExecutionCancelRequested {
            identity: request.identity,
        });
        run.done.close();
        for timer in run.timers.drain(..) {
            timer.settle(Err(Error::Canceled));
        }
        let dispatched = run.main_task.is_some();
        info!(self.shared.logger, "Requested workflow cancellation";
            "workflow_id" => &request.workflow_id, "run_id" => &run_id);

        if !dispatched {
            self.shared
                .close_locked(&mut state, &run_id, RunOutcome::Canceled);
        }
        self.shared.wake.notify_waiters();
        Ok(())
    }

    async fn terminate_workflow(&self, request: TerminateRequest) -> Result<(), Error> {
        let mut state = self.shared.lock();
        let run_id = state.resolve(&request.workflow_id, request.run_id.as_deref())?;
        let run = state.run_mut(&run_id)?;
        if !run.is_open() {
            return Err(EngineError::NotFound {
                workflow_id: request.workflow_id,
                run_id: Some(run_id),
            }
            .into());
        }
        run.record(HistoryEventKind::WorkflowExecutionTerminated {
            reason: request.reason.clone(),
            identity: request.identity,
        });
        if let Some(task) = run.main_task.take() {
            task.abort();
        }
        info!(self.shared.logger, "Terminated workflow execution";
            "workflow_id" => &request.workflow_id, "run_id" => &run_id,
            "reason" => &request.reason, "details" => request.details.len());
        self.shared
            .close_locked(&mut state, &run_id, RunOutcome::Terminated(request.reason));
        Ok(())
    }

    async fn get_workflow_history(&self, request: HistoryRequest) -> Result<HistoryPage, Error> {
        let state = self.shared.lock();
        let run_id = state.resolve(&request.workflow_id, request.run_id.as_deref())?;
        let run = state.run(&run_id)?;
        let (events, next_page_token) =
            paginate(&run.history, &request.next_page_token, request.page_size)?;
        Ok(HistoryPage {
            events,
            next_page_token,
        })
    }

    async fn describe_workflow_execution(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> Result<WorkflowExecutionDescription, Error> {
        let state = self.shared.lock();
        let run_id = state.resolve(workflow_id, run_id)?;
        Ok(state.run(&run_id)?.description())
    }

    async fn list_workflow(&self, request: ListRequest) -> Result<ListResponse, Error> {
        let filter = ListFilter::parse(&request.query)?;
        let state = self.shared.lock();
        let matching: Vec<_> = state
            .order
            .iter()
            .rev()
            .filter_map(|run_id| state.runs.get(run_id))
            .map(|run| run.execution())
            .filter(|execution| filter.matches(execution))
            .collect();
        let (executions, next_page_token) =
            paginate(&matching, &request.next_page_token, request.page_size)?;
        Ok(ListResponse {
            executions,
            next_page_token,
        })
    }

    fn attach_worker(&self, task_queue: &str, registry: Arc<Registry>) -> Result<(), Error> {
        let mut state = self.shared.lock();
        if state.workers.contains_key(task_queue) {
            return Err(EngineError::InvalidArgument(format!(
                "a worker is already attached to task queue '{}'",
                task_queue
            ))
            .into());
        }
        state
            .workers
            .insert(task_queue.to_string(), Arc::clone(&registry));
        let queued = self.shared.drain_pending(&mut state, task_queue);
        info!(self.shared.logger, "Worker attached";
            "task_queue" => task_queue, "queued_runs" => queued.len());
        for run_id in queued {
            self.shared.dispatch(&mut state, &run_id, Arc::clone(&registry));
        }
        Ok(())
    }

    fn detach_worker(&self, task_queue: &str) {
        if self.shared.lock().workers.remove(task_queue).is_some() {
            info!(self.shared.logger, "Worker detached"; "task_queue" => task_queue);
        }
    }

    async fn execute_single_run(
        &self,
        task_queue: &str,
        registry: Arc<Registry>,
        options: SingleRunOptions,
    ) -> Result<(), Error> {
        let capabilities = options.server_capabilities.unwrap_or_default();
        let dispatched = {
            let mut state = self.shared.lock();
            let queued = self.shared.drain_pending(&mut state, task_queue);
            for run_id in &queued {
                self.shared.dispatch(&mut state, run_id, Arc::clone(&registry));
            }
            queued
        };
        info!(self.shared.logger, "Executing single worker run";
            "task_queue" => task_queue,
            "runs" => dispatched.len(),
            "eager_workflow_start" => capabilities.eager_workflow_start);

        let all_closed = async {
            loop {
                let notified = self.shared.wake.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let open = {
                    let state = self.shared.lock();
                    dispatched
                        .iter()
                        .filter_map(|run_id| state.runs.get(run_id))
                        .any(|run| run.is_open())
                };
                if !open {
                    return;
                }
                notified.await;
            }
        };
        match options.deadline {
            Some(deadline) => tokio::time::timeout(deadline, all_closed)
                .await
                .map_err(|_| {
                    EngineError::TimedOut(format!(
                        "single run on task queue '{}' exceeded {:?}",
                        task_queue, deadline
                    ))
                    .into()
                }),
            None => {
                all_closed.await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_walks_pages() {
        let items: Vec<u32> = (0..5).collect();
        let (page, token) = paginate(&items, &[], 2).unwrap();
        assert_eq!(page, vec![0, 1]);
        assert_eq!(token, b"2".to_vec());
        let (page, token) = paginate(&items, &token, 2).unwrap();
        assert_eq!(page, vec![2, 3]);
        let (page, token) = paginate(&items, &token, 2).unwrap();
        assert_eq!(page, vec![4]);
        assert!(token.is_empty());
    }

    #[test]
    fn test_paginate_rejects_garbage_token() {
        let items = vec![1];
        assert!(paginate(&items, b"xyz", 10).is_err());
    }
}
