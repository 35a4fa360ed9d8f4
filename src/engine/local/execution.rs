use super::channel::{LocalChannel, UNBOUNDED};
use super::context::LocalContext;
use super::future::LocalFuture;
use super::scheduler::{self, Coroutines};
use crate::engine::types::{
    HistoryEvent, HistoryEventKind, StartWorkflowRequest, StartedRun, WorkflowExecution,
    WorkflowExecutionDescription, WorkflowExecutionStatus, WorkflowIdReusePolicy, WorkflowInfo,
};
use crate::engine::{RawChannel, RawQueryHandler, RawUpdateHandler};
use crate::error::{EngineError, Error};
use crate::payload::Payload;
use crate::worker::Registry;
use crate::workflow::Context;
use slog::{debug, info, o, warn, Logger};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// How a run closed
#[derive(Clone, Debug)]
pub(crate) enum RunOutcome {
    Completed(Payload),
    Failed(String),
    Canceled,
    Terminated(String),
    ContinuedAsNew(String),
    TimedOut,
}

/// Everything the engine tracks for one run
pub(crate) struct RunRecord {
    pub(crate) workflow_id: String,
    pub(crate) run_id: String,
    pub(crate) first_execution_run_id: String,
    pub(crate) continued_from_run_id: Option<String>,
    pub(crate) workflow_type: String,
    pub(crate) task_queue: String,
    pub(crate) input: Payload,
    pub(crate) header: HashMap<String, Payload>,
    /// Shared by every run of a continue-as-new chain
    pub(crate) execution_deadline: Option<Instant>,
    pub(crate) start_time: SystemTime,
    pub(crate) close_time: Option<SystemTime>,
    pub(crate) outcome: Option<RunOutcome>,
    pub(crate) cancel_requested: bool,
    pub(crate) history: Vec<HistoryEvent>,
    pub(crate) signals: HashMap<String, Arc<LocalChannel>>,
    pub(crate) queries: HashMap<String, RawQueryHandler>,
    pub(crate) updates: HashMap<String, RawUpdateHandler>,
    pub(crate) done: Arc<LocalChannel>,
    pub(crate) timers: Vec<Arc<LocalFuture>>,
    pub(crate) pending_activities: usize,
    pub(crate) registry: Option<Arc<Registry>>,
    pub(crate) main_task: Option<AbortHandle>,
    /// Set once the workflow function has suspended for the first time
    pub(crate) yielded: bool,
    pub(crate) tasks: Vec<AbortHandle>,
}

impl RunRecord {
    pub(crate) fn status(&self) -> WorkflowExecutionStatus {
        match &self.outcome {
            None => WorkflowExecutionStatus::Running,
            Some(RunOutcome::Completed(_)) => WorkflowExecutionStatus::Completed,
            Some(RunOutcome::Failed(_)) => WorkflowExecutionStatus::Failed,
            Some(RunOutcome::Canceled) => WorkflowExecutionStatus::Canceled,
            Some(RunOutcome::Terminated(_)) => WorkflowExecutionStatus::Terminated,
            Some(RunOutcome::ContinuedAsNew(_)) => WorkflowExecutionStatus::ContinuedAsNew,
            Some(RunOutcome::TimedOut) => WorkflowExecutionStatus::TimedOut,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.outcome.is_none()
    }

    /// Error for a query or update with no registered handler
    ///
    /// `None` while the handler may still arrive: the run is open and its
    /// workflow function has not suspended yet.
    pub(crate) fn missing_handler(&self, kind: &str, name: &str) -> Option<Error> {
        if self.is_open() && self.main_task.is_none() {
            return Some(
                EngineError::NoWorker {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    task_queue: self.task_queue.clone(),
                }
                .into(),
            );
        }
        if self.is_open() && !self.yielded {
            return None;
        }
        Some(EngineError::InvalidArgument(format!("unknown {} type '{}'", kind, name)).into())
    }

    pub(crate) fn record(&mut self, kind: HistoryEventKind) {
        self.history.push(HistoryEvent {
            event_id: self.history.len() as u64 + 1,
            time: SystemTime::now(),
            kind,
        });
    }

    pub(crate) fn signal_channel(&mut self, name: &str, wake: &Arc<Notify>) -> Arc<LocalChannel> {
        self.signals
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(LocalChannel::new(UNBOUNDED, Arc::clone(wake))))
            .clone()
    }

    pub(crate) fn info(&self, namespace: &str) -> WorkflowInfo {
        WorkflowInfo {
            namespace: namespace.to_string(),
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            workflow_type: self.workflow_type.clone(),
            task_queue: self.task_queue.clone(),
            first_execution_run_id: self.first_execution_run_id.clone(),
            continued_from_run_id: self.continued_from_run_id.clone(),
        }
    }

    pub(crate) fn execution(&self) -> WorkflowExecution {
        WorkflowExecution {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            workflow_type: self.workflow_type.clone(),
            task_queue: self.task_queue.clone(),
            status: self.status(),
            start_time: self.start_time,
            close_time: self.close_time,
            history_length: self.history.len() as u64,
        }
    }

    pub(crate) fn description(&self) -> WorkflowExecutionDescription {
        WorkflowExecutionDescription {
            execution: self.execution(),
            first_execution_run_id: self.first_execution_run_id.clone(),
            continued_from_run_id: self.continued_from_run_id.clone(),
            pending_activities: self.pending_activities,
        }
    }
}

/// All runs known to the engine plus the attached workers
#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) runs: HashMap<String, RunRecord>,
    /// Latest run per workflow ID
    pub(crate) latest: HashMap<String, String>,
    /// Run IDs in start order
    pub(crate) order: Vec<String>,
    pub(crate) workers: HashMap<String, Arc<Registry>>,
    /// Runs waiting for a worker, per task queue
    pub(crate) pending: HashMap<String, VecDeque<String>>,
}

impl EngineState {
    /// Resolve a workflow ID and optional run ID to a run ID
    pub(crate) fn resolve(&self, workflow_id: &str, run_id: Option<&str>) -> Result<String, Error> {
        let not_found = || EngineError::NotFound {
            workflow_id: workflow_id.to_string(),
            run_id: run_id.map(str::to_string),
        };
        match run_id {
            Some(run_id) => match self.runs.get(run_id) {
                Some(run) if run.workflow_id == workflow_id => Ok(run_id.to_string()),
                _ => Err(not_found().into()),
            },
            None => self.latest.get(workflow_id).cloned().ok_or_else(|| not_found().into()),
        }
    }

    pub(crate) fn run(&self, run_id: &str) -> Result<&RunRecord, Error> {
        self.runs.get(run_id).ok_or_else(|| {
            EngineError::Internal(format!("run {} disappeared from engine state", run_id)).into()
        })
    }

    pub(crate) fn run_mut(&mut self, run_id: &str) -> Result<&mut RunRecord, Error> {
        self.runs.get_mut(run_id).ok_or_else(|| {
            EngineError::Internal(format!("run {} disappeared from engine state", run_id)).into()
        })
    }
}

/// State shared between the engine client surface and running executions
pub(crate) struct Shared {
    state: Mutex<EngineState>,
    pub(crate) wake: Arc<Notify>,
    pub(crate) namespace: String,
    pub(crate) logger: Logger,
}

impl Shared {
    pub(crate) fn new(namespace: String, logger: Logger) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            wake: Arc::new(Notify::new()),
            namespace,
            logger,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to a run if it still exists
    pub(crate) fn with_run<R>(&self, run_id: &str, f: impl FnOnce(&mut RunRecord) -> R) -> Option<R> {
        self.lock().runs.get_mut(run_id).map(f)
    }

    /// Create a run and hand it to a worker, or queue it until one attaches
    pub(crate) fn start_locked(
        self: &Arc<Self>,
        state: &mut EngineState,
        request: StartWorkflowRequest,
    ) -> Result<StartedRun, Error> {
        if let Some(previous) = state.latest.get(&request.workflow_id) {
            let previous = state.run(previous)?;
            let rejected = match request.id_reuse_policy {
                _ if previous.is_open() => true,
                WorkflowIdReusePolicy::AllowDuplicate => false,
                WorkflowIdReusePolicy::AllowDuplicateFailedOnly => {
                    previous.status() == WorkflowExecutionStatus::Completed
                }
                WorkflowIdReusePolicy::RejectDuplicate => true,
            };
            if rejected {
                return Err(EngineError::AlreadyStarted {
                    workflow_id: request.workflow_id,
                }
                .into());
            }
        }

        let run_id = Uuid::new_v4().to_string();
        let mut run = RunRecord {
            workflow_id: request.workflow_id.clone(),
            run_id: run_id.clone(),
            first_execution_run_id: run_id.clone(),
            continued_from_run_id: None,
            workflow_type: request.workflow_type.clone(),
            task_queue: request.task_queue.clone(),
            input: request.input.clone(),
            header: request.header,
            execution_deadline: request
                .execution_timeout
                .map(|timeout| Instant::now() + timeout),
            start_time: SystemTime::now(),
            close_time: None,
            outcome: None,
            cancel_requested: false,
            history: Vec::new(),
            signals: HashMap::new(),
            queries: HashMap::new(),
            updates: HashMap::new(),
            done: Arc::new(LocalChannel::new(0, Arc::clone(&self.wake))),
            timers: Vec::new(),
            pending_activities: 0,
            registry: None,
            main_task: None,
            yielded: false,
            tasks: Vec::new(),
        };
        run.record(HistoryEventKind::WorkflowExecutionStarted {
            workflow_type: request.workflow_type.clone(),
            task_queue: request.task_queue.clone(),
            input: request.input,
        });

        info!(self.logger, "Started workflow execution";
            "workflow_id" => &request.workflow_id,
            "run_id" => &run_id,
            "workflow_type" => &request.workflow_type);

        self.insert_and_dispatch(state, run);
        Ok(StartedRun {
            workflow_id: request.workflow_id,
            run_id,
        })
    }

    fn insert_and_dispatch(self: &Arc<Self>, state: &mut EngineState, run: RunRecord) {
        let run_id = run.run_id.clone();
        let task_queue = run.task_queue.clone();
        let registry = run.registry.clone();
        state.latest.insert(run.workflow_id.clone(), run_id.clone());
        state.order.push(run_id.clone());
        state.runs.insert(run_id.clone(), run);

        match registry.or_else(|| state.workers.get(&task_queue).cloned()) {
            Some(registry) => self.dispatch(state, &run_id, registry),
            None => {
                debug!(self.logger, "No worker attached, queueing run";
                    "task_queue" => &task_queue, "run_id" => &run_id);
                state.pending.entry(task_queue).or_default().push_back(run_id);
            }
        }
    }

    /// Start executing a run's workflow function on the given registry
    pub(crate) fn dispatch(self: &Arc<Self>, state: &mut EngineState, run_id: &str, registry: Arc<Registry>) {
        let Some(run) = state.runs.get_mut(run_id) else {
            return;
        };
        if !run.is_open() || run.main_task.is_some() {
            return;
        }
        let task = tokio::spawn(run_workflow(
            Arc::clone(self),
            run_id.to_string(),
            Arc::clone(&registry),
        ));
        run.registry = Some(registry);
        run.main_task = Some(task.abort_handle());
    }

    /// Take every run queued on a task queue
    pub(crate) fn drain_pending(&self, state: &mut EngineState, task_queue: &str) -> Vec<String> {
        state
            .pending
            .remove(task_queue)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Deliver a signal to an open run
    pub(crate) fn signal_locked(
        &self,
        state: &mut EngineState,
        run_id: &str,
        signal_name: &str,
        input: Payload,
        identity: &str,
    ) -> Result<(), Error> {
        let run = state.run_mut(run_id)?;
        if !run.is_open() {
            return Err(EngineError::NotFound {
                workflow_id: run.workflow_id.clone(),
                run_id: Some(run_id.to_string()),
            }
            .into());
        }
        let channel = run.signal_channel(signal_name, &self.wake);
        channel.try_send(&input)?;
        run.record(HistoryEventKind::WorkflowExecutionSignaled {
            signal_name: signal_name.to_string(),
            input,
            identity: identity.to_string(),
        });
        debug!(self.logger, "Delivered signal";
            "workflow_id" => &run.workflow_id, "run_id" => run_id, "signal" => signal_name);
        Ok(())
    }

    /// Record the end of a workflow function
    pub(crate) fn complete_run(self: &Arc<Self>, run_id: &str, result: Result<Payload, Error>) {
        let mut state = self.lock();
        let Some(run) = state.runs.get(run_id) else {
            return;
        };
        if !run.is_open() {
            return;
        }
        let cancel_requested = run.cancel_requested;

        let outcome = match result {
            Ok(value) => RunOutcome::Completed(value),
            Err(Error::ContinueAsNew {
                workflow_type,
                input,
            }) => match self.continue_locked(&mut state, run_id, workflow_type, input) {
                Ok(new_run_id) => RunOutcome::ContinuedAsNew(new_run_id),
                Err(e) => RunOutcome::Failed(e.to_string()),
            },
            Err(Error::Canceled) | Err(Error::Engine(EngineError::Canceled)) if cancel_requested => {
                RunOutcome::Canceled
            }
            Err(e) => RunOutcome::Failed(e.to_string()),
        };
        self.close_locked(&mut state, run_id, outcome);
    }

    fn continue_locked(
        self: &Arc<Self>,
        state: &mut EngineState,
        run_id: &str,
        workflow_type: String,
        input: Payload,
    ) -> Result<String, Error> {
        let previous = state.run(run_id)?;
        let new_run_id = Uuid::new_v4().to_string();
        let mut run = RunRecord {
            workflow_id: previous.workflow_id.clone(),
            run_id: new_run_id.clone(),
            first_execution_run_id: previous.first_execution_run_id.clone(),
            continued_from_run_id: Some(run_id.to_string()),
            workflow_type: workflow_type.clone(),
            task_queue: previous.task_queue.clone(),
            input: input.clone(),
            header: previous.header.clone(),
            execution_deadline: previous.execution_deadline,
            start_time: SystemTime::now(),
            close_time: None,
            outcome: None,
            cancel_requested: false,
            history: Vec::new(),
            signals: HashMap::new(),
            queries: HashMap::new(),
            updates: HashMap::new(),
            done: Arc::new(LocalChannel::new(0, Arc::clone(&self.wake))),
            timers: Vec::new(),
            pending_activities: 0,
            registry: previous.registry.clone(),
            main_task: None,
            yielded: false,
            tasks: Vec::new(),
        };
        run.record(HistoryEventKind::WorkflowExecutionStarted {
            workflow_type,
            task_queue: run.task_queue.clone(),
            input,
        });
        info!(self.logger, "Workflow continued as new";
            "workflow_id" => &run.workflow_id, "run_id" => run_id, "new_run_id" => &new_run_id);

        self.insert_and_dispatch(state, run);
        Ok(new_run_id)
    }

    /// Close a run with the given outcome and wake everyone waiting on it
    pub(crate) fn close_locked(&self, state: &mut EngineState, run_id: &str, outcome: RunOutcome) {
        let Some(run) = state.runs.get_mut(run_id) else {
            return;
        };
        if !run.is_open() {
            return;
        }
        // Termination records its own event, carrying the caller's identity
        let closing_event = match &outcome {
            RunOutcome::Completed(result) => Some(HistoryEventKind::WorkflowExecutionCompleted {
                result: result.clone(),
            }),
            RunOutcome::Failed(message) => {
                warn!(self.logger, "Workflow execution failed";
                    "workflow_id" => &run.workflow_id, "run_id" => run_id, "error" => message);
                Some(HistoryEventKind::WorkflowExecutionFailed {
                    message: message.clone(),
                })
            }
            RunOutcome::Canceled => Some(HistoryEventKind::WorkflowExecutionCanceled),
            RunOutcome::Terminated(_) => None,
            RunOutcome::ContinuedAsNew(new_run_id) => {
                Some(HistoryEventKind::WorkflowExecutionContinuedAsNew {
                    new_run_id: new_run_id.clone(),
                })
            }
            RunOutcome::TimedOut => Some(HistoryEventKind::WorkflowExecutionTimedOut),
        };
        if let Some(kind) = closing_event {
            run.record(kind);
        }
        run.outcome = Some(outcome);
        run.close_time = Some(SystemTime::now());
        for task in run.tasks.drain(..) {
            task.abort();
        }
        for timer in run.timers.drain(..) {
            timer.settle(Err(Error::Canceled));
        }
        debug!(self.logger, "Closed workflow execution";
            "workflow_id" => &run.workflow_id, "run_id" => run_id, "status" => run.status().as_str());

        let task_queue = run.task_queue.clone();
        if let Some(queue) = state.pending.get_mut(&task_queue) {
            queue.retain(|queued| queued != run_id);
        }
        self.wake.notify_waiters();
    }

    /// Outcome of a run once it has closed
    pub(crate) fn outcome(&self, run_id: &str) -> Result<Option<RunOutcome>, Error> {
        Ok(self.lock().run(run_id)?.outcome.clone())
    }
}

/// Body of the task executing one run's workflow function
async fn run_workflow(shared: Arc<Shared>, run_id: String, registry: Arc<Registry>) {
    let setup = {
        let state = shared.lock();
        state.runs.get(&run_id).map(|run| {
            (
                run.info(&shared.namespace),
                run.input.clone(),
                run.execution_deadline,
                Arc::clone(&run.done),
            )
        })
    };
    let Some((info, input, execution_deadline, done)) = setup else {
        return;
    };
    let logger = shared.logger.new(o!(
        "workflow_id" => info.workflow_id.clone(),
        "run_id" => info.run_id.clone()));

    let Some(function) = registry.workflow(&info.workflow_type) else {
        warn!(logger, "No workflow registered for type"; "workflow_type" => &info.workflow_type);
        let missing = EngineError::NoWorker {
            kind: "workflow".to_string(),
            name: info.workflow_type.clone(),
            task_queue: info.task_queue.clone(),
        };
        shared.complete_run(&run_id, Err(missing.into()));
        return;
    };

    let coroutines = Arc::new(Coroutines::default());
    let context = Context::from_raw(Arc::new(LocalContext::new(
        Arc::clone(&shared),
        info,
        registry,
        done,
        Arc::clone(&coroutines),
        logger,
    )));
    let execution = scheduler::drive(function.execute(context, input), &coroutines, || {
        shared.with_run(&run_id, |run| run.yielded = true);
        shared.wake.notify_waiters();
    });
    match execution_deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, execution).await {
            Ok(result) => shared.complete_run(&run_id, result),
            Err(_) => {
                let mut state = shared.lock();
                shared.close_locked(&mut state, &run_id, RunOutcome::TimedOut);
            }
        },
        None => {
            let result = execution.await;
            shared.complete_run(&run_id, result);
        }
    }
}
