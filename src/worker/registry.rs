use crate::descriptor::ActivityContext;
use crate::error::Error;
use crate::payload::Payload;
use crate::workflow::Context;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A workflow implementation with typed input and output
///
/// Implemented for every `Fn(Context, I) -> impl Future<Output = Result<O, Error>>`,
/// so plain async functions and closures can be registered directly.
pub trait WorkflowFunction<I, O>: Send + Sync + 'static {
    fn execute(&self, ctx: Context, input: I) -> BoxFuture<'static, Result<O, Error>>;
}

impl<I, O, F, Fut> WorkflowFunction<I, O> for F
where
    F: Fn(Context, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, Error>> + Send + 'static,
{
    fn execute(&self, ctx: Context, input: I) -> BoxFuture<'static, Result<O, Error>> {
        Box::pin((self)(ctx, input))
    }
}

/// An activity implementation with typed input and output
pub trait ActivityFunction<I, O>: Send + Sync + 'static {
    fn execute(&self, ctx: ActivityContext, input: I) -> BoxFuture<'static, Result<O, Error>>;
}

impl<I, O, F, Fut> ActivityFunction<I, O> for F
where
    F: Fn(ActivityContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, Error>> + Send + 'static,
{
    fn execute(&self, ctx: ActivityContext, input: I) -> BoxFuture<'static, Result<O, Error>> {
        Box::pin((self)(ctx, input))
    }
}

type Executor<C> = Box<dyn Fn(C, Payload) -> BoxFuture<'static, Result<Payload, Error>> + Send + Sync>;

/// Type-erased workflow function operating on payloads
pub struct BoxedWorkflowFunction {
    executor: Executor<Context>,
}

impl BoxedWorkflowFunction {
    pub fn new<I, O, F>(func: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: WorkflowFunction<I, O>,
    {
        let func = Arc::new(func);
        let executor: Executor<Context> = Box::new(move |ctx: Context, input: Payload| {
            let func = Arc::clone(&func);
            Box::pin(async move {
                let input: I = input.decode()?;
                let output = func.execute(ctx, input).await?;
                Payload::encode(&output)
            }) as BoxFuture<'static, Result<Payload, Error>>
        });
        Self { executor }
    }

    pub fn execute(&self, ctx: Context, input: Payload) -> BoxFuture<'static, Result<Payload, Error>> {
        (self.executor)(ctx, input)
    }
}

/// Type-erased activity function operating on payloads
pub struct BoxedActivityFunction {
    executor: Executor<ActivityContext>,
}

impl BoxedActivityFunction {
    pub fn new<I, O, F>(func: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: ActivityFunction<I, O>,
    {
        let func = Arc::new(func);
        let executor: Executor<ActivityContext> = Box::new(move |ctx: ActivityContext, input: Payload| {
            let func = Arc::clone(&func);
            Box::pin(async move {
                let input: I = input.decode()?;
                let output = func.execute(ctx, input).await?;
                Payload::encode(&output)
            }) as BoxFuture<'static, Result<Payload, Error>>
        });
        Self { executor }
    }

    pub fn execute(
        &self,
        ctx: ActivityContext,
        input: Payload,
    ) -> BoxFuture<'static, Result<Payload, Error>> {
        (self.executor)(ctx, input)
    }
}

/// Workflow and activity implementations a worker serves, keyed by name
#[derive(Clone, Default)]
pub struct Registry {
    workflows: HashMap<String, Arc<BoxedWorkflowFunction>>,
    activities: HashMap<String, Arc<BoxedActivityFunction>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow implementation
    ///
    /// Fails with [`Error::AlreadyRegistered`] if the name is taken.
    pub fn register_workflow<I, O, F>(&mut self, name: &str, function: F) -> Result<(), Error>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: WorkflowFunction<I, O>,
    {
        if self.workflows.contains_key(name) {
            return Err(Error::AlreadyRegistered {
                kind: "workflow",
                name: name.to_string(),
            });
        }
        self.workflows
            .insert(name.to_string(), Arc::new(BoxedWorkflowFunction::new(function)));
        Ok(())
    }

    /// Register an activity implementation
    pub fn register_activity<I, O, F>(&mut self, name: &str, function: F) -> Result<(), Error>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: ActivityFunction<I, O>,
    {
        if self.activities.contains_key(name) {
            return Err(Error::AlreadyRegistered {
                kind: "activity",
                name: name.to_string(),
            });
        }
        self.activities
            .insert(name.to_string(), Arc::new(BoxedActivityFunction::new(function)));
        Ok(())
    }

    pub fn workflow(&self, name: &str) -> Option<Arc<BoxedWorkflowFunction>> {
        self.workflows.get(name).cloned()
    }

    pub fn activity(&self, name: &str) -> Option<Arc<BoxedActivityFunction>> {
        self.activities.get(name).cloned()
    }

    pub fn contains_workflow(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    pub fn contains_activity(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    /// Number of registered workflows and activities
    pub fn len(&self) -> usize {
        self.workflows.len() + self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty() && self.activities.is_empty()
    }

    pub fn list_workflows(&self) -> Vec<String> {
        self.workflows.keys().cloned().collect()
    }

    pub fn list_activities(&self) -> Vec<String> {
        self.activities.keys().cloned().collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("workflows", &self.list_workflows())
            .field("activities", &self.list_activities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ActivityInfo;
    use serde::Deserialize;
    use slog::{o, Discard, Logger};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct TestInput {
        value: i32,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct TestOutput {
        result: i32,
    }

    async fn double(_ctx: ActivityContext, input: TestInput) -> Result<TestOutput, Error> {
        Ok(TestOutput {
            result: input.value * 2,
        })
    }

    fn activity_context() -> ActivityContext {
        ActivityContext::new(
            ActivityInfo {
                activity_id: "1".into(),
                activity_type: "double".into(),
                workflow_id: "wf".into(),
                workflow_run_id: "run".into(),
                task_queue: "queue".into(),
                attempt: 1,
            },
            Logger::root(Discard, o!()),
        )
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = Registry::new();
        registry.register_activity("double", double).unwrap();

        let err = registry.register_activity("double", double).unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered { kind: "activity", .. }));

        // Workflows and activities live in separate namespaces
        registry
            .register_workflow("double", |_ctx: Context, input: TestInput| async move {
                Ok::<_, Error>(input.value)
            })
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_boxed_activity_round_trip() {
        let mut registry = Registry::new();
        registry.register_activity("double", double).unwrap();

        let activity = registry.activity("double").unwrap();
        let input = Payload::encode(&TestInput { value: 21 }).unwrap();
        let output = activity.execute(activity_context(), input).await.unwrap();
        assert_eq!(output.decode::<TestOutput>().unwrap(), TestOutput { result: 42 });
    }

    #[tokio::test]
    async fn test_boxed_activity_surfaces_decode_error() {
        let mut registry = Registry::new();
        registry.register_activity("double", double).unwrap();

        let activity = registry.activity("double").unwrap();
        let input = Payload::encode(&"not an object").unwrap();
        let err = activity.execute(activity_context(), input).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_registry_utility_methods() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());

        registry.register_activity("a1", double).unwrap();
        registry.register_activity("a2", double).unwrap();

        assert!(!registry.is_empty());
        assert!(registry.contains_activity("a1"));
        assert!(!registry.contains_workflow("a1"));
        assert!(registry.workflow("missing").is_none());

        let mut names = registry.list_activities();
        names.sort();
        assert_eq!(names, vec!["a1".to_string(), "a2".to_string()]);
    }
}
