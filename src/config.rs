//! Configuration for clients and workers

use std::env;

/// Environment variable holding the default namespace
pub const NAMESPACE_ENV: &str = "TYPEFLOW_NAMESPACE";

/// Environment variable holding the default client identity
pub const IDENTITY_ENV: &str = "TYPEFLOW_IDENTITY";

pub const DEFAULT_NAMESPACE: &str = "default";

/// Configuration for connecting a [`Client`](crate::client::Client).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Namespace every request is scoped to
    pub namespace: String,

    /// Identity recorded on signals, cancellations and terminations
    pub identity: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            identity: default_identity(),
        }
    }
}

impl ClientOptions {
    /// Read options from `TYPEFLOW_NAMESPACE` and `TYPEFLOW_IDENTITY`,
    /// falling back to the defaults for unset or empty variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(namespace) = non_empty_var(NAMESPACE_ENV) {
            options.namespace = namespace;
        }
        if let Some(identity) = non_empty_var(IDENTITY_ENV) {
            options.identity = identity;
        }
        options
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }
}

/// Configuration for a [`Worker`](crate::worker::Worker).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Task queue the worker serves
    pub task_queue: String,

    /// Overrides the client identity for this worker
    pub identity: Option<String>,
}

impl WorkerOptions {
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            identity: None,
        }
    }

    /// Set a worker-specific identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn default_identity() -> String {
    format!("{}@typeflow", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_defaults() {
        let options = ClientOptions::default()
            .with_namespace("orders")
            .with_identity("tester");
        assert_eq!(options.namespace, "orders");
        assert_eq!(options.identity, "tester");

        let worker = WorkerOptions::new("queue").with_identity("worker-1");
        assert_eq!(worker.task_queue, "queue");
        assert_eq!(worker.identity.as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_from_env_reads_and_ignores_empty_values() {
        env::set_var(NAMESPACE_ENV, "payments");
        env::set_var(IDENTITY_ENV, "billing-service");
        let options = ClientOptions::from_env();
        assert_eq!(options.namespace, "payments");
        assert_eq!(options.identity, "billing-service");

        env::set_var(NAMESPACE_ENV, "");
        env::remove_var(IDENTITY_ENV);
        let options = ClientOptions::from_env();
        assert_eq!(options.namespace, DEFAULT_NAMESPACE);
        assert_eq!(options.identity, default_identity());

        env::remove_var(NAMESPACE_ENV);
    }

    #[test]
    fn test_default_namespace() {
        assert_eq!(ClientOptions::default().namespace, DEFAULT_NAMESPACE);
    }
}
