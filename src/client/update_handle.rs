use super::options::WorkflowUpdateResultOptions;
use crate::engine::RawUpdateHandle;
use crate::error::Error;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed handle to an update whose result decodes to `Out`
pub struct WorkflowUpdateHandle<Out> {
    pub id: String,
    pub workflow_id: String,
    pub workflow_run_id: String,
    underlying: Option<Arc<dyn RawUpdateHandle>>,
    _marker: PhantomData<fn() -> Out>,
}

impl<Out> WorkflowUpdateHandle<Out> {
    pub(crate) fn from_raw(underlying: Arc<dyn RawUpdateHandle>) -> Self {
        Self {
            id: underlying.update_id().to_string(),
            workflow_id: underlying.workflow_id().to_string(),
            workflow_run_id: underlying.run_id().to_string(),
            underlying: Some(underlying),
            _marker: PhantomData,
        }
    }

    /// Rebuild a handle from identifiers alone
    ///
    /// Such a handle cannot fetch the result; `get_result` fails with
    /// [`Error::UpdateHandleNotFromStart`].
    pub fn from_ids(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_run_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            workflow_run_id: workflow_run_id.into(),
            underlying: None,
            _marker: PhantomData,
        }
    }
}

impl<Out: DeserializeOwned> WorkflowUpdateHandle<Out> {
    pub async fn get_result(&self, _options: WorkflowUpdateResultOptions) -> Result<Out, Error> {
        match &self.underlying {
            Some(underlying) => underlying.get().await?.decode(),
            None => Err(Error::UpdateHandleNotFromStart),
        }
    }
}

impl<Out> Clone for WorkflowUpdateHandle<Out> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            workflow_id: self.workflow_id.clone(),
            workflow_run_id: self.workflow_run_id.clone(),
            underlying: self.underlying.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Out> std::fmt::Debug for WorkflowUpdateHandle<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowUpdateHandle")
            .field("id", &self.id)
            .field("workflow_id", &self.workflow_id)
            .field("workflow_run_id", &self.workflow_run_id)
            .field("from_start", &self.underlying.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identifier_only_handle_cannot_fetch_result() {
        let handle = WorkflowUpdateHandle::<String>::from_ids("update-1", "wf-1", "run-1");
        let err = handle
            .get_result(WorkflowUpdateResultOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpdateHandleNotFromStart));
        assert_eq!(err.to_string(), "must have obtained handle from update start");
    }
}
