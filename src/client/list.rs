use super::options::WorkflowListOptions;
use super::Client;
use crate::engine::types::{ListRequest, ListResponse, WorkflowExecution};
use crate::error::Error;
use futures::stream::{self, Stream};

/// Lazily paginated iterator over execution summaries
///
/// Forward-only. Once a page fetch fails the error is sticky: `has_next`
/// keeps returning `true` and `next` keeps returning the error.
pub struct WorkflowExecutionIterator {
    client: Client,
    request: ListRequest,
    last_response: Option<ListResponse>,
    current_index: usize,
    last_error: Option<Error>,
}

/// Iterate executions matching `options.query`
pub fn list_workflows(client: &Client, options: WorkflowListOptions) -> WorkflowExecutionIterator {
    WorkflowExecutionIterator {
        client: client.clone(),
        request: ListRequest {
            query: options.query,
            page_size: options.page_size,
            next_page_token: Vec::new(),
        },
        last_response: None,
        current_index: 0,
        last_error: None,
    }
}

impl WorkflowExecutionIterator {
    fn buffered(&self) -> usize {
        self.last_response
            .as_ref()
            .map_or(0, |response| response.executions.len())
    }

    /// Whether `next` has something to return, fetching pages as needed
    ///
    /// Empty pages with a continuation token are skipped.
    pub async fn has_next(&mut self) -> bool {
        loop {
            if self.last_error.is_some() || self.current_index < self.buffered() {
                return true;
            }
            if let Some(response) = &self.last_response {
                if response.next_page_token.is_empty() {
                    return false;
                }
                self.request.next_page_token = response.next_page_token.clone();
            }
            self.current_index = 0;
            match self.client.engine().list_workflow(self.request.clone()).await {
                Ok(response) => self.last_response = Some(response),
                Err(e) => self.last_error = Some(e),
            }
        }
    }

    /// The next summary, or the stored error
    ///
    /// # Panics
    ///
    /// Panics if `has_next` would return `false`.
    pub async fn next(&mut self) -> Result<WorkflowExecution, Error> {
        assert!(self.has_next().await, "next called with no executions left");
        if let Some(e) = &self.last_error {
            return Err(e.clone());
        }
        let execution = self
            .last_response
            .as_ref()
            .and_then(|response| response.executions.get(self.current_index))
            .cloned();
        match execution {
            Some(execution) => {
                self.current_index += 1;
                Ok(execution)
            }
            None => unreachable!("has_next reported an execution that is not buffered"),
        }
    }

    /// Adapt into a stream that ends after the last item or the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<WorkflowExecution, Error>> {
        stream::unfold(Some(self), |state| async move {
            let Some(mut iter) = state else {
                return None;
            };
            if !iter.has_next().await {
                return None;
            }
            let item = iter.next().await;
            let state = if item.is_ok() { Some(iter) } else { None };
            Some((item, state))
        })
    }
}

impl std::fmt::Debug for WorkflowExecutionIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutionIterator")
            .field("query", &self.request.query)
            .field("current_index", &self.current_index)
            .field("failed", &self.last_error.is_some())
            .finish()
    }
}
