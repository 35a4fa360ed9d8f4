use crate::engine::types::{WorkflowExecution, WorkflowExecutionStatus};
use crate::error::{EngineError, Error};

/// One `Key = 'value'` clause of a list query
#[derive(Clone, Debug, PartialEq, Eq)]
enum Clause {
    WorkflowId(String),
    WorkflowType(String),
    TaskQueue(String),
    Status(WorkflowExecutionStatus),
}

/// Conjunction of clauses parsed from a list query; empty matches everything
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ListFilter {
    clauses: Vec<Clause>,
}

impl ListFilter {
    /// Parse `Key = 'value' AND Key = 'value'`
    ///
    /// Supported keys are `WorkflowId`, `WorkflowType`, `TaskQueue` and
    /// `ExecutionStatus`.
    pub(crate) fn parse(query: &str) -> Result<Self, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Self::default());
        }
        let clauses = split_and(query)
            .into_iter()
            .map(parse_clause)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }

    pub(crate) fn matches(&self, execution: &WorkflowExecution) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::WorkflowId(id) => &execution.workflow_id == id,
            Clause::WorkflowType(ty) => &execution.workflow_type == ty,
            Clause::TaskQueue(queue) => &execution.task_queue == queue,
            Clause::Status(status) => execution.status == *status,
        })
    }
}

fn invalid(message: String) -> Error {
    EngineError::InvalidArgument(message).into()
}

fn split_and(query: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = query;
    while let Some(pos) = find_keyword(rest, " AND ") {
        parts.push(rest[..pos].trim());
        rest = &rest[pos + " AND ".len()..];
    }
    parts.push(rest.trim());
    parts
}

/// Position of a keyword outside quoted values, case-insensitive
fn find_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    let upper = haystack.to_ascii_uppercase();
    let mut quote: Option<char> = None;
    for (pos, ch) in haystack.char_indices() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if upper[pos..].starts_with(keyword) => return Some(pos),
            None => {}
        }
    }
    None
}

fn parse_clause(clause: &str) -> Result<Clause, Error> {
    let (key, value) = clause
        .split_once('=')
        .ok_or_else(|| invalid(format!("expected Key = 'value', got '{}'", clause)))?;
    let value = value.trim();
    let value = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .ok_or_else(|| invalid(format!("value must be quoted in '{}'", clause)))?
        .to_string();

    match key.trim() {
        "WorkflowId" => Ok(Clause::WorkflowId(value)),
        "WorkflowType" => Ok(Clause::WorkflowType(value)),
        "TaskQueue" => Ok(Clause::TaskQueue(value)),
        "ExecutionStatus" => value.parse().map(Clause::Status).map_err(invalid),
        other => Err(invalid(format!("unsupported search attribute '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn execution(workflow_type: &str, status: WorkflowExecutionStatus) -> WorkflowExecution {
        WorkflowExecution {
            workflow_id: "wf-1".into(),
            run_id: "run-1".into(),
            workflow_type: workflow_type.into(),
            task_queue: "queue".into(),
            status,
            start_time: SystemTime::now(),
            close_time: None,
            history_length: 1,
        }
    }

    #[test]
    fn test_empty_query_matches_all() {
        let filter = ListFilter::parse("  ").unwrap();
        assert!(filter.matches(&execution("Any", WorkflowExecutionStatus::Failed)));
    }

    #[test]
    fn test_conjunction() {
        let filter =
            ListFilter::parse("WorkflowType = 'Greet' and ExecutionStatus='Running'").unwrap();
        assert!(filter.matches(&execution("Greet", WorkflowExecutionStatus::Running)));
        assert!(!filter.matches(&execution("Greet", WorkflowExecutionStatus::Completed)));
        assert!(!filter.matches(&execution("Other", WorkflowExecutionStatus::Running)));
    }

    #[test]
    fn test_keyword_inside_quotes_is_not_split() {
        let filter = ListFilter::parse("WorkflowType = 'Fish AND Chips'").unwrap();
        assert!(filter.matches(&execution("Fish AND Chips", WorkflowExecutionStatus::Running)));
    }

    #[test]
    fn test_keyword_inside_double_quotes_is_not_split() {
        let filter =
            ListFilter::parse("WorkflowId = \"a AND b\" AND WorkflowType = \"It's\"").unwrap();
        let mut matching = execution("It's", WorkflowExecutionStatus::Running);
        matching.workflow_id = "a AND b".into();
        assert!(filter.matches(&matching));
        assert!(!filter.matches(&execution("It's", WorkflowExecutionStatus::Running)));
    }

    #[test]
    fn test_rejects_unknown_attribute() {
        let err = ListFilter::parse("CustomKeyword = 'x'").unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::InvalidArgument(_))));
    }
}
