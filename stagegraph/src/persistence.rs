//! Storage contract for executions.
//!
//! Durable storage lives outside this crate. The graph algorithms never
//! touch a repository; only the failure chain follows child executions
//! through one.

use crate::errors::GraphError;
use crate::model::{Execution, ExecutionType};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Protocol for execution storage backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Saves an execution, replacing any previous version with the same id.
    async fn store(&self, execution: Execution) -> Result<(), GraphError>;

    /// Loads an execution by type and id.
    async fn retrieve(
        &self,
        execution_type: ExecutionType,
        id: &str,
    ) -> Result<Option<Execution>, GraphError>;

    /// Executions of an application, most recently built first.
    async fn retrieve_by_application(
        &self,
        execution_type: ExecutionType,
        application: &str,
    ) -> Result<Vec<Execution>, GraphError>;

    /// Executions started from a pipeline configuration, most recently built first.
    async fn retrieve_by_config_id(&self, config_id: &str) -> Result<Vec<Execution>, GraphError>;
}

/// In-memory execution repository.
#[derive(Debug, Default, Clone)]
pub struct InMemoryExecutionRepository {
    executions: Arc<Mutex<HashMap<(ExecutionType, String), Execution>>>,
}

impl InMemoryExecutionRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executions.lock().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executions.lock().is_empty()
    }

    fn matching<F>(&self, filter: F) -> Vec<Execution>
    where
        F: Fn(&Execution) -> bool,
    {
        let mut found: Vec<Execution> = self
            .executions
            .lock()
            .values()
            .filter(|e| filter(e))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.build_time.cmp(&a.build_time).then_with(|| b.id().cmp(a.id())));
        found
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn store(&self, execution: Execution) -> Result<(), GraphError> {
        tracing::debug!(
            execution_id = %execution.id(),
            application = %execution.application,
            "Storing execution"
        );
        self.executions.lock().insert(
            (execution.execution_type, execution.id().to_string()),
            execution,
        );
        Ok(())
    }

    async fn retrieve(
        &self,
        execution_type: ExecutionType,
        id: &str,
    ) -> Result<Option<Execution>, GraphError> {
        Ok(self
            .executions
            .lock()
            .get(&(execution_type, id.to_string()))
            .cloned())
    }

    async fn retrieve_by_application(
        &self,
        execution_type: ExecutionType,
        application: &str,
    ) -> Result<Vec<Execution>, GraphError> {
        Ok(self.matching(|e| e.execution_type == execution_type && e.application == application))
    }

    async fn retrieve_by_config_id(&self, config_id: &str) -> Result<Vec<Execution>, GraphError> {
        Ok(self.matching(|e| e.pipeline_config_id.as_deref() == Some(config_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn execution(id: &str, application: &str, minutes_ago: i64) -> Execution {
        let mut execution = Execution::new(ExecutionType::Pipeline, application).with_id(id);
        execution.build_time = Some(Utc::now() - Duration::minutes(minutes_ago));
        execution
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let repository = InMemoryExecutionRepository::new();
        repository.store(execution("e1", "orders", 0)).await.unwrap();

        let found = repository
            .retrieve(ExecutionType::Pipeline, "e1")
            .await
            .unwrap();
        assert_eq!(found.map(|e| e.id().to_string()), Some("e1".to_string()));

        let wrong_type = repository
            .retrieve(ExecutionType::Orchestration, "e1")
            .await
            .unwrap();
        assert!(wrong_type.is_none());
    }

    #[tokio::test]
    async fn test_store_replaces_existing() {
        let repository = InMemoryExecutionRepository::new();
        repository.store(execution("e1", "orders", 0)).await.unwrap();
        repository
            .store(execution("e1", "orders", 0).with_name("renamed"))
            .await
            .unwrap();

        assert_eq!(repository.len(), 1);
        let found = repository
            .retrieve(ExecutionType::Pipeline, "e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn test_queries_return_newest_first() {
        let repository = InMemoryExecutionRepository::new();
        repository
            .store(execution("old", "orders", 30).with_pipeline_config_id("cfg"))
            .await
            .unwrap();
        repository
            .store(execution("new", "orders", 1).with_pipeline_config_id("cfg"))
            .await
            .unwrap();
        repository.store(execution("other", "billing", 5)).await.unwrap();

        let by_app = repository
            .retrieve_by_application(ExecutionType::Pipeline, "orders")
            .await
            .unwrap();
        let ids: Vec<&str> = by_app.iter().map(Execution::id).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let by_config = repository.retrieve_by_config_id("cfg").await.unwrap();
        assert_eq!(by_config.len(), 2);
        assert!(repository
            .retrieve_by_config_id("missing")
            .await
            .unwrap()
            .is_empty());
    }
}
