//! # Saga
//!
//! Multi-step writes against a store without transactions.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Started ──commit──► StepCommitted(step) ──commit──► StepCommitted ... │
//! │      │                       │                              │           │
//! │      │ fail                  │ fail                         │ complete  │
//! │      ▼                       ▼                              ▼           │
//! │  CompensatedFailure    PartialFailure                   Completed       │
//! │  (nothing written)     or CompensatedFailure                            │
//! │                        (if the undo write succeeded)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure before the first commit hands back the original error. A failure
//! after it becomes [`EngineError::PartialFailure`] with every id written so far.
//! There are no automatic retries.
//!
//! ## Detached write phase
//! Workflows do their reads and validation in the caller's future, then hand
//! the write phase to [`detached`]. Once spawned it runs to the end even if
//! the caller stops polling.

use serde::Serialize;
use std::future::Future;
use tracing::{debug, error, warn};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SagaState {
    Started,
    StepCommitted(&'static str),
    Completed,
    /// Failed, and nothing the workflow wrote is still in effect.
    CompensatedFailure,
    /// Failed with committed writes left for manual reconciliation.
    PartialFailure,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::CompensatedFailure | SagaState::PartialFailure
        )
    }
}

/// Progress of one workflow run.
#[derive(Debug)]
pub struct Saga {
    workflow: &'static str,
    state: SagaState,
    steps: Vec<&'static str>,
    written: Vec<String>,
}

impl Saga {
    pub fn start(workflow: &'static str) -> Self {
        debug!(workflow, "Saga started");
        Saga {
            workflow,
            state: SagaState::Started,
            steps: Vec::new(),
            written: Vec::new(),
        }
    }

    pub fn workflow(&self) -> &'static str {
        self.workflow
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Steps committed so far, in order.
    pub fn steps(&self) -> &[&'static str] {
        &self.steps
    }

    /// Ids of every record written so far.
    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub fn has_committed(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Records a successful write.
    pub fn commit(&mut self, step: &'static str, ids: impl IntoIterator<Item = String>) {
        let before = self.written.len();
        self.written.extend(ids);
        debug!(
            workflow = self.workflow,
            step,
            written = self.written.len() - before,
            "Saga step committed"
        );
        self.steps.push(step);
        self.state = SagaState::StepCommitted(step);
    }

    pub fn complete(&mut self) {
        debug!(workflow = self.workflow, steps = ?self.steps, "Saga completed");
        self.state = SagaState::Completed;
    }

    /// A step failed and nothing was undone.
    ///
    /// Returns `source` unchanged if nothing had been committed, otherwise a
    /// partial failure carrying `message`.
    pub fn fail(&mut self, source: EngineError, message: impl Into<String>) -> EngineError {
        if !self.has_committed() {
            warn!(workflow = self.workflow, error = %source, "Workflow failed before any write");
            self.state = SagaState::CompensatedFailure;
            return source;
        }
        self.state = SagaState::PartialFailure;
        self.partial(source, message.into())
    }

    /// A step failed and its compensating write succeeded.
    ///
    /// Still reported as a partial failure: the compensated records stay in
    /// the store and the operator must check what the failed step touched.
    pub fn compensated(&mut self, source: EngineError, message: impl Into<String>) -> EngineError {
        self.state = SagaState::CompensatedFailure;
        self.partial(source, message.into())
    }

    fn partial(&self, source: EngineError, message: String) -> EngineError {
        error!(
            workflow = self.workflow,
            steps = ?self.steps,
            entity_ids = ?self.written,
            error = %source,
            "Workflow partially failed: {}",
            message
        );
        EngineError::PartialFailure {
            workflow: self.workflow,
            message,
            entity_ids: self.written.clone(),
            source: Box::new(source),
        }
    }
}

/// Runs a write phase on its own task and waits for it.
pub async fn detached<F, T>(workflow: &'static str, phase: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(phase).await {
        Ok(result) => result,
        Err(e) => {
            error!(workflow, error = %e, "Write task did not finish");
            Err(EngineError::Internal(format!("{} write task failed: {}", workflow, e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tally_db::DbError;

    fn backend() -> EngineError {
        EngineError::Backend(DbError::QueryFailed("connection reset".to_string()))
    }

    #[test]
    fn test_failure_before_first_write_is_clean() {
        let mut saga = Saga::start("receive_goods");
        let err = saga.fail(backend(), "unused");
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(saga.state(), SagaState::CompensatedFailure);
    }

    #[test]
    fn test_failure_after_write_is_partial() {
        let mut saga = Saga::start("receive_goods");
        saga.commit("goods_receipt", ["g1".to_string()]);
        assert_eq!(saga.state(), SagaState::StepCommitted("goods_receipt"));

        let err = saga.fail(backend(), "reconcile stock by hand");
        assert_eq!(saga.state(), SagaState::PartialFailure);
        match err {
            EngineError::PartialFailure {
                workflow,
                entity_ids,
                message,
                ..
            } => {
                assert_eq!(workflow, "receive_goods");
                assert_eq!(entity_ids, vec!["g1".to_string()]);
                assert_eq!(message, "reconcile stock by hand");
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
    }

    #[test]
    fn test_compensated_is_still_reported() {
        let mut saga = Saga::start("record_sale");
        saga.commit("transaction", ["t1".to_string()]);
        let err = saga.compensated(backend(), "sale voided");
        assert!(err.is_partial_failure());
        assert_eq!(saga.state(), SagaState::CompensatedFailure);
        assert!(saga.state().is_terminal());
    }

    #[test]
    fn test_complete() {
        let mut saga = Saga::start("adjust_stock");
        saga.commit("audit_log", ["l1".to_string()]);
        saga.commit("delete_lots", Vec::new());
        saga.complete();
        assert_eq!(saga.steps(), &["audit_log", "delete_lots"]);
        assert_eq!(saga.written(), &["l1".to_string()]);
        assert_eq!(saga.state(), SagaState::Completed);
    }

    #[tokio::test]
    async fn test_detached_survives_dropped_caller() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let caller = detached("probe", async move {
            tokio::task::yield_now().await;
            let _ = tx.send(42);
            Ok::<_, EngineError>(())
        });
        // Poll once so the task is spawned, then drop the caller.
        tokio::select! {
            biased;
            _ = caller => {}
            _ = std::future::ready(()) => {}
        }
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_detached_panic_is_internal() {
        let result = detached("probe", async {
            if "boom".len() == 4 {
                panic!("boom");
            }
            Ok::<(), EngineError>(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Internal);
    }
}
