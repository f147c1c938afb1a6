//! Soft assertions batched into one verdict per step.

use crate::error::{EngineError, EngineResult};
use crate::model::{CheckpointRecord, Verdict};
use std::fmt::Display;
use tracing::{error, info};

/// Ordered record of the checkpoints evaluated during one step.
///
/// Soft asserts never fail on their own; [`CheckpointLedger::assert_final`]
/// turns the collected tags into the step verdict and clears the ledger.
#[derive(Debug, Default)]
pub struct CheckpointLedger {
    records: Vec<CheckpointRecord>,
}

impl CheckpointLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkpoints recorded since the last verdict.
    pub fn records(&self) -> &[CheckpointRecord] {
        &self.records
    }

    pub fn has_failures(&self) -> bool {
        self.records.iter().any(|r| r.verdict == Verdict::Fail)
    }

    /// PASS when `result` is `Some(true)`; FAIL for `Some(false)` and for
    /// a missing result.
    pub fn soft_assert_true(
        &mut self,
        result: Option<bool>,
        message: &str,
        checkpoint: &str,
    ) {
        self.push(result == Some(true), message, checkpoint, None);
    }

    /// PASS only when `result` is `Some(false)`.
    pub fn soft_assert_false(
        &mut self,
        result: Option<bool>,
        message: &str,
        checkpoint: &str,
    ) {
        self.push(result == Some(false), message, checkpoint, None);
    }

    /// Like [`CheckpointLedger::soft_assert_true`] for checks that can
    /// fail to evaluate. An evaluation error is logged and recorded as
    /// FAIL with the error text as detail.
    pub fn soft_assert_outcome<E: Display>(
        &mut self,
        outcome: Result<bool, E>,
        message: &str,
        checkpoint: &str,
    ) {
        match outcome {
            Ok(result) => self.push(result, message, checkpoint, None),
            Err(e) => {
                error!(checkpoint = checkpoint, "exception during verification: {}", e);
                self.push(false, message, checkpoint, Some(e.to_string()));
            }
        }
    }

    /// Attach diagnostic detail to the most recent checkpoint.
    pub fn annotate_last(&mut self, detail: impl Into<String>) {
        if let Some(last) = self.records.last_mut() {
            let detail = detail.into();
            last.detail = Some(match last.detail.take() {
                Some(existing) => format!("{existing}\n{detail}"),
                None => detail,
            });
        }
    }

    /// Hard assertion: fails the step immediately unless `result` holds.
    pub fn assert_true(&self, result: bool, message: &str) -> EngineResult<()> {
        if result {
            info!("verification passed: {}", message);
            Ok(())
        } else {
            error!("verification failed: {}", message);
            Err(EngineError::AssertionFailed(message.to_string()))
        }
    }

    /// Hard assertion: fails the step immediately unless `result` is false.
    pub fn assert_false(&self, result: bool, message: &str) -> EngineResult<()> {
        self.assert_true(!result, message)
    }

    /// Final verdict of the step. Fails when any checkpoint failed; the
    /// ledger is emptied either way.
    pub fn assert_final(&mut self, message: &str) -> EngineResult<()> {
        let failed: Vec<String> = self
            .records
            .drain(..)
            .filter(|r| r.verdict == Verdict::Fail)
            .map(|r| r.name)
            .collect();

        if failed.is_empty() {
            info!("test passed: {}", message);
            Ok(())
        } else {
            error!("test failed: {}", message);
            Err(EngineError::StepFailed {
                group: message.to_string(),
                failed,
            })
        }
    }

    fn push(
        &mut self,
        passed: bool,
        message: &str,
        checkpoint: &str,
        detail: Option<String>,
    ) {
        let verdict = if passed { Verdict::Pass } else { Verdict::Fail };
        match verdict {
            Verdict::Pass => info!(checkpoint = checkpoint, "verification passed: {}", message),
            Verdict::Fail => error!(checkpoint = checkpoint, "verification failed: {}", message),
        }
        self.records.push(CheckpointRecord {
            name: checkpoint.to_string(),
            message: message.to_string(),
            verdict,
            detail,
        });
    }
}
