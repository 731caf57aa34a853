// ============================================================================
// Mock Pipelines for Testing
// ============================================================================

use super::{ConnectorPipeline, TaskEnv};
use crate::application::limiter::ConcurrencyGate;
use crate::domain::{ConnectorLanguage, ContextState, WorkUnit};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How a mock pipeline ends for a given unit
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Leave the unit Successful
    Succeed,
    /// Leave the unit in Failure
    Fail,
    /// Leave the unit in Error
    Error,
    /// Return Ok without reaching a terminal state
    LeavePending,
    /// Return an unrecoverable error
    ReturnErr(String),
    /// Panic with message
    Panic(String),
}

/// Pipeline that sleeps while holding its gate and records what it saw.
///
/// Tracks how many units are inside the gated section, overall and per
/// language, and the peak of both.
pub struct RecordingPipeline {
    default_delay: Duration,
    delays: HashMap<String, Duration>,
    outcomes: HashMap<String, MockOutcome>,

    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    by_language: Mutex<HashMap<ConnectorLanguage, (usize, usize)>>,

    labels: Mutex<Vec<String>>,
    args_seen: Mutex<Vec<usize>>,
    finish_order: Mutex<Vec<String>>,
}

impl Default for RecordingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPipeline {
    pub fn new() -> Self {
        Self {
            default_delay: Duration::from_millis(5),
            delays: HashMap::new(),
            outcomes: HashMap::new(),
            runs: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            by_language: Mutex::new(HashMap::new()),
            labels: Mutex::new(Vec::new()),
            args_seen: Mutex::new(Vec::new()),
            finish_order: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_delay(mut self, label: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(label.into(), delay);
        self
    }

    pub fn with_outcome(mut self, label: impl Into<String>, outcome: MockOutcome) -> Self {
        self.outcomes.insert(label.into(), outcome);
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Units currently inside the gated section
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Peak of simultaneously gated units
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Peak of simultaneously gated units of one language
    pub fn max_active_for(&self, language: ConnectorLanguage) -> usize {
        self.by_language
            .lock()
            .unwrap()
            .get(&language)
            .map(|(_, max)| *max)
            .unwrap_or(0)
    }

    /// Pipeline labels, in start order
    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }

    /// Number of extra args each invocation received
    pub fn args_seen(&self) -> Vec<usize> {
        self.args_seen.lock().unwrap().clone()
    }

    /// Unit labels, in completion order
    pub fn finish_order(&self) -> Vec<String> {
        self.finish_order.lock().unwrap().clone()
    }

    fn enter(&self, language: ConnectorLanguage) -> ActiveGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let mut by_language = self.by_language.lock().unwrap();
        let entry = by_language.entry(language).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = entry.1.max(entry.0);

        ActiveGuard {
            pipeline: self,
            language,
        }
    }
}

/// Leaves the gated section on drop, so cancelled units are counted out too
struct ActiveGuard<'a> {
    pipeline: &'a RecordingPipeline,
    language: ConnectorLanguage,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.pipeline.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(entry) = self
            .pipeline
            .by_language
            .lock()
            .unwrap()
            .get_mut(&self.language)
        {
            entry.0 -= 1;
        }
    }
}

#[async_trait]
impl<W: WorkUnit> ConnectorPipeline<W> for RecordingPipeline {
    type Args = Vec<String>;

    async fn run(
        &self,
        unit: &mut W,
        gate: ConcurrencyGate,
        env: &TaskEnv,
        args: &Self::Args,
    ) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.labels.lock().unwrap().push(env.pipeline_label.clone());
        self.args_seen.lock().unwrap().push(args.len());

        let label = unit.label().to_string();
        let delay = self.delays.get(&label).copied().unwrap_or(self.default_delay);
        let outcome = self
            .outcomes
            .get(&label)
            .cloned()
            .unwrap_or(MockOutcome::Succeed);

        unit.set_state(ContextState::Running);
        {
            let _permit = gate.acquire().await?;
            let _active = self.enter(unit.class_key());

            match &outcome {
                MockOutcome::ReturnErr(msg) => return Err(AppError::Internal(msg.clone())),
                MockOutcome::Panic(msg) => panic!("{}", msg),
                _ => tokio::time::sleep(delay).await,
            }
        }

        match outcome {
            MockOutcome::Succeed => unit.set_state(ContextState::Successful),
            MockOutcome::Fail => unit.set_state(ContextState::Failure),
            MockOutcome::Error => unit.set_state(ContextState::Error),
            MockOutcome::LeavePending => unit.set_state(ContextState::Pending),
            MockOutcome::ReturnErr(_) | MockOutcome::Panic(_) => {}
        }
        self.finish_order.lock().unwrap().push(label);
        Ok(())
    }
}
