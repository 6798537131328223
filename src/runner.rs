//! Sequential step execution with reverse-order cleanup.
//!
//! [`StepRunner`] drives an ordered chain of [`Step`]s. Every step whose
//! `run` starts is pushed onto a run record; once forward progress stops
//! (completion, halt, or cancellation) the record is popped and each step's
//! `cleanup` runs, newest first. Cleanups cannot fail the build: steps report
//! their own cleanup problems through the UI.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::Instrument;

use crate::cancel::CancelSignal;
use crate::error::BuildError;
use crate::state::BuildState;
use crate::ui::Ui;

/// Future returned by step operations.
pub type StepFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a step's `run`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop forward progress and unwind.
    Halt,
}

/// Collaborators shared by all steps of a run.
#[derive(Clone)]
pub struct StepContext {
    ui: Arc<dyn Ui>,
    cancel: CancelSignal,
}

impl StepContext {
    /// Creates a context from a UI sink and a cancellation signal.
    #[must_use]
    pub fn new(ui: Arc<dyn Ui>, cancel: CancelSignal) -> Self {
        Self { ui, cancel }
    }

    /// UI sink for progress and failures.
    #[must_use]
    pub fn ui(&self) -> &dyn Ui {
        self.ui.as_ref()
    }

    /// Cancellation signal for the run.
    #[must_use]
    pub const fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }
}

/// One stage of the build with a forward action and a matching undo action.
pub trait Step: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Performs the step.
    ///
    /// A step returning [`StepAction::Halt`] must first record the cause with
    /// [`BuildState::halt`].
    fn run<'a>(
        &'a mut self,
        state: &'a mut BuildState,
        ctx: &'a StepContext,
    ) -> StepFuture<'a, StepAction>;

    /// Undoes whatever `run` created. Best-effort; defaults to nothing.
    fn cleanup<'a>(&'a mut self, _state: &'a BuildState, _ctx: &'a StepContext) -> StepFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// Executes steps in order and unwinds the started ones in reverse.
pub struct StepRunner {
    steps: Vec<Box<dyn Step>>,
}

impl StepRunner {
    /// Creates a runner over `steps`, executed in the given order.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    /// Names of the configured steps, in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Runs the chain against `state`.
    ///
    /// Forward execution stops at the first step that halts or leaves an
    /// error in `state`, or when cancellation is observed between steps (which
    /// records [`BuildError::Cancelled`]). Afterwards every started step is
    /// cleaned up in reverse order. Callers inspect [`BuildState::error`] to
    /// learn the outcome.
    pub async fn run(&mut self, state: &mut BuildState, ctx: &StepContext) {
        let mut record: Vec<usize> = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter_mut().enumerate() {
            if ctx.cancel().is_cancelled() {
                tracing::info!(step = step.name(), "cancelled before step started");
                state.halt(BuildError::Cancelled);
                break;
            }

            record.push(index);
            let span = tracing::info_span!("step", name = step.name());
            let action = step.run(state, ctx).instrument(span).await;

            if action == StepAction::Halt || state.has_error() {
                tracing::debug!(step = step.name(), "step halted the chain");
                break;
            }
        }

        while let Some(index) = record.pop() {
            let Some(step) = self.steps.get_mut(index) else {
                continue;
            };
            let span = tracing::info_span!("cleanup", name = step.name());
            step.cleanup(state, ctx).instrument(span).await;
        }
    }
}
