//! Command implementations

pub mod apply;
pub mod check;
pub mod level;
pub mod run;
pub mod taint;
pub mod version;

use crate::domain::ApplyOutcome;
use crate::output::OutputContext;

/// Print the result of an apply cycle.
pub(crate) fn report_outcome(ctx: &OutputContext, outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::NotStarted => ctx.warn("Update not started: another update is in progress"),
        ApplyOutcome::UpToDate { level } => ctx.success(&format!("Up to date at UL{level}")),
        ApplyOutcome::Committed { level } => ctx.success(&format!("Now running UL{level}")),
        ApplyOutcome::PermanentFailure { level } => {
            ctx.error(&format!("Update failed permanently, left at UL{level}"));
        }
    }
}
