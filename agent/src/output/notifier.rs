//! `TerminalNotifier`: presentation-layer implementation of `NotificationSink`.
//!
//! Every notification is printed for the operator and mirrored as a tracing
//! event, so the log file carries the same trail as the terminal.

use tracing::{error, info, warn};

use crate::application::ports::NotificationSink;
use crate::domain::Severity;
use crate::output::OutputContext;

/// Prints update notifications through an `OutputContext`.
///
/// - `Info` prints `"  ℹ {message}"` (suppressed when quiet)
/// - `Warn` prints `"  ⚠ {message}"` (suppressed when quiet)
/// - `Error` prints `"  ✗ {message}"` to stderr
#[derive(Clone, Copy)]
pub struct TerminalNotifier {
    ctx: OutputContext,
}

impl TerminalNotifier {
    #[must_use]
    pub fn new(ctx: OutputContext) -> Self {
        Self { ctx }
    }
}

impl NotificationSink for TerminalNotifier {
    fn publish(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => {
                info!(target: "update_agent::notify", "{message}");
                self.ctx.info(message);
            }
            Severity::Warn => {
                warn!(target: "update_agent::notify", "{message}");
                self.ctx.warn(message);
            }
            Severity::Error => {
                error!(target: "update_agent::notify", "{message}");
                self.ctx.error(message);
            }
        }
    }
}
