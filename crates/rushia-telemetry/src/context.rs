//! Process-wide span carrying command and trace identifiers.

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Guard that keeps the command-level span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the command-level tracing span for the lifetime of the guard.
    #[must_use]
    pub fn new(command: impl Into<String>, trace_id: impl Into<String>) -> Self {
        let command = command.into();
        let trace_id = trace_id.into();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "rushia",
            command = %command,
            trace_id = %trace_id,
            build_sha = %build_sha()
        )));
        let guard = span.enter();
        Self { _guard: guard }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_context_guard_enters_and_exits() {
        let guard = GlobalContextGuard::new("history", "trace-1");
        tracing::info!("inside command span");
        drop(guard);
    }
}
