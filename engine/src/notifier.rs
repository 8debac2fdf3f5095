//! User-facing warning sink.

/// Fire-and-forget "show a warning with this text".
///
/// Implementations must not block; the engine calls this from completion
/// futures and from the invocation builder.
pub trait Notifier: Send + Sync {
    fn warn(&self, message: &str);
}

/// Notifier that only logs. Used by the CLI, where warnings end up on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn warn(&self, message: &str) {
        tracing::warn!(target: "packlint::notify", "{message}");
    }
}
