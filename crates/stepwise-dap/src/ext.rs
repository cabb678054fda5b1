//! Helpers for best-effort operations whose failure is logged, not propagated.

pub trait DebugResult<T> {
    /// Convert to Option, logging the error at debug level.
    fn debug_ok(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> DebugResult<T> for Result<T, E> {
    fn debug_ok(self, context: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("{}: {}", context, e);
                None
            }
        }
    }
}
