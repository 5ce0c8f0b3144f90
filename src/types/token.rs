/// A cancellation token used to stop the suite from starting new scenarios.
///
/// This is a type alias for [`tokio_util::sync::CancellationToken`]. Cancelling
/// it never interrupts a scenario that is already running, and scheduled
/// cleanups are still awaited before the suite returns.
pub type SuiteCancellationToken = tokio_util::sync::CancellationToken;

/// Create a new [`SuiteCancellationToken`].
///
/// # Example
///
/// ```
/// use s3ilm_rs::create_suite_cancellation_token;
///
/// let token = create_suite_cancellation_token();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
pub fn create_suite_cancellation_token() -> SuiteCancellationToken {
    tokio_util::sync::CancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_cancellation_token() {
        let token = create_suite_cancellation_token();
        let child = token.child_token();
        token.cancel();
        assert!(child.is_cancelled());
    }
}
