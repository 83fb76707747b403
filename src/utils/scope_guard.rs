use tracing::debug;

/// Runs a teardown closure when dropped, on every exit path of the enclosing
/// scope (early return, `?`, panic unwinding, task abort).
pub struct ScopeGuard<F: FnOnce()> {
    label: &'static str,
    teardown: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(label: &'static str, teardown: F) -> Self {
        Self {
            label,
            teardown: Some(teardown),
        }
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            debug!("Running teardown: {}", self.label);
            teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_runs_on_drop() {
        let ran = Cell::new(0);
        {
            let _guard = ScopeGuard::new("count", || ran.set(ran.get() + 1));
        }
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn test_runs_on_early_return() {
        let ran = Cell::new(false);
        let early = |stop: bool| -> Option<()> {
            let _guard = ScopeGuard::new("flag", || ran.set(true));
            if stop {
                return None;
            }
            Some(())
        };
        assert!(early(true).is_none());
        assert!(ran.get());
    }
}
