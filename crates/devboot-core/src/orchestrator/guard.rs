/// Runs its action exactly once: on the first [`fire`](ExitGuard::fire), or on
/// drop if it was never fired. Dropping covers normal return, `?` propagation
/// and unwinding alike.
pub struct ExitGuard {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl ExitGuard {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// Run the action now. Returns false if it already ran.
    pub fn fire(&mut self) -> bool {
        match self.action.take() {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.action.is_none()
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.fire();
    }
}
