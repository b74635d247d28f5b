use clbridge_core::{AttachState, ManagedRuntime, RuntimeError};

/// Scoped attachment of the current driver thread to the managed runtime.
///
/// Detaches on drop only if this guard did the attaching, on every exit path
/// including unwinding.
pub struct AttachGuard<'a> {
    runtime: &'a dyn ManagedRuntime,
    state: AttachState,
}

impl<'a> AttachGuard<'a> {
    pub fn acquire(runtime: &'a dyn ManagedRuntime) -> Result<Self, RuntimeError> {
        let state = runtime.attach_current_thread()?;
        Ok(Self { runtime, state })
    }

    pub fn state(&self) -> AttachState {
        self.state
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if self.state == AttachState::Attached {
            self.runtime.detach_current_thread();
        }
    }
}
