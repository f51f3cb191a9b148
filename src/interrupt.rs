//! Interrupt masking for rollback windows.
//!
//! Filesystem rollback (restoring a stashed keg, deleting a partial
//! install, unlinking after a failed link) must complete atomically from
//! the user's perspective. [`InterruptGuard`] blocks SIGINT and SIGTERM
//! for its scope and restores the previous signal mask on drop; a pending
//! interrupt is delivered after the rollback finishes.

#[cfg(unix)]
use nix::sys::signal::{self, SigSet, SigmaskHow, Signal};

pub struct InterruptGuard {
    #[cfg(unix)]
    previous: Option<SigSet>,
}

impl InterruptGuard {
    pub fn new() -> Self {
        #[cfg(unix)]
        {
            let mut mask = SigSet::empty();
            mask.add(Signal::SIGINT);
            mask.add(Signal::SIGTERM);

            let mut previous = SigSet::empty();
            let previous =
                match signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&mask), Some(&mut previous)) {
                    Ok(()) => Some(previous),
                    Err(err) => {
                        tracing::warn!("failed to mask signals for rollback: {err}");
                        None
                    }
                };

            InterruptGuard { previous }
        }
        #[cfg(not(unix))]
        {
            InterruptGuard {}
        }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(previous) = self.previous.take() {
            if let Err(err) = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&previous), None) {
                tracing::warn!("failed to restore signal mask: {err}");
            }
        }
    }
}

/// Run `f` with interrupts masked.
pub fn uninterruptible<T>(f: impl FnOnce() -> T) -> T {
    let _guard = InterruptGuard::new();
    f()
}
