//! Operator interrupt (Ctrl-C) handling for the deploy pipeline.
//!
//! SIGINT is only caught while a [`SigintGuard`] is alive. The handler does
//! nothing but set a flag; the pipeline polls it between stages and when a
//! command fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static SIGNALLED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Where interrupt requests come from.
#[derive(Debug, Clone)]
pub enum InterruptFlag {
    /// SIGINT delivered to this process.
    Process,
    /// Set programmatically (embedding, tests).
    Manual(Arc<AtomicBool>),
}

impl InterruptFlag {
    pub fn manual() -> Self {
        InterruptFlag::Manual(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        match self {
            InterruptFlag::Process => SIGNALLED.load(Ordering::SeqCst),
            InterruptFlag::Manual(flag) => flag.load(Ordering::SeqCst),
        }
    }

    pub fn trigger(&self) {
        match self {
            InterruptFlag::Process => SIGNALLED.store(true, Ordering::SeqCst),
            InterruptFlag::Manual(flag) => flag.store(true, Ordering::SeqCst),
        }
    }

    /// Catch SIGINT for as long as the returned guard lives. Manual flags
    /// never touch process signal state.
    pub fn guard(&self) -> Option<SigintGuard> {
        match self {
            InterruptFlag::Process => Some(SigintGuard::install()),
            InterruptFlag::Manual(_) => None,
        }
    }
}

/// Restores the previous SIGINT disposition on drop.
pub struct SigintGuard {
    #[cfg(unix)]
    previous: libc::sighandler_t,
}

impl SigintGuard {
    #[cfg(unix)]
    fn install() -> Self {
        SIGNALLED.store(false, Ordering::SeqCst);
        let handler = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
        let previous = unsafe { libc::signal(libc::SIGINT, handler) };
        Self { previous }
    }

    #[cfg(not(unix))]
    fn install() -> Self {
        SIGNALLED.store(false, Ordering::SeqCst);
        Self {}
    }
}

impl Drop for SigintGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if self.previous != libc::SIG_ERR {
                // SAFETY: restoring the disposition returned by signal(2).
                unsafe {
                    libc::signal(libc::SIGINT, self.previous);
                }
            }
        }
    }
}
