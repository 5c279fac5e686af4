//! Emergency teardown of outstanding captures.
//!
//! On crash or external interrupt there is no time for save/discard: every
//! capture whose finalize has not completed gets the strategy's forceful
//! `kill`, synchronously, on the calling thread. [`EmergencyKill`] is a
//! detached view over the controller's active set so a signal-handling
//! thread can do this while the controller itself is owned elsewhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::capture::handle::CaptureHandle;
use crate::capture::strategy::CaptureStrategy;

type HandleRef<S> = Arc<CaptureHandle<<S as CaptureStrategy>::Capture>>;

pub struct EmergencyKill<S: CaptureStrategy> {
    strategy: Arc<S>,
    active: Arc<Mutex<Vec<HandleRef<S>>>>,
    aborted: Arc<AtomicBool>,
}

// Manual impl: `S` itself need not be Clone
impl<S: CaptureStrategy> Clone for EmergencyKill<S> {
    fn clone(&self) -> Self {
        Self {
            strategy: Arc::clone(&self.strategy),
            active: Arc::clone(&self.active),
            aborted: Arc::clone(&self.aborted),
        }
    }
}

impl<S: CaptureStrategy> EmergencyKill<S> {
    pub(crate) fn new(
        strategy: Arc<S>,
        active: Arc<Mutex<Vec<HandleRef<S>>>>,
        aborted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            strategy,
            active,
            aborted,
        }
    }

    /// Force-kill every capture still awaiting finalize, exactly once per
    /// handle present at call time. Best-effort: a failed kill is logged and
    /// the remaining handles are still attempted. After this, no new
    /// save/discard work is ever scheduled.
    pub fn kill_all(&self) {
        self.aborted.store(true, Ordering::SeqCst);

        let handles: Vec<HandleRef<S>> = self.active.lock().unwrap().clone();
        if handles.is_empty() {
            return;
        }
        warn!(
            count = handles.len(),
            "emergency exit: force-killing outstanding captures"
        );

        for handle in handles {
            // A handle that finalized since the snapshot must not be killed
            if !handle.mark_killed() {
                continue;
            }
            if let Err(err) = self.strategy.kill(handle.capture()) {
                warn!(capture = handle.id(), error = %err, "failed to kill capture");
            }
        }
    }

    /// Whether emergency teardown has run
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Spawn a thread that waits for SIGINT/SIGTERM, kills all outstanding
    /// captures, then re-raises the default handler so the process still
    /// terminates with the conventional exit status.
    #[cfg(unix)]
    pub fn arm_signals(self) -> anyhow::Result<std::thread::JoinHandle<()>> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        Ok(std::thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                self.kill_all();
                let _ = signal_hook::low_level::emulate_default_handler(signal);
            }
        }))
    }
}
