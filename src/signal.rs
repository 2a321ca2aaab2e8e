//! Ctrl-C handling
//!
//! The first SIGINT cancels the run: nothing new is started and in-flight
//! adapter calls are allowed to finish. The handler then restores the
//! default disposition, so a second Ctrl-C terminates immediately.

use declarative::CancelToken;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
    // SAFETY: signal() is async-signal-safe
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

#[cfg(unix)]
fn install() {
    let handler = on_interrupt as extern "C" fn(libc::c_int);
    // SAFETY: the handler only touches an atomic and calls signal()
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        log::warn!("Could not install Ctrl-C handler; interrupting will abort the run");
    }
}

#[cfg(not(unix))]
fn install() {
    log::debug!("Ctrl-C cancellation is not supported on this platform");
}

/// Watches for Ctrl-C and cancels a token. Stops watching when dropped.
pub struct InterruptWatch {
    done: Arc<AtomicBool>,
}

impl InterruptWatch {
    pub fn start(token: CancelToken) -> Self {
        install();
        let done = Arc::new(AtomicBool::new(false));
        let finished = Arc::clone(&done);

        thread::spawn(move || {
            while !finished.load(Ordering::SeqCst) {
                if INTERRUPTED.swap(false, Ordering::SeqCst) {
                    eprintln!("\nInterrupted - finishing in-flight resources (Ctrl-C again to abort)");
                    token.cancel();
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }
        });

        Self { done }
    }
}

impl Drop for InterruptWatch {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
    }
}
