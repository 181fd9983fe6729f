//! One-shot Ctrl-C handling.
//!
//! The listener starts armed. Whichever comes first, an interrupt or [`InterruptListener::disarm`],
//! moves it to done; it's never re-armed. An interrupt while armed cancels the shared token.
//! Once done, the next interrupt terminates the process on the spot, the same as with no
//! handler installed.

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;

/// Exit status of a process killed by SIGINT
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

pub struct InterruptListener {
    done: CancellationToken,
}

impl InterruptListener {
    /// Listen for Ctrl-C, cancelling `cancel` on the first one.
    pub fn arm(cancel: CancellationToken) -> Self {
        Self::with_source(
            cancel,
            tokio::signal::ctrl_c,
            || std::process::exit(INTERRUPTED_EXIT_CODE),
        )
    }

    /// `interrupts` yields once per interrupt, `terminate` handles the one after the
    /// listener is done.
    pub fn with_source<S, F, T>(cancel: CancellationToken, interrupts: S, terminate: T) -> Self
    where
        S: FnMut() -> F + Send + 'static,
        F: Future<Output = io::Result<()>> + Send + 'static,
        T: FnOnce() + Send + 'static,
    {
        let done = CancellationToken::new();
        tokio::spawn(listen(interrupts, cancel, done.clone(), terminate));

        InterruptListener { done }
    }

    /// The guarded operation finished; later interrupts are no longer turned into cancellation.
    pub fn disarm(self) {
        drop(self);
    }
}

impl Drop for InterruptListener {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

async fn listen<S, F, T>(mut interrupts: S, cancel: CancellationToken, done: CancellationToken, terminate: T)
where
    S: FnMut() -> F,
    F: Future<Output = io::Result<()>>,
    T: FnOnce(),
{
    tokio::select! {
        biased;
        _ = done.cancelled() => {}
        result = interrupts() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Unable to listen for interrupt");
                return;
            }
            tracing::warn!(signal = "interrupt", "Caught signal");
            cancel.cancel();
        }
    }

    match interrupts().await {
        Ok(()) => {
            tracing::warn!(signal = "interrupt", "Caught signal again, terminating");
            terminate();
        }
        Err(e) => tracing::error!(error = %e, "Unable to listen for interrupt"),
    }
}
