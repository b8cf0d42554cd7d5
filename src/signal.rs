//! SIGINT handling (§5, §9). The engine is purely synchronous - there is no
//! reactor to register a `signalfd` with, so cancellation is a classic
//! sigaction handler flipping an `AtomicBool` that the main loop polls
//! between blocking operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Error};
use nix::sys::signal::{self, SigAction, SigHandler, SigSet, Signal};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Cheaply cloneable handle for checking whether SIGINT has arrived.
#[derive(Clone)]
pub struct CancelToken(Arc<()>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        INTERRUPTED.load(Ordering::SeqCst)
    }
}

/// Installs the SIGINT handler. Must be called once, before the main loop
/// starts; returns a token the loop polls to know when to wind down.
pub fn install() -> Result<CancelToken, Error> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigint),
        signal::SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGINT, &action) }
        .context("failed to install SIGINT handler")?;
    Ok(CancelToken(Arc::new(())))
}
