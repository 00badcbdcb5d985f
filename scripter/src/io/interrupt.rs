//! Ctrl+C handling.
//!
//! An interrupt never cancels the record in progress; it only keeps the next
//! record from starting. The foreground child still receives the terminal's
//! SIGINT on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Shared flag raised when the user asks the run to stop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raise `flag` on Ctrl+C.
///
/// Runs a single-threaded tokio runtime on a detached helper thread that waits
/// for the signal; the interpreter itself stays synchronous.
pub fn install_ctrl_c(flag: StopFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build signal runtime")?;

    thread::Builder::new()
        .name("scripter-ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("received Ctrl+C, stopping after the current record");
                        flag.raise();
                    }
                    Err(err) => warn!(err = %err, "failed to listen for Ctrl+C"),
                }
            });
        })
        .context("spawn signal thread")?;
    Ok(())
}
