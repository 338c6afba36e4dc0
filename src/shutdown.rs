//! Interrupt handling for a sync run.
//!
//! Signals are attached to the run's [`CancellationToken`] only after the
//! interactive prompts, so Ctrl+C at a prompt still ends the process the
//! usual way. Once attached:
//!
//! - The first SIGINT, SIGTERM or SIGHUP cancels the token. A download
//!   waiting out a retry backoff gives up, the item in flight resolves,
//!   and the sync loop stops before the next item. The checkpoint is
//!   flushed and the run returns `SyncError::Interrupted` with the
//!   statistics so far, which `main` reports before exiting with status 1.
//! - A second signal exits at once with status 130. Items finished since
//!   the last checkpoint flush are resolved by hash on the next run.

use tokio_util::sync::CancellationToken;

const FORCE_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    StopAfterCurrentItem,
    ForceExit,
}

/// Response to a signal, given how many arrived before it.
fn action_for(previous_signals: u32) -> SignalAction {
    if previous_signals == 0 {
        SignalAction::StopAfterCurrentItem
    } else {
        SignalAction::ForceExit
    }
}

/// Cancel `token` on the first termination signal; force-exit on the second.
pub(crate) fn listen_for_signals(token: CancellationToken) -> anyhow::Result<()> {
    // Registered here so a failure surfaces as a setup error.
    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate())?,
            signal(SignalKind::hangup())?,
        )
    };

    tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                    _ = sighup.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Could not listen for Ctrl+C: {}", e);
                    return;
                }
            }

            match action_for(received) {
                SignalAction::StopAfterCurrentItem => {
                    tracing::info!("Interrupt received, stopping after the current item");
                    tracing::info!("Press Ctrl+C again to exit without saving progress");
                    token.cancel();
                }
                SignalAction::ForceExit => {
                    tracing::warn!("Force exit requested");
                    std::process::exit(FORCE_EXIT_CODE);
                }
            }
            received += 1;
        }
    });

    Ok(())
}
