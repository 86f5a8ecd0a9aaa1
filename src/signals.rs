use anyhow::{Context, Result};
use async_std::channel;
use std::future::Future;
use tide::log::info;

/// Resolves on the first SIGINT, SIGTERM or SIGHUP. Signals after the first are ignored.
///
/// SIGHUP is trapped too, so a hangup from the controlling terminal shuts the
/// server down gracefully instead of killing it mid-request.
///
/// Installs a process-wide handler, so it can only be set up once.
pub fn termination() -> Result<impl Future<Output = ()>> {
    let (sender, receiver) = channel::bounded(1);
    ctrlc::set_handler(move || {
        // full once the first signal is queued
        let _ = sender.try_send(());
    })
    .context("could not install the termination signal handler")?;

    Ok(async move {
        if receiver.recv().await.is_ok() {
            info!("termination signal received");
        }
    })
}
