use anyhow::Result;
use tokio::sync::watch;

use modlinks_lib::mirror::{self, rebase, CancelToken, MirrorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = MirrorConfig::from_env()?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping...");
            let _ = cancel_tx.send(true);
        }
    });
    let cancel = CancelToken::new(cancel_rx);

    if config.rebase_only {
        rebase::run(&config, cancel).await?;
        log::info!("Rebase complete");
        return Ok(());
    }

    let summary = mirror::run(&config, cancel).await?;

    log::info!(
        "Mirrored {} artifacts ({} oversized, {} failed), revision {}",
        summary.written,
        summary.oversized.len(),
        summary.failed.len(),
        summary.revision
    );

    if !summary.failed.is_empty() {
        anyhow::bail!("{} artifacts failed to mirror", summary.failed.len());
    }

    Ok(())
}
