use anyhow::{Context, Result};

use super::config::MirrorConfig;
use super::error::MirrorError;
use super::fetch::{build_client, fetch_text};
use super::types::CancelToken;

/// Repoint an existing mirror at a new base URL without touching artifacts.
///
/// The manifests and revision are fetched from the configured source, every
/// occurrence of the old base URL is replaced with the current one, and the
/// three files are written to the dist directory. No artifact directories
/// are created; the archives are expected to live wherever the source
/// mirror put them.
pub async fn run(config: &MirrorConfig, cancel: CancelToken) -> Result<()> {
    if config.rebase_from_url.trim().is_empty() {
        anyhow::bail!("Rebase-from URL not specified");
    }
    if cancel.is_cancelled() {
        return Err(MirrorError::Cancelled.into());
    }

    log::info!(
        "Rebasing manifests from {} onto {}",
        config.rebase_from_url,
        config.base_url
    );

    super::reset_dist(config, false).await?;

    let client = build_client()?;

    let revision_url = format!("{}revision.txt", config.source);
    let revision = fetch_text(&client, &revision_url, &cancel)
        .await
        .map_err(|e| MirrorError::RebaseSourceInvalid(format!("{:#}", e)))?;
    tokio::fs::write(config.revision_path(), &revision)
        .await
        .context("Failed to write revision.txt")?;

    for (name, path) in [
        ("ApiLinks.xml", config.api_links_path()),
        ("ModLinks.xml", config.mod_links_path()),
    ] {
        let text = fetch_text(&client, &format!("{}{}", config.source, name), &cancel)
            .await
            .with_context(|| format!("Failed to fetch {} from rebase source", name))?;
        let rebased = text.replace(&config.rebase_from_url, &config.base_url);
        tokio::fs::write(&path, rebased)
            .await
            .with_context(|| format!("Failed to write {}", name))?;
        log::info!("Rebased {}", name);
    }

    Ok(())
}
