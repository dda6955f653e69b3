pub mod admission;
pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod rebase;
pub mod revision;
pub mod types;

pub use archive::*;
pub use config::*;
pub use error::*;
pub use types::*;

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::manifest::{ApiLinks, LinkSlot, LinksDocument, ModLinks};
use crate::naming::canonical_name;
use admission::{is_skip_listed, within_size_ceiling};
use fetch::{build_client, download_to_path, fetch_bytes, fetch_text};
use revision::compute_revision;

/// One mod admitted for mirroring, with the names its artifact and log
/// lines use.
struct ModPlan {
    display: String,
    canonical: String,
    /// Output file name without the `.zip` extension.
    stem: String,
    url: String,
    slot: LinkSlot,
}

enum TaskKind {
    Api {
        platform: &'static str,
    },
    Mod {
        display: String,
        canonical: String,
        stem: String,
    },
}

/// One download unit fed to the concurrent fetch stage.
struct ArtifactTask {
    url: String,
    dest: PathBuf,
    /// Rewritten link value, applied to the manifest once every task has
    /// joined.
    public_url: String,
    slot: LinkSlot,
    target: LinkTarget,
    kind: TaskKind,
}

/// Run a full mirror pass: fetch both manifests, download every admitted
/// artifact concurrently, rewrite the links of everything that was written,
/// and stamp the result with a revision hash.
///
/// Individual artifact failures do not abort the run; they are collected in
/// the summary and their links keep their upstream values.
pub async fn run(config: &MirrorConfig, cancel: CancelToken) -> Result<MirrorSummary> {
    if cancel.is_cancelled() {
        return Err(MirrorError::Cancelled.into());
    }

    let client = build_client()?;

    reset_dist(config, true).await?;

    let api_text = fetch_text(&client, &format!("{}ApiLinks.xml", config.source), &cancel)
        .await
        .context("Failed to fetch ApiLinks.xml")?;
    let mod_text = fetch_text(&client, &format!("{}ModLinks.xml", config.source), &cancel)
        .await
        .context("Failed to fetch ModLinks.xml")?;

    let mut api_doc = LinksDocument::parse(&api_text).context("Failed to parse ApiLinks.xml")?;
    let mut mod_doc = LinksDocument::parse(&mod_text).context("Failed to parse ModLinks.xml")?;

    let api_links = ApiLinks::parse(&api_doc)?;
    let mod_links = ModLinks::parse(&mod_doc)?;

    log::info!(
        "Mirroring api version {} and {} mods from {}",
        api_links.version,
        mod_links.entries.len(),
        config.source
    );

    let plans = plan_mods(&mod_links, &config.skip_urls)?;

    let mut tasks: Vec<ArtifactTask> = Vec::with_capacity(api_links.entries.len() + plans.len());

    for entry in &api_links.entries {
        let file_name = format!("{}-{}.zip", entry.platform.as_str(), api_links.version);
        tasks.push(ArtifactTask {
            url: entry.url.clone(),
            dest: config.apis_dir().join(&file_name),
            public_url: format!(
                "{}apis/{}",
                config.base_url,
                html_escape::encode_safe(&file_name)
            ),
            slot: entry.slot,
            target: LinkTarget::Api,
            kind: TaskKind::Api {
                platform: entry.platform.as_str(),
            },
        });
    }

    for plan in plans {
        let file_name = format!("{}.zip", plan.stem);
        tasks.push(ArtifactTask {
            url: plan.url,
            dest: config.mods_dir().join(&file_name),
            public_url: format!(
                "{}mods/{}",
                config.base_url,
                html_escape::encode_safe(&file_name)
            ),
            slot: plan.slot,
            target: LinkTarget::Mod,
            kind: TaskKind::Mod {
                display: plan.display,
                canonical: plan.canonical,
                stem: plan.stem,
            },
        });
    }

    let max_allowed_size = config.max_allowed_size;
    let outcomes: Vec<TaskOutcome> = stream::iter(tasks)
        .map(|task| {
            let client = client.clone();
            let cancel = cancel.clone();
            async move { run_task(client, cancel, max_allowed_size, task).await }
        })
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    if cancel.is_cancelled() {
        return Err(MirrorError::Cancelled.into());
    }

    let mut written_paths: Vec<PathBuf> = Vec::new();
    let mut oversized: Vec<String> = Vec::new();
    let mut failed: Vec<FailedArtifact> = Vec::new();

    for outcome in outcomes {
        match outcome {
            TaskOutcome::Written {
                target,
                path,
                slot,
                url,
            } => {
                match target {
                    LinkTarget::Api => api_doc.set_link(slot, &url),
                    LinkTarget::Mod => mod_doc.set_link(slot, &url),
                }
                written_paths.push(path);
            }
            TaskOutcome::Oversized { name } => oversized.push(name),
            TaskOutcome::Failed(failure) => {
                log::error!(
                    "Failed to mirror {} from {}: {:#}",
                    failure.name,
                    failure.url,
                    failure.error
                );
                failed.push(failure);
            }
        }
    }

    tokio::fs::write(config.api_links_path(), api_doc.to_xml()?)
        .await
        .context("Failed to write ApiLinks.xml")?;
    tokio::fs::write(config.mod_links_path(), mod_doc.to_xml()?)
        .await
        .context("Failed to write ModLinks.xml")?;

    let written = written_paths.len();
    let revision = compute_revision(written_paths).await?;
    tokio::fs::write(config.revision_path(), format!("{}\n", revision))
        .await
        .context("Failed to write revision.txt")?;

    log::info!("Mirror revision: {}", revision);

    Ok(MirrorSummary {
        revision,
        written,
        oversized,
        failed,
    })
}

async fn run_task(
    client: Client,
    cancel: CancelToken,
    max_allowed_size: u64,
    task: ArtifactTask,
) -> TaskOutcome {
    let ArtifactTask {
        url,
        dest,
        public_url,
        slot,
        target,
        kind,
    } = task;

    if cancel.is_cancelled() {
        let name = match &kind {
            TaskKind::Api { platform } => format!("{} api", platform),
            TaskKind::Mod { display, .. } => display.clone(),
        };
        return TaskOutcome::Failed(FailedArtifact {
            name,
            url,
            error: MirrorError::Cancelled.into(),
        });
    }

    match kind {
        TaskKind::Api { platform } => {
            match download_to_path(&client, &url, &dest, &cancel).await {
                Ok(size) => {
                    log::info!("Downloaded {} api - {}", platform, format_size(size));
                    TaskOutcome::Written {
                        target,
                        path: dest,
                        slot,
                        url: public_url,
                    }
                }
                Err(error) => TaskOutcome::Failed(FailedArtifact {
                    name: format!("{} api", platform),
                    url,
                    error,
                }),
            }
        }
        TaskKind::Mod {
            display,
            canonical,
            stem,
        } => {
            let bytes = match fetch_bytes(&client, &url, &cancel).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    return TaskOutcome::Failed(FailedArtifact {
                        name: display,
                        url,
                        error,
                    });
                }
            };

            let (disposition, size) = match write_mod_archive(&bytes, &canonical, &dest).await {
                Ok(result) => result,
                Err(error) => {
                    return TaskOutcome::Failed(FailedArtifact {
                        name: display,
                        url,
                        error,
                    });
                }
            };
            if disposition == ArchiveDisposition::Repackaged {
                log::info!("Compressed {}", display);
            }

            if !within_size_ceiling(size, max_allowed_size) {
                log::info!("Skipped {}", stem);
                if let Err(e) = tokio::fs::remove_file(&dest).await {
                    log::warn!("Failed to remove oversized archive {:?}: {}", dest, e);
                }
                return TaskOutcome::Oversized { name: stem };
            }

            if display == canonical {
                log::info!("Downloaded {} - {}", stem, format_size(size));
            } else {
                log::info!("Downloaded {} as {} - {}", display, stem, format_size(size));
            }
            TaskOutcome::Written {
                target,
                path: dest,
                slot,
                url: public_url,
            }
        }
    }
}

/// Decide which mods get mirrored. Skip-listed URLs are dropped before any
/// name normalization, so an unmappable name behind a skipped URL cannot
/// fail the run. Two admitted mods mapping to the same canonical name abort
/// the run; their artifacts would overwrite each other.
fn plan_mods(mod_links: &ModLinks, skip_urls: &[String]) -> Result<Vec<ModPlan>> {
    let mut plans = Vec::with_capacity(mod_links.entries.len());
    let mut seen: HashMap<String, String> = HashMap::new();

    for entry in &mod_links.entries {
        if is_skip_listed(&entry.url, skip_urls) {
            log::debug!("Skipping {} by configuration: {}", entry.name, entry.url);
            continue;
        }

        let canonical = canonical_name(&entry.name)?;
        if let Some(first) = seen.get(&canonical) {
            bail!(MirrorError::NamingCollision {
                canonical,
                first: first.clone(),
                second: entry.name.clone(),
            });
        }
        seen.insert(canonical.clone(), entry.name.clone());

        let stem = format!("{}-v{}", canonical, entry.version);
        plans.push(ModPlan {
            display: entry.name.clone(),
            canonical,
            stem,
            url: entry.url.clone(),
            slot: entry.slot,
        });
    }

    Ok(plans)
}

/// Clear and recreate the dist directory. Mirror runs also want the two
/// artifact directories; rebase runs write only the manifest files.
pub(crate) async fn reset_dist(config: &MirrorConfig, with_artifact_dirs: bool) -> Result<()> {
    match tokio::fs::remove_dir_all(&config.dist_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to clear {:?}", config.dist_dir));
        }
    }
    tokio::fs::create_dir_all(&config.dist_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", config.dist_dir))?;
    if with_artifact_dirs {
        tokio::fs::create_dir_all(config.apis_dir()).await?;
        tokio::fs::create_dir_all(config.mods_dir()).await?;
    }
    Ok(())
}
