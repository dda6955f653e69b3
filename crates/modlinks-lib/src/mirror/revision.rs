use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use std::path::PathBuf;

/// Digest every file the mirror wrote into a single SHA-1, rendered as
/// uppercase hex. Paths are sorted first so the completion order of the
/// concurrent downloads cannot change the result.
pub async fn compute_revision(mut paths: Vec<PathBuf>) -> Result<String> {
    paths.sort();

    let mut hasher = Sha1::new();
    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?} for revision hash", path))?;
        hasher.update(&bytes);
    }

    Ok(format!("{:X}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn revision_ignores_completion_order() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.zip");
        let b = tmp.path().join("b.zip");
        std::fs::write(&a, b"alpha").unwrap();
        std::fs::write(&b, b"beta").unwrap();

        let forward = compute_revision(vec![a.clone(), b.clone()]).await.unwrap();
        let reversed = compute_revision(vec![b, a]).await.unwrap();

        assert_eq!(forward, reversed);
    }

    #[tokio::test]
    async fn revision_tracks_file_contents() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.zip");
        std::fs::write(&a, b"alpha").unwrap();
        let before = compute_revision(vec![a.clone()]).await.unwrap();

        std::fs::write(&a, b"alpha, changed").unwrap();
        let after = compute_revision(vec![a]).await.unwrap();

        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn revision_is_uppercase_sha1_hex() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.zip");
        std::fs::write(&a, b"alpha").unwrap();

        let revision = compute_revision(vec![a]).await.unwrap();

        assert_eq!(revision.len(), 40);
        assert!(revision.chars().all(|c| matches!(c, '0'..='9' | 'A'..='F')));
    }
}
