use anyhow::{Context, Result};
use std::io::{Cursor, Write};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// How a downloaded mod ended up on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveDisposition {
    /// The download was already a zip archive and was written unchanged.
    Verbatim,
    /// The download was a bare assembly and was wrapped in a fresh archive.
    Repackaged,
}

/// Write a downloaded mod to `dest` as a zip archive.
///
/// Downloads that already parse as zip archives are written byte for byte.
/// Anything the zip reader rejects as not-an-archive is treated as a bare
/// `.dll` and wrapped in a single-entry archive named after the mod. Other
/// read failures (I/O and the like) propagate. Returns the disposition and
/// the size of the file as written.
pub async fn write_mod_archive(
    bytes: &[u8],
    canonical_name: &str,
    dest: &Path,
) -> Result<(ArchiveDisposition, u64)> {
    match ZipArchive::new(Cursor::new(bytes)) {
        Ok(_) => {
            write_atomic(dest, bytes).await?;
            Ok((ArchiveDisposition::Verbatim, bytes.len() as u64))
        }
        Err(ZipError::InvalidArchive(_)) => {
            let packed = repackage(bytes, canonical_name)
                .with_context(|| format!("Failed to repackage {}", canonical_name))?;
            write_atomic(dest, &packed).await?;
            Ok((ArchiveDisposition::Repackaged, packed.len() as u64))
        }
        Err(e) => Err(e).context("Failed to inspect downloaded archive"),
    }
}

fn repackage(bytes: &[u8], canonical_name: &str) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));
    writer.start_file(format!("{}.dll", canonical_name), options)?;
    writer.write_all(bytes)?;
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_name = format!(
        "{}.part",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archive")
    );
    let tmp_path = path.with_file_name(tmp_name);
    let mut file = File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn tiny_zip() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("inner.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn valid_zip_is_written_verbatim() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("SatchelTool-v1.0.zip");
        let zip_bytes = tiny_zip();

        let (disposition, size) = write_mod_archive(&zip_bytes, "SatchelTool", &dest)
            .await
            .unwrap();

        assert_eq!(disposition, ArchiveDisposition::Verbatim);
        assert_eq!(size, zip_bytes.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), zip_bytes);
        assert!(!tmp.path().join("SatchelTool-v1.0.zip.part").exists());
    }

    #[tokio::test]
    async fn bare_payload_is_repackaged_as_a_dll_entry() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("Benchwarp-v1.0.zip");
        let payload = b"MZ this is not a zip archive".to_vec();

        let (disposition, size) = write_mod_archive(&payload, "Benchwarp", &dest)
            .await
            .unwrap();

        assert_eq!(disposition, ArchiveDisposition::Repackaged);
        let written = std::fs::read(&dest).unwrap();
        assert_eq!(size, written.len() as u64);

        let mut archive = ZipArchive::new(Cursor::new(written)).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name("Benchwarp.dll").unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, payload);
    }
}
