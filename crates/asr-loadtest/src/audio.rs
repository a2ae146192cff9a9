use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};

use asr_protocol::audio::{chunk_size, AudioPayload};

/// Load one payload from a file, or every regular file of a directory
/// sorted by name. Payload names are the file names.
///
/// Lengths that do not fit the paced chunk grid are only warned about here;
/// the session rejects them per exchange.
pub async fn load_payloads(path: &Path, sample_rate: u32) -> anyhow::Result<Arc<[AudioPayload]>> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("cannot access audio path {}", path.display()))?;

    let mut files = if meta.is_dir() {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .with_context(|| format!("cannot list {}", path.display()))?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files
    } else {
        vec![path.to_path_buf()]
    };

    if files.is_empty() {
        bail!("no audio files in {}", path.display());
    }
    files.sort();

    let chunk = chunk_size(sample_rate);
    let mut payloads = Vec::with_capacity(files.len());
    for file in files {
        let bytes = tokio::fs::read(&file)
            .await
            .with_context(|| format!("cannot read audio file {}", file.display()))?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());

        if chunk == 0 || bytes.len() % chunk != 0 {
            warn!(payload = %name, len = bytes.len(), chunk, "Audio length is not a whole number of chunks");
        }

        payloads.push(AudioPayload::new(name, bytes));
    }

    info!(count = payloads.len(), path = %path.display(), "Audio loaded");
    Ok(payloads.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("asr-loadtest-audio-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn single_file() {
        let dir = scratch_dir("file");
        let file = dir.join("one.pcm");
        std::fs::write(&file, vec![1u8; 24_000]).unwrap();

        let payloads = load_payloads(&file, 48_000).await.unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].name, "one.pcm");
        assert_eq!(payloads[0].len(), 24_000);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn directory_sorted_by_name() {
        let dir = scratch_dir("dir");
        std::fs::write(dir.join("b.pcm"), vec![0u8; 24_000]).unwrap();
        std::fs::write(dir.join("a.pcm"), vec![0u8; 48_000]).unwrap();
        // Misaligned files still load
        std::fs::write(dir.join("c.pcm"), vec![0u8; 1_001]).unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();

        let payloads = load_payloads(&dir, 48_000).await.unwrap();
        let names: Vec<&str> = payloads.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a.pcm", "b.pcm", "c.pcm"]);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn empty_directory_is_fatal() {
        let dir = scratch_dir("empty");
        let err = load_payloads(&dir, 48_000).await.unwrap_err();
        assert!(err.to_string().contains("no audio files"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn missing_path_is_fatal() {
        let missing = std::env::temp_dir().join("asr-loadtest-definitely-missing.pcm");
        assert!(load_payloads(&missing, 48_000).await.is_err());
    }
}
