//! Filesystem writer adapter (spec §6.4, §4.8 "Output tree layout").

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use ytsub_core::adapters::{VideoArtifacts, WriterAdapter};
use ytsub_core::atomic_io;
use ytsub_core::error::CoreResult;

/// Writes every artifact under `<output_dir>/videos/<video_id>/`,
/// atomically (temp file + rename, via `ytsub_core::atomic_io`).
pub struct LocalWriterAdapter {
    output_dir: PathBuf,
}

impl LocalWriterAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }
}

#[async_trait]
impl WriterAdapter for LocalWriterAdapter {
    async fn write_video_artifacts(
        &self,
        video_id: &str,
        artifacts: VideoArtifacts,
    ) -> CoreResult<BTreeMap<String, PathBuf>> {
        let dir = self.output_dir.join("videos").join(video_id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut files = BTreeMap::new();

        let (source_lang, bytes) = &artifacts.original_srt;
        let original_path = dir.join(format!("original.{source_lang}.srt"));
        atomic_io::write_atomic(&original_path, bytes).await?;
        files.insert("original".to_string(), original_path);

        for (lang, bytes) in &artifacts.translated_srt {
            let path = dir.join(format!("translated.{lang}.srt"));
            atomic_io::write_atomic(&path, bytes).await?;
            files.insert(format!("translated.{lang}"), path);
        }

        if let Some((lang, bytes)) = &artifacts.summary_markdown {
            let path = dir.join(format!("summary.{lang}.md"));
            atomic_io::write_atomic(&path, bytes).await?;
            files.insert("summary".to_string(), path);
        }

        let metadata_path = dir.join("metadata.json");
        atomic_io::write_atomic(&metadata_path, &artifacts.metadata_json).await?;
        files.insert("metadata".to_string(), metadata_path);

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_every_artifact_under_videos_dir() {
        let dir = tempdir().unwrap();
        let writer = LocalWriterAdapter::new(dir.path());
        let mut translated = BTreeMap::new();
        translated.insert("zh-CN".to_string(), b"translated".to_vec());
        let artifacts = VideoArtifacts {
            original_srt: ("en".to_string(), b"original".to_vec()),
            translated_srt: translated,
            summary_markdown: Some(("zh-CN".to_string(), b"# summary".to_vec())),
            metadata_json: b"{}".to_vec(),
        };

        let files = writer.write_video_artifacts("abc123def45", artifacts).await.unwrap();
        assert!(files.contains_key("original"));
        assert!(files.contains_key("translated.zh-CN"));
        assert!(files.contains_key("summary"));
        assert!(files.contains_key("metadata"));
        for path in files.values() {
            assert!(path.exists());
        }
    }
}
