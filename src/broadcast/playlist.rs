//! Round-robin playlist over a directory

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

/// Cycles through the audio files of a directory
///
/// Files play in name order. The directory is listed again each time the
/// cycle wraps, so files added or removed are picked up on the next pass.
#[derive(Debug)]
pub struct Playlist {
    dir: PathBuf,
    extensions: Vec<String>,
    queue: VecDeque<PathBuf>,
}

impl Playlist {
    pub fn new(dir: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            dir: dir.into(),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            queue: VecDeque::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List playable files, sorted by name
    pub async fn scan(&self) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && self.accepts(&path) {
                files.push(path);
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|accepted| *accepted == e))
    }

    /// Next file to play, or `None` when the directory has no playable files
    pub async fn next_source(&mut self) -> io::Result<Option<PathBuf>> {
        if self.queue.is_empty() {
            self.queue = self.scan().await?.into();
            tracing::debug!(dir = %self.dir.display(), sources = self.queue.len(), "Playlist scanned");
        }
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> Vec<String> {
        vec!["mp3".into(), "wav".into()]
    }

    #[tokio::test]
    async fn test_order_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp3", "a.WAV", "notes.txt", "c.wav"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.mp3")).unwrap();

        let playlist = Playlist::new(dir.path(), &extensions());
        let names: Vec<_> = playlist
            .scan()
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.WAV", "b.mp3", "c.wav"]);
    }

    #[tokio::test]
    async fn test_wraps_and_rescans() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.mp3"), b"").unwrap();

        let mut playlist = Playlist::new(dir.path(), &extensions());
        assert!(playlist.next_source().await.unwrap().unwrap().ends_with("one.mp3"));

        std::fs::write(dir.path().join("two.mp3"), b"").unwrap();
        assert!(playlist.next_source().await.unwrap().unwrap().ends_with("one.mp3"));
        assert!(playlist.next_source().await.unwrap().unwrap().ends_with("two.mp3"));
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut playlist = Playlist::new(dir.path(), &extensions());

        assert!(playlist.next_source().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let mut playlist = Playlist::new("/nonexistent/playlist", &extensions());
        assert!(playlist.next_source().await.is_err());
    }
}
