use crate::export::encode::ImageBlob;
use crate::foundation::error::{SeqcardError, SeqcardResult};
use anyhow::Context as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pause between items of a batch save, default 150 ms. Pacing keeps a burst
/// of writes from overwhelming the destination.
pub const DEFAULT_INTER_SAVE_DELAY: Duration = Duration::from_millis(150);

/// Writes encoded blobs to the filesystem with batch pacing.
#[derive(Clone, Debug)]
pub struct FileExporter {
    inter_save_delay: Duration,
}

impl Default for FileExporter {
    fn default() -> Self {
        Self {
            inter_save_delay: DEFAULT_INTER_SAVE_DELAY,
        }
    }
}

impl FileExporter {
    pub fn new(inter_save_delay: Duration) -> Self {
        Self { inter_save_delay }
    }

    pub fn save_blob(&self, blob: &ImageBlob, path: &Path) -> SeqcardResult<()> {
        if blob.is_empty() {
            return Err(SeqcardError::export("refusing to save an empty blob"));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create export directory {}", parent.display()))?;
        }
        std::fs::write(path, &blob.bytes)
            .with_context(|| format!("write export file {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = blob.len(), "saved export");
        Ok(())
    }

    /// Save blobs sequentially with the configured delay between items.
    pub fn save_blob_batch(
        &self,
        blobs: &[(ImageBlob, PathBuf)],
    ) -> SeqcardResult<()> {
        for (i, (blob, path)) in blobs.iter().enumerate() {
            if i > 0 && !self.inter_save_delay.is_zero() {
                std::thread::sleep(self.inter_save_delay);
            }
            self.save_blob(blob, path)?;
        }
        Ok(())
    }
}

/// `{sanitizedPrefix}_page_{000}_{width}x{height}.{ext}`
pub fn page_filename(prefix: &str, page: usize, width: u32, height: u32, ext: &str) -> String {
    format!(
        "{}_page_{:03}_{}x{}.{}",
        sanitize_prefix(prefix),
        page,
        width,
        height,
        ext
    )
}

/// `{name}_{YYYY-MM-DD}[_HH-MM-SS].{ext}`
pub fn timestamped_filename(name: &str, with_time: bool, ext: &str) -> String {
    let now = chrono::Local::now();
    let stamp = if with_time {
        now.format("%Y-%m-%d_%H-%M-%S")
    } else {
        now.format("%Y-%m-%d")
    };
    format!("{}_{stamp}.{ext}", sanitize_prefix(name))
}

/// Keep filenames portable: alphanumerics, dash and underscore survive,
/// everything else collapses to an underscore.
fn sanitize_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned
    }
}
