use anyhow::{bail, Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::FrameSource;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Frames read from a directory of still images, in file-name order.
/// Recorded captures are stored as `frame_000001.png`, `frame_000002.png`, ...
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            bail!("No frame images in {}", dir.display());
        }
        info!("Image sequence {}: {} frame(s)", dir.display(), files.len());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn describe(&self) -> String {
        format!("[Frames] {}", self.dir.display())
    }

    fn grab(&mut self) -> Result<Option<RgbaImage>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        debug!("Decoding {}", path.display());
        let img = image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;
        Ok(Some(img.to_rgba8()))
    }
}
