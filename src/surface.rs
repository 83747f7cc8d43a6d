//! File-backed presentation surface.
//!
//! The "visible image" is `current.<ext>` inside the output directory. Each
//! swap writes a temp file and renames it over the previous image so readers
//! never see a partial file. I/O errors are logged; the sync loop keeps going.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, info, warn};
use viewport::image::{RenderedImage, Surface};

/// Stem of the displayed image file.
pub const CURRENT_STEM: &str = "current";

const TEMP_NAME: &str = ".current.tmp";

pub struct FileSurface {
    dir: PathBuf,
    current: Option<PathBuf>,
    swaps: u64,
}

impl FileSurface {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), current: None, swaps: 0 }
    }

    fn clear_stale(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_image = path.file_stem().is_some_and(|stem| stem == CURRENT_STEM);
            let is_temp = path.file_name().is_some_and(|name| name == TEMP_NAME);
            if is_image || is_temp {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn write(&mut self, image: &RenderedImage) -> io::Result<PathBuf> {
        let target = self.dir.join(format!("{CURRENT_STEM}.{}", image.extension()));
        let temp = self.dir.join(TEMP_NAME);
        fs::write(&temp, &image.bytes)?;
        fs::rename(&temp, &target)?;

        // A format change leaves the old extension behind.
        if let Some(previous) = self.current.take().filter(|p| *p != target) {
            if let Err(e) = fs::remove_file(&previous) {
                debug!(path = %previous.display(), error = %e, "stale image not removed");
            }
        }
        Ok(target)
    }
}

impl Surface for FileSurface {
    fn mount(&mut self, width: u32, height: u32) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "output directory not created");
            return;
        }
        if let Err(e) = self.clear_stale() {
            warn!(dir = %self.dir.display(), error = %e, "stale images not cleared");
        }
        self.current = None;
        self.swaps = 0;
        info!(dir = %self.dir.display(), width, height, "surface mounted");
    }

    fn replace_image(&mut self, image: RenderedImage) {
        match self.write(&image) {
            Ok(path) => {
                self.swaps += 1;
                debug!(path = %path.display(), bytes = image.bytes.len(), swaps = self.swaps, "image displayed");
                self.current = Some(path);
            }
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "image not written"),
        }
    }
}

#[cfg(test)]
#[path = "surface_test.rs"]
mod tests;
