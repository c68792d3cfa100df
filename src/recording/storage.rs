use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::{codecs::jpeg::JpegEncoder, RgbImage};

pub const IMAGES_DIR: &str = "images";

/// Name of the directory images go to before the operator names the session.
pub fn temp_session_name(started_at: DateTime<Utc>) -> String {
    format!("session_{}", started_at.timestamp())
}

/// Keeps letters, digits, `-`, `_` and spaces. Falls back to
/// `session_<unix seconds>` when nothing usable is left.
pub fn sanitize_session_name(input: &str, now: DateTime<Utc>) -> String {
    let kept: String = input
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let trimmed = kept.trim();

    if trimmed.is_empty() {
        format!("session_{}", now.timestamp())
    } else {
        trimmed.to_string()
    }
}

/// First of `name`, `name_1`, `name_2`, ... that does not exist under `root`.
pub fn unique_session_dir(root: &Path, name: &str) -> PathBuf {
    let base = root.join(name);
    if !base.exists() {
        return base;
    }

    let mut suffix: u32 = 1;
    loop {
        let candidate = root.join(format!("{name}_{suffix}"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

pub fn image_file_name(index: u32) -> String {
    format!("{index:04}.jpg")
}

pub fn write_jpeg(path: &Path, image: &RgbImage, quality: u8) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    encoder
        .encode_image(image)
        .with_context(|| format!("failed to encode {}", path.display()))?;
    Ok(())
}

/// Moves the temporary session directory to its final, collision-free
/// name, or creates the final directory when no image was ever saved.
pub fn finalize_session_dir(root: &Path, temp_dir: Option<&Path>, name: &str) -> Result<PathBuf> {
    if let Some(temp) = temp_dir.filter(|dir| dir.exists()) {
        if temp == root.join(name) {
            return Ok(temp.to_path_buf());
        }
        let target = unique_session_dir(root, name);
        fs::rename(temp, &target).with_context(|| {
            format!("failed to rename {} to {}", temp.display(), target.display())
        })?;
        return Ok(target);
    }

    let target = unique_session_dir(root, name);
    fs::create_dir_all(&target)
        .with_context(|| format!("failed to create {}", target.display()))?;
    Ok(target)
}

/// Periodic frame writer for one session.
///
/// The session directory is created on the first successful save. The
/// counter only advances after a file is fully written, so names stay
/// contiguous from `0001.jpg` even when a write fails.
#[derive(Debug)]
pub struct ImageSink {
    session_dir: PathBuf,
    created: bool,
    saved: u32,
    interval: Duration,
    quality: u8,
    last_save: Instant,
}

impl ImageSink {
    pub fn new(session_dir: PathBuf, interval: Duration, quality: u8, started: Instant) -> Self {
        Self {
            session_dir,
            created: false,
            saved: 0,
            interval,
            quality,
            last_save: started,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_save) >= self.interval
    }

    pub fn save(&mut self, image: &RgbImage, now: Instant) -> Result<PathBuf> {
        let images_dir = self.session_dir.join(IMAGES_DIR);
        if !self.created {
            fs::create_dir_all(&images_dir)
                .with_context(|| format!("failed to create {}", images_dir.display()))?;
            self.created = true;
            log::info!("Session directory created: {}", self.session_dir.display());
        }

        let path = images_dir.join(image_file_name(self.saved + 1));
        write_jpeg(&path, image, self.quality)?;

        self.saved += 1;
        self.last_save = now;
        Ok(path)
    }

    pub fn saved(&self) -> u32 {
        self.saved
    }

    /// The directory, if anything was written to it.
    pub fn session_dir(&self) -> Option<&Path> {
        self.created.then_some(self.session_dir.as_path())
    }
}
