use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use image::{metadata::Orientation as ExifOrientation, DynamicImage, ImageDecoder, ImageReader};

use crate::catalog::effective_orientation;
use crate::config::{MismatchRotation, Orientation};
use crate::{info, warn};

/// Hidden directory under the wallpaper root holding rotated copies.
pub const GENERATED_DIR: &str = ".wallpaper_temp";

#[derive(Debug)]
pub enum TransformError {
    Io(std::io::Error),
    Image(image::ImageError),
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error during transform: {e}"),
            Self::Image(e) => write!(f, "Image error during transform: {e}"),
        }
    }
}

impl std::error::Error for TransformError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Direction {
    Left,
    Right,
}

impl Direction {
    fn from_policy(rotation: MismatchRotation) -> Option<Self> {
        match rotation {
            MismatchRotation::None => None,
            MismatchRotation::Left => Some(Self::Left),
            MismatchRotation::Right => Some(Self::Right),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Produces rotated copies of mismatched-orientation images and garbage
/// collects stale ones. Generated files are a cache keyed by
/// (source, direction): the name is deterministic, so repeated rotations of
/// the same source reuse one file instead of multiplying copies.
pub struct Transformer {
    generated_dir: PathBuf,
    cache: HashMap<(PathBuf, Direction), PathBuf>,
    live: HashSet<PathBuf>,
}

impl Transformer {
    pub fn new(wallpaper_root: &Path) -> Self {
        Self {
            generated_dir: wallpaper_root.join(GENERATED_DIR),
            cache: HashMap::new(),
            live: HashSet::new(),
        }
    }

    pub fn generated_dir(&self) -> &Path {
        &self.generated_dir
    }

    /// Deterministic output name: `rotated_<direction>_<originalBasename>`.
    fn generated_path(&self, source: &Path, direction: Direction) -> PathBuf {
        let basename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.generated_dir
            .join(format!("rotated_{}_{}", direction.as_str(), basename))
    }

    /// Starts a new tick: nothing is live until `prepare` marks it so.
    pub fn begin_tick(&mut self) {
        self.live.clear();
    }

    /// Marks a path assigned this tick as live. A wallpaper can resolve to a
    /// file already inside the hidden directory (a rotated copy left by a
    /// prior run), and a file the desktop was just pointed at must never be
    /// swept by the same tick's cleanup. Paths outside the hidden directory
    /// are ignored; cleanup never touches them anyway.
    pub fn mark_live(&mut self, path: &Path) {
        if path.starts_with(&self.generated_dir) {
            self.live.insert(path.to_path_buf());
        }
    }

    /// Returns the path to paint for `source` on a monitor of the given
    /// orientation. The original path comes back unchanged when orientations
    /// already agree, when rotation is configured off, or when the transform
    /// fails — a failed rotation never blocks painting.
    pub fn prepare(
        &mut self,
        monitor_orientation: Orientation,
        rotation: MismatchRotation,
        source: &Path,
    ) -> PathBuf {
        let image_orientation = match effective_orientation(source) {
            Ok(orientation) => orientation,
            Err(e) => {
                warn!(
                    "[TRANSFORM] Could not read {}; painting as-is: {}",
                    source.display(),
                    e
                );
                return source.to_path_buf();
            }
        };

        if image_orientation == monitor_orientation {
            return source.to_path_buf();
        }

        let Some(direction) = Direction::from_policy(rotation) else {
            info!(
                "[TRANSFORM] {} is {} on a {} monitor; rotation disabled, painting as-is",
                source.display(),
                image_orientation,
                monitor_orientation
            );
            return source.to_path_buf();
        };

        match self.rotate_and_save(source, direction) {
            Ok(generated) => {
                self.live.insert(generated.clone());
                generated
            }
            Err(e) => {
                warn!(
                    "[TRANSFORM] Rotation of {} failed; painting original: {}",
                    source.display(),
                    e
                );
                source.to_path_buf()
            }
        }
    }

    fn rotate_and_save(
        &mut self,
        source: &Path,
        direction: Direction,
    ) -> Result<PathBuf, TransformError> {
        let output = self.generated_path(source, direction);
        let key = (source.to_path_buf(), direction);

        if let Some(cached) = self.cache.get(&key) {
            if cached.exists() {
                return Ok(cached.clone());
            }
        }

        // A file with the right name is reusable output from a prior tick
        if output.exists() {
            self.cache.insert(key, output.clone());
            return Ok(output);
        }

        fs::create_dir_all(&self.generated_dir).map_err(TransformError::Io)?;

        let reader = ImageReader::open(source)
            .map_err(TransformError::Io)?
            .with_guessed_format()
            .map_err(TransformError::Io)?;
        let mut decoder = reader.into_decoder().map_err(TransformError::Image)?;

        // Bake any EXIF-implied rotation into pixels before rotating, so
        // the 90° turn is applied to what the user actually sees
        let exif = decoder.orientation().unwrap_or(ExifOrientation::NoTransforms);
        let mut img = DynamicImage::from_decoder(decoder).map_err(TransformError::Image)?;
        img.apply_orientation(exif);

        let rotated = match direction {
            Direction::Left => img.rotate270(),
            Direction::Right => img.rotate90(),
        };
        rotated.save(&output).map_err(TransformError::Image)?;

        self.cache.insert(key, output.clone());
        Ok(output)
    }

    /// Deletes every generated file not marked live in the most recent tick.
    /// Deletion errors are logged and skipped; cleanup never blocks a tick.
    pub fn cleanup(&mut self) {
        let Ok(entries) = fs::read_dir(&self.generated_dir) else {
            return;
        };

        let mut deleted = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || self.live.contains(&path) {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(
                        "[TRANSFORM] Could not delete stale file {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        if deleted > 0 {
            info!("[TRANSFORM] Cleaned up {deleted} stale rotated image(s)");
        }
    }
}
