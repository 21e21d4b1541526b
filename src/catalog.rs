use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use image::{metadata::Orientation as ExifOrientation, ImageDecoder, ImageReader};
use rand::seq::SliceRandom;
use walkdir::WalkDir;

use crate::config::Orientation;
use crate::transform::GENERATED_DIR;
use crate::warn;

/// Extensions collected by the scan, compared case-insensitively. The scan
/// pass never opens file contents, so an unsupported or corrupt file can
/// only fail later, during classification or transform.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff"];

#[derive(Debug)]
pub enum CatalogError {
    Open(std::io::Error),
    Decode(image::ImageError),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(e) => write!(f, "Failed to open image: {e}"),
            Self::Decode(e) => write!(f, "Failed to decode image: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// The classified candidate pools for one scan generation. Rebuilt wholesale
/// on every scan, never patched in place. Every path in `portrait` and
/// `landscape` also appears in `all`; the two orientation pools are disjoint.
#[derive(Debug, Clone, Default)]
pub struct ImagePool {
    pub all: Vec<PathBuf>,
    pub portrait: Vec<PathBuf>,
    pub landscape: Vec<PathBuf>,
}

impl ImagePool {
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn for_orientation(&self, orientation: Orientation) -> &[PathBuf] {
        match orientation {
            Orientation::Portrait => &self.portrait,
            Orientation::Landscape => &self.landscape,
        }
    }
}

/// Reads the image's dimensions and EXIF orientation tag without decoding
/// pixel data. A 90°/270° EXIF rotation swaps the effective axes.
pub fn effective_orientation(path: &Path) -> Result<Orientation, CatalogError> {
    let reader = ImageReader::open(path)
        .map_err(CatalogError::Open)?
        .with_guessed_format()
        .map_err(CatalogError::Open)?;
    let mut decoder = reader.into_decoder().map_err(CatalogError::Decode)?;

    let (mut width, mut height) = decoder.dimensions();
    if let Ok(exif) = decoder.orientation() {
        if exif_swaps_axes(exif) {
            std::mem::swap(&mut width, &mut height);
        }
    }

    Ok(Orientation::of_dimensions(width, height))
}

fn exif_swaps_axes(orientation: ExifOrientation) -> bool {
    matches!(
        orientation,
        ExifOrientation::Rotate90
            | ExifOrientation::Rotate270
            | ExifOrientation::Rotate90FlipH
            | ExifOrientation::Rotate270FlipH
    )
}

/// Walks `root` recursively and builds the classified pools. The hidden
/// directory of rotated copies is skipped: generated files are tick-scoped
/// output, and letting them into the pool would make them candidates for
/// assignment and later deletion.
///
/// Pass 1 collects paths by extension only. Pass 2 runs only when orientation
/// matching is enabled: files that fail to open or decode are logged and left
/// out of the orientation pools, but stay in `all`. All three pools are then
/// shuffled once, establishing the traversal order for this scan generation.
pub fn scan(
    root: &Path,
    orientation_matching_enabled: bool,
    mut progress: Option<&mut dyn FnMut(usize, usize)>,
) -> ImagePool {
    let mut pool = ImagePool::default();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != OsStr::new(GENERATED_DIR))
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() && is_supported_image(entry.path()) {
            pool.all.push(entry.path().to_path_buf());
        }
    }

    let total = pool.all.len();
    if orientation_matching_enabled {
        for (current, path) in pool.all.clone().into_iter().enumerate() {
            if let Some(callback) = progress.as_deref_mut() {
                callback(current, total);
            }

            match effective_orientation(&path) {
                Ok(Orientation::Portrait) => pool.portrait.push(path),
                Ok(Orientation::Landscape) => pool.landscape.push(path),
                Err(e) => {
                    warn!(
                        "[CATALOG] Excluding {} from orientation pools: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
    }

    let mut rng = rand::rng();
    pool.all.shuffle(&mut rng);
    pool.portrait.shuffle(&mut rng);
    pool.landscape.shuffle(&mut rng);

    pool
}
