//! Tile identity and the deterministic file layout that pairs images,
//! masks and tile vectors.

use crate::error::{Result, TilingError};
use crate::grid::GridCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

pub const RASTER_EXT: &str = "tif";
pub const VECTOR_EXT: &str = "gpkg";

/// Stable identity of a tile, ordered row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    pub row: usize,
    pub col: usize,
}

impl TileKey {
    pub fn of(cell: &GridCell) -> Self {
        Self {
            row: cell.row,
            col: cell.col,
        }
    }

    /// Parse a `l<row>c<col>` sub name.
    pub fn parse(sub_name: &str) -> Option<Self> {
        let rest = sub_name.strip_prefix('l')?;
        let (row, col) = rest.split_once('c')?;
        Some(Self {
            row: row.parse().ok()?,
            col: col.parse().ok()?,
        })
    }

    /// Key at the end of a file stem, whatever prefix precedes it
    /// (`pred_img_l3c7.tif` -> `l3c7`).
    pub fn from_path_suffix(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        stem.rmatch_indices('l')
            .find_map(|(i, _)| Self::parse(&stem[i..]))
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}c{}", self.row, self.col)
    }
}

/// Directory and file prefix of one family of tile files.
#[derive(Debug, Clone, PartialEq)]
pub struct TileFamily {
    pub dir: PathBuf,
    pub prefix: String,
    pub ext: &'static str,
}

impl TileFamily {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, ext: &'static str) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            ext,
        }
    }

    pub fn path(&self, key: TileKey) -> PathBuf {
        self.dir.join(format!("{}{}.{}", self.prefix, key, self.ext))
    }

    /// Recover the tile key from a path of this family.
    pub fn key_of(&self, path: &Path) -> Option<TileKey> {
        if path.extension()?.to_str()? != self.ext {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        TileKey::parse(stem.strip_prefix(self.prefix.as_str())?)
    }
}

/// File layout of a run: where image, mask and vector tiles live.
#[derive(Debug, Clone, PartialEq)]
pub struct TileNaming {
    pub images: TileFamily,
    pub masks: TileFamily,
    pub vectors: TileFamily,
}

impl TileNaming {
    /// Standard layout under `out_dir`: `img/`, `mask/`, `vec/`.
    pub fn under(out_dir: &Path, image_prefix: &str, mask_prefix: &str, vector_prefix: &str) -> Self {
        Self {
            images: TileFamily::new(out_dir.join("img"), image_prefix, RASTER_EXT),
            masks: TileFamily::new(out_dir.join("mask"), mask_prefix, RASTER_EXT),
            vectors: TileFamily::new(out_dir.join("vec"), vector_prefix, VECTOR_EXT),
        }
    }

    pub fn mask_for_image(&self, image: &Path) -> Option<PathBuf> {
        self.images.key_of(image).map(|k| self.masks.path(k))
    }

    pub fn vector_for_image(&self, image: &Path) -> Option<PathBuf> {
        self.images.key_of(image).map(|k| self.vectors.path(k))
    }
}

/// Per-cell working unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub key: TileKey,
    pub vector: Option<PathBuf>,
    pub image: PathBuf,
    pub mask: Option<PathBuf>,
    pub accepted: bool,
}

/// Result of a per-tile stage: produced paths ordered by tile identity and
/// the failures of individual tiles, which never abort the batch.
#[derive(Debug, Default)]
pub struct TileOutcome {
    pub paths: Vec<PathBuf>,
    pub errors: Vec<TilingError>,
}

impl TileOutcome {
    /// Gather per-tile results, keeping successes sorted by key.
    pub fn collect(results: Vec<(TileKey, Result<PathBuf>)>) -> Self {
        let mut ok: Vec<(TileKey, PathBuf)> = Vec::new();
        let mut errors = Vec::new();
        for (key, result) in results {
            match result {
                Ok(path) => ok.push((key, path)),
                Err(e) => errors.push(e),
            }
        }
        ok.sort_by_key(|(k, _)| *k);
        Self {
            paths: ok.into_iter().map(|(_, p)| p).collect(),
            errors,
        }
    }
}

/// Keep only paths of `family` whose key is in `keys`, ordered by key.
/// Paths that do not belong to the family are dropped.
pub fn retain_by_key(paths: &[PathBuf], family: &TileFamily, keys: &HashSet<TileKey>) -> Vec<PathBuf> {
    let by_key: BTreeMap<TileKey, &PathBuf> = paths
        .iter()
        .filter_map(|p| family.key_of(p).map(|k| (k, p)))
        .filter(|(k, _)| keys.contains(k))
        .collect();
    by_key.into_values().cloned().collect()
}

/// Sort paths by the tile identity at the end of their file stem; paths
/// without one go last in their original order.
pub fn sort_by_tile(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut keyed: Vec<(Option<TileKey>, usize, &PathBuf)> = paths
        .iter()
        .enumerate()
        .map(|(i, p)| (TileKey::from_path_suffix(p), i, p))
        .collect();
    keyed.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
    keyed.into_iter().map(|(_, _, p)| p.clone()).collect()
}

/// Keys of the tiles that have every required file: an image, a mask when
/// `masks` is given and a vector when `vectors` is given.
pub fn complete_keys(
    images: &[PathBuf],
    masks: Option<&[PathBuf]>,
    vectors: Option<&[PathBuf]>,
    naming: &TileNaming,
) -> HashSet<TileKey> {
    let mut keys: HashSet<TileKey> = images.iter().filter_map(|p| naming.images.key_of(p)).collect();
    if let Some(masks) = masks {
        let mask_keys: HashSet<TileKey> = masks.iter().filter_map(|p| naming.masks.key_of(p)).collect();
        keys.retain(|k| mask_keys.contains(k));
    }
    if let Some(vectors) = vectors {
        let vector_keys: HashSet<TileKey> = vectors
            .iter()
            .filter_map(|p| naming.vectors.key_of(p))
            .collect();
        keys.retain(|k| vector_keys.contains(k));
    }
    keys
}

/// Pair image, mask and vector paths into records by identity. Kept images
/// get accepted records with their mask and vector attached when present;
/// `discarded` images get rejected records carrying only the image path.
pub fn pair_records(
    images: &[PathBuf],
    masks: &[PathBuf],
    vectors: &[PathBuf],
    discarded: &[PathBuf],
    naming: &TileNaming,
) -> Vec<TileRecord> {
    let mask_keys: HashSet<TileKey> = masks.iter().filter_map(|p| naming.masks.key_of(p)).collect();
    let vector_keys: HashSet<TileKey> = vectors
        .iter()
        .filter_map(|p| naming.vectors.key_of(p))
        .collect();

    let accepted = images.iter().filter_map(|image| {
        let key = naming.images.key_of(image)?;
        Some(TileRecord {
            key,
            vector: vector_keys.contains(&key).then(|| naming.vectors.path(key)),
            image: image.clone(),
            mask: mask_keys.contains(&key).then(|| naming.masks.path(key)),
            accepted: true,
        })
    });
    let rejected = discarded.iter().filter_map(|image| {
        let key = naming.images.key_of(image)?;
        Some(TileRecord {
            key,
            vector: None,
            image: image.clone(),
            mask: None,
            accepted: false,
        })
    });

    let mut records: Vec<TileRecord> = accepted.chain(rejected).collect();
    records.sort_by_key(|r| r.key);
    records
}
