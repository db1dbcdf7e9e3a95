// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use heatmap_kernels::KernelParams;
use peniko::kurbo::Vec2;

use crate::geometry::TileIndex;
use crate::output::write_atomically;
use crate::{Projection, Result, TILE_SIZE};

/// Pixel to planar meter mapping of one tile.
///
/// Pixel `p` of the tile lies at `origin.xy + p.x * basis.xy + p.y * basis.zw`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
#[repr(C)]
pub struct TileTransform {
    /// `xy` is the tile's top-left corner in meters, `zw` is zero.
    pub origin: [f32; 4],
    /// `xy` is one pixel step along +x, `zw` one pixel step along +y.
    pub basis: [f32; 4],
}

const RECORD_LEN: usize = size_of::<TileTransform>();
const FINGERPRINT_FILE: &str = "transforms.projection";

impl TileTransform {
    /// Projects the tile's top-left, top-right and bottom-left corners.
    pub fn derive(index: TileIndex, projection: &Projection) -> Result<Self> {
        let [lt, rt, _, lb] = index.corners();
        let lt = projection.tile_to_meters(lt, index.zoom)?;
        let rt = projection.tile_to_meters(rt, index.zoom)?;
        let lb = projection.tile_to_meters(lb, index.zoom)?;
        let size = f64::from(TILE_SIZE);
        let dx: Vec2 = (rt - lt) / size;
        let dy: Vec2 = (lb - lt) / size;
        Ok(Self {
            origin: [lt.x as f32, lt.y as f32, 0.0, 0.0],
            basis: [dx.x as f32, dx.y as f32, dy.x as f32, dy.y as f32],
        })
    }

    /// The uniform block handed to a kernel dispatching `point_count` points.
    pub fn to_params(&self, point_count: u32) -> KernelParams {
        KernelParams::new(self.origin, self.basis, point_count)
    }

    fn is_finite(&self) -> bool {
        self.origin.iter().chain(&self.basis).all(|v| v.is_finite())
    }
}

/// On-disk cache of [`TileTransform`]s, one 32 byte file per tile.
///
/// The cache is only trusted when `transforms.projection` in its root matches
/// the current projection. Otherwise the fingerprint and every `.map` record
/// under the root are removed on open, lookups re-derive, and
/// [`TransformCache::seal`] records the projection once the run is done.
#[derive(Debug)]
pub struct TransformCache {
    root: PathBuf,
    fingerprint: String,
    trusted: bool,
    hits: usize,
    misses: usize,
}

impl TransformCache {
    pub fn open(root: impl Into<PathBuf>, projection: &Projection) -> Self {
        let root = root.into();
        let fingerprint = projection.fingerprint().to_owned();
        let trusted = match fs::read_to_string(root.join(FINGERPRINT_FILE)) {
            Ok(stored) if stored.trim() == fingerprint => true,
            Ok(stored) => {
                log::info!(
                    "Transform cache at {} was built for `{}`, rebuilding",
                    root.display(),
                    stored.trim()
                );
                false
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                log::warn!("Couldn't read the transform cache fingerprint: {e}");
                false
            }
        };
        if !trusted {
            Self::purge(&root);
        }
        Self {
            root,
            fingerprint,
            trusted,
            hits: 0,
            misses: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether existing entries are read back.
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    pub fn path(&self, index: TileIndex) -> PathBuf {
        self.root
            .join(index.zoom.to_string())
            .join(index.x.to_string())
            .join(format!("{}.map", index.y))
    }

    /// The transform for `index`, from disk when possible.
    ///
    /// Only projection failures are errors, cache I/O problems are logged.
    pub fn get(&mut self, index: TileIndex, projection: &Projection) -> Result<TileTransform> {
        let path = self.path(index);
        if self.trusted
            && let Some(transform) = Self::read(&path)
        {
            self.hits += 1;
            return Ok(transform);
        }
        self.misses += 1;
        let transform = TileTransform::derive(index, projection)?;
        if let Err(e) = write_atomically(&path, bytemuck::bytes_of(&transform)) {
            log::warn!("Couldn't write transform cache {}: {e}", path.display());
        }
        Ok(transform)
    }

    fn read(path: &Path) -> Option<TileTransform> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Couldn't read transform cache {}: {e}", path.display());
                return None;
            }
        };
        if bytes.len() != RECORD_LEN {
            log::warn!(
                "Transform cache {} holds {} bytes instead of {RECORD_LEN}, re-deriving",
                path.display(),
                bytes.len()
            );
            return None;
        }
        let transform: TileTransform = bytemuck::pod_read_unaligned(&bytes);
        if !transform.is_finite() {
            log::warn!("Transform cache {} is corrupt, re-deriving", path.display());
            return None;
        }
        Some(transform)
    }

    /// Removes the fingerprint and every record under `root`, leaving other
    /// files alone since the root is usually the tile directory.
    fn purge(root: &Path) {
        let fingerprint = root.join(FINGERPRINT_FILE);
        match fs::remove_file(&fingerprint) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Couldn't remove {}: {e}", fingerprint.display()),
        }
        let mut pending = vec![root.to_path_buf()];
        let mut removed = 0_usize;
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    log::warn!("Couldn't list transform cache {}: {e}", dir.display());
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                match entry.file_type() {
                    Ok(kind) if kind.is_dir() => pending.push(path),
                    Ok(kind) if kind.is_file() && path.extension().is_some_and(|e| e == "map") => {
                        match fs::remove_file(&path) {
                            Ok(()) => removed += 1,
                            Err(e) => log::warn!("Couldn't remove {}: {e}", path.display()),
                        }
                    }
                    _ => {}
                }
            }
        }
        if removed > 0 {
            log::info!(
                "Removed {removed} stale transform records from {}",
                root.display()
            );
        }
    }

    /// Marks the cache as built for the current projection.
    pub fn seal(&mut self) {
        if self.trusted {
            return;
        }
        let path = self.root.join(FINGERPRINT_FILE);
        match write_atomically(&path, self.fingerprint.as_bytes()) {
            Ok(()) => self.trusted = true,
            Err(e) => log::warn!("Couldn't write {}: {e}", path.display()),
        }
    }

    /// Lookups served from disk and lookups derived, in that order.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{RECORD_LEN, TileTransform, TransformCache};
    use crate::geometry::TileIndex;
    use crate::Projection;

    fn mercator() -> Projection {
        Projection::new("EPSG:3857").unwrap()
    }

    #[test]
    fn record_is_two_vec4s() {
        assert_eq!(RECORD_LEN, 32);
    }

    #[test]
    fn derive_spans_the_tile() {
        let projection = mercator();
        // The south-east quarter of the world at zoom 1.
        let t = TileTransform::derive(TileIndex::new(1, 1, 1), &projection).unwrap();
        assert_eq!(&t.origin[2..], &[0.0, 0.0]);
        assert!(t.origin[0].abs() < 1e-3 && t.origin[1].abs() < 1e-3);
        let half_world = 20_037_508.34_f32;
        assert!((t.basis[0] * 256.0 - half_world).abs() < 10.0);
        assert!(t.basis[1].abs() < 1e-3);
        assert!(t.basis[2].abs() < 1e-3);
        // Rows go south, northings shrink.
        assert!(t.basis[3] < 0.0);
    }

    #[test]
    fn second_lookup_hits_once_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let projection = mercator();
        let index = TileIndex::new(3, 4, 2);

        let mut cache = TransformCache::open(dir.path(), &projection);
        assert!(!cache.is_trusted());
        let first = cache.get(index, &projection).unwrap();
        assert_eq!(fs::read(cache.path(index)).unwrap().len(), RECORD_LEN);
        cache.seal();

        let mut cache = TransformCache::open(dir.path(), &projection);
        assert!(cache.is_trusted());
        assert_eq!(cache.get(index, &projection).unwrap(), first);
        assert_eq!(cache.stats(), (1, 0));
    }

    #[test]
    fn short_record_is_re_derived() {
        let dir = tempfile::tempdir().unwrap();
        let projection = mercator();
        let index = TileIndex::new(2, 1, 1);
        let mut cache = TransformCache::open(dir.path(), &projection);
        let expected = cache.get(index, &projection).unwrap();
        cache.seal();

        fs::write(cache.path(index), [0_u8; 5]).unwrap();
        let mut cache = TransformCache::open(dir.path(), &projection);
        assert_eq!(cache.get(index, &projection).unwrap(), expected);
        assert_eq!(cache.stats(), (0, 1));
        assert_eq!(fs::read(cache.path(index)).unwrap().len(), RECORD_LEN);
    }

    #[test]
    fn projection_change_invalidates_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = TileIndex::new(4, 8, 5);
        let mercator = mercator();
        let mut cache = TransformCache::open(dir.path(), &mercator);
        let stale = cache.get(index, &mercator).unwrap();
        cache.seal();

        let utm = Projection::new(Projection::DEFAULT).unwrap();
        let mut cache = TransformCache::open(dir.path(), &utm);
        assert!(!cache.is_trusted());
        let fresh = cache.get(index, &utm).unwrap();
        assert_ne!(fresh, stale);
        assert_eq!(fresh, TileTransform::derive(index, &utm).unwrap());
        cache.seal();
        assert!(TransformCache::open(dir.path(), &utm).is_trusted());
    }

    #[test]
    fn unvisited_records_do_not_survive_a_projection_change() {
        let dir = tempfile::tempdir().unwrap();
        let visited_first = TileIndex::new(6, 34, 22);
        let visited_second = TileIndex::new(6, 35, 22);
        let mercator = mercator();
        let utm = Projection::new(Projection::DEFAULT).unwrap();

        let mut cache = TransformCache::open(dir.path(), &mercator);
        cache.get(visited_first, &mercator).unwrap();
        cache.seal();

        let mut cache = TransformCache::open(dir.path(), &utm);
        assert!(!cache.path(visited_first).exists());
        cache.get(visited_second, &utm).unwrap();
        cache.seal();

        let mut cache = TransformCache::open(dir.path(), &utm);
        assert!(cache.is_trusted());
        assert_eq!(
            cache.get(visited_first, &utm).unwrap(),
            TileTransform::derive(visited_first, &utm).unwrap()
        );
        assert_eq!(cache.stats(), (0, 1));
        assert_eq!(
            cache.get(visited_second, &utm).unwrap(),
            TileTransform::derive(visited_second, &utm).unwrap()
        );
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn purge_keeps_tiles_next_to_records() {
        let dir = tempfile::tempdir().unwrap();
        let index = TileIndex::new(3, 4, 2);
        let mut cache = TransformCache::open(dir.path(), &mercator());
        cache.get(index, &mercator()).unwrap();
        let tile = cache.path(index).with_extension("png");
        fs::write(&tile, b"tile").unwrap();
        cache.seal();

        let cache = TransformCache::open(dir.path(), &Projection::new(Projection::DEFAULT).unwrap());
        assert!(!cache.path(index).exists());
        assert!(!dir.path().join("transforms.projection").exists());
        assert_eq!(fs::read(tile).unwrap(), b"tile");
    }
}
