// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::{ColorMap, Result, TILE_SIZE, TileIndex, TileRaster};

const BLANK_TILE: &str = "blank.png";

/// Encodes `raster` as an 8-bit indexed PNG using `colormap` as its palette.
pub fn encode_png(raster: &TileRaster, colormap: &ColorMap) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = png::Encoder::new(&mut bytes, TILE_SIZE, TILE_SIZE);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(colormap.palette());
    encoder.set_trns(colormap.alpha());
    let mut writer = encoder.write_header()?;
    writer.write_image_data(raster.pixels())?;
    writer.finish()?;
    Ok(bytes)
}

/// Writes `bytes` to a temporary sibling of `path` and renames it into place.
///
/// Readers never see a partial file, and an existing hard link at `path` is
/// replaced rather than written through.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Lays tiles out as `<root>/<zoom>/<x>/<y>.png`.
#[derive(Debug)]
pub struct TileWriter<'a> {
    root: PathBuf,
    colormap: &'a ColorMap,
}

impl<'a> TileWriter<'a> {
    pub fn new(root: impl Into<PathBuf>, colormap: &'a ColorMap) -> Self {
        Self {
            root: root.into(),
            colormap,
        }
    }

    pub fn tile_path(&self, index: TileIndex) -> PathBuf {
        self.root
            .join(index.zoom.to_string())
            .join(index.x.to_string())
            .join(format!("{}.png", index.y))
    }

    pub fn blank_path(&self) -> PathBuf {
        self.root.join(BLANK_TILE)
    }

    /// Writes the shared blank tile that empty tiles link to.
    pub fn write_blank(&self) -> Result<()> {
        let bytes = encode_png(&TileRaster::new(), self.colormap)?;
        let path = self.blank_path();
        if let Err(e) = write_atomically(&path, &bytes) {
            log::warn!("Couldn't write {}: {e}", path.display());
        }
        Ok(())
    }

    /// Encodes and writes one rendered tile.
    ///
    /// Encoding failures are errors, failures to write are logged.
    pub fn write_tile(&self, index: TileIndex, raster: &TileRaster) -> Result<()> {
        let bytes = encode_png(raster, self.colormap)?;
        let path = self.tile_path(index);
        if let Err(e) = write_atomically(&path, &bytes) {
            log::warn!("Couldn't write tile {index} to {}: {e}", path.display());
        }
        Ok(())
    }

    /// Points tile `index` at the blank tile, copying it where hard links fail.
    pub fn link_blank(&self, index: TileIndex) {
        let path = self.tile_path(index);
        if let Err(e) = self.try_link_blank(&path) {
            log::warn!("Couldn't link blank tile {index} to {}: {e}", path.display());
        }
    }

    fn try_link_blank(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let blank = self.blank_path();
        if let Err(e) = fs::hard_link(&blank, path) {
            log::debug!("Hard link to {} failed ({e}), copying", blank.display());
            fs::copy(&blank, path)?;
        }
        Ok(())
    }
}
