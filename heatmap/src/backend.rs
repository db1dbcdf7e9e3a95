// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use heatmap_kernels::KernelSource;

use crate::{Error, Result, TILE_SIZE, TileTransform};

/// Number of pixels in a tile.
pub(crate) const TILE_PIXELS: usize = TILE_SIZE as usize * TILE_SIZE as usize;

/// One tile of palette indices, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct TileRaster {
    pixels: Box<[u8]>,
}

impl TileRaster {
    /// A zeroed raster, all background.
    pub fn new() -> Self {
        Self {
            pixels: vec![0; TILE_PIXELS].into_boxed_slice(),
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * TILE_SIZE + x) as usize]
    }

    /// Whether every pixel is background.
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&p| p == 0)
    }
}

impl Default for TileRaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TileRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.pixels.iter().filter(|&&p| p != 0).count();
        f.debug_struct("TileRaster")
            .field("size", &TILE_SIZE)
            .field("lit_pixels", &lit)
            .finish()
    }
}

/// Something that can run a kernel over one tile.
///
/// Backends keep a pool of buffers sized by [`ComputeBackend::reserve`] and
/// reuse it for every dispatch.
pub trait ComputeBackend {
    /// A compiled kernel.
    type Program;

    /// Short name for logging.
    fn name(&self) -> &'static str;

    fn compile(&mut self, source: &KernelSource) -> Result<Self::Program>;

    /// Sizes the dispatch pool for selections of up to `capacity` points.
    fn reserve(&mut self, capacity: usize) -> Result<()>;

    /// Runs `program` for one tile, overwriting every pixel of `raster`.
    ///
    /// `points` and `values` are co-indexed and hold the tile's selection.
    fn dispatch(
        &mut self,
        program: &Self::Program,
        transform: &TileTransform,
        points: &[[f32; 2]],
        values: &[f32],
        raster: &mut TileRaster,
    ) -> Result<()>;
}

/// Kernels write one `u32` word per pixel, tiles store one byte.
pub(crate) fn narrow(word: u32) -> u8 {
    word.min(u32::from(u8::MAX)) as u8
}

/// Checks a selection against the pool size set by `reserve`.
pub(crate) fn check_capacity(requested: usize, capacity: Option<usize>) -> Result<()> {
    let capacity = capacity.ok_or(Error::PoolNotReserved)?;
    if requested > capacity {
        return Err(Error::PoolExhausted {
            requested,
            capacity,
        });
    }
    Ok(())
}
