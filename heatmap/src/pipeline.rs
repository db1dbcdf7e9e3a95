// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::{Path, PathBuf};

use heatmap_kernels::KernelSource;

use crate::geometry::{GeoBounds, TileRange};
use crate::selector::check_prefilter;
use crate::{
    ColorMap, ComputeBackend, Dataset, PointSelector, Projection, Result, TileRaster, TileWriter,
    TransformCache,
};

/// Parameters of one render.
#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub zoom: u8,
    pub bounds: GeoBounds,
    /// Root of the tile pyramid.
    pub outdir: PathBuf,
    /// Root of the transform cache, `outdir` when `None`.
    pub cache_dir: Option<PathBuf>,
    pub colormap: ColorMap,
    /// Meters around a tile whose points still influence it.
    pub prefilter: f64,
}

impl RenderOptions {
    pub fn new(zoom: u8, bounds: GeoBounds, outdir: impl Into<PathBuf>) -> Self {
        Self {
            zoom,
            bounds,
            outdir: outdir.into(),
            cache_dir: None,
            colormap: ColorMap::heat(),
            prefilter: f64::INFINITY,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache_dir.as_deref().unwrap_or(&self.outdir)
    }

    /// Checks the zoom and prefilter, returning the tiles to render.
    pub fn validate(&self) -> Result<TileRange> {
        check_prefilter(self.prefilter)?;
        TileRange::covering(self.bounds, self.zoom)
    }
}

/// What a render did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSummary {
    pub range: TileRange,
    /// Tiles that were dispatched and encoded.
    pub rendered: usize,
    /// Tiles linked to the blank tile.
    pub blank: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

/// Renders pyramid levels with one compiled kernel.
pub struct TileRenderer<B: ComputeBackend> {
    backend: B,
    program: B::Program,
    kernel_name: String,
}

impl<B: ComputeBackend> TileRenderer<B> {
    pub fn new(mut backend: B, source: &KernelSource) -> Result<Self> {
        let program = backend.compile(source)?;
        log::info!(
            "Compiled kernel `{}` for the {} backend",
            source.name,
            backend.name()
        );
        Ok(Self {
            backend,
            program,
            kernel_name: source.name.clone(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Renders every tile of `options.zoom` intersecting `options.bounds`.
    ///
    /// Configuration and compute errors abort the run. Cache and tile I/O
    /// failures are logged and skipped.
    pub fn render(
        &mut self,
        dataset: &Dataset,
        projection: &Projection,
        options: &RenderOptions,
    ) -> Result<RenderSummary> {
        let range = options.validate()?;
        let mut selector = PointSelector::new(dataset, projection, options.prefilter)?;
        self.backend.reserve(selector.capacity())?;
        log::info!(
            "Rendering {} tiles ({}x{}) at zoom {} from {} points with `{}`",
            range.len(),
            range.width(),
            range.height(),
            range.zoom,
            dataset.len(),
            self.kernel_name
        );

        let writer = TileWriter::new(&options.outdir, &options.colormap);
        writer.write_blank()?;
        let mut cache = TransformCache::open(options.cache_dir(), projection);
        let mut raster = TileRaster::new();
        let (mut rendered, mut blank) = (0, 0);

        for index in range.iter() {
            let transform = cache.get(index, projection)?;
            let selection = selector.select(index, projection)?;
            if selection.is_empty() {
                log::debug!("Tile {index}: no points, linking blank");
                writer.link_blank(index);
                blank += 1;
                continue;
            }
            log::debug!("Tile {index}: dispatching {} points", selection.len());
            raster.clear();
            self.backend.dispatch(
                &self.program,
                &transform,
                selection.points,
                selection.values,
                &mut raster,
            )?;
            writer.write_tile(index, &raster)?;
            rendered += 1;
        }

        cache.seal();
        let (cache_hits, cache_misses) = cache.stats();
        log::info!(
            "Done: {rendered} rendered, {blank} blank, transform cache {cache_hits} hits / {cache_misses} misses"
        );
        Ok(RenderSummary {
            range,
            rendered,
            blank,
            cache_hits,
            cache_misses,
        })
    }
}
