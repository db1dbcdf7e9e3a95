// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use heatmap::kernels::KernelSource;
use heatmap::{
    ColorMap, ComputeBackend, CpuBackend, Dataset, PointSelector, Projection, Selection,
    TileIndex, TileRaster, TileTransform, WgpuBackend, encode_png,
};

fn comparison_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("comparisons")
}

#[must_use]
/// One tile rendered by both backends.
pub struct GpuCpuComparison {
    pub name: String,
    pub cpu: TileRaster,
    pub gpu: TileRaster,
}

impl GpuCpuComparison {
    /// Largest difference in palette index between the two rasters.
    pub fn max_difference(&self) -> u8 {
        self.cpu
            .pixels()
            .iter()
            .zip(self.gpu.pixels())
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap_or(0)
    }

    /// Fraction of pixels further apart than `steps`.
    pub fn fraction_beyond(&self, steps: u8) -> f64 {
        let beyond = self
            .cpu
            .pixels()
            .iter()
            .zip(self.gpu.pixels())
            .filter(|(a, b)| a.abs_diff(**b) > steps)
            .count();
        beyond as f64 / self.cpu.pixels().len() as f64
    }

    /// Passes when at most `fraction` of the pixels differ by more than one
    /// palette step. On failure both rasters are written next to the crate.
    pub fn assert_within_one_step(&self, fraction: f64) -> Result<()> {
        let beyond = self.fraction_beyond(1);
        if beyond > fraction {
            self.write_failure()?;
            bail!(
                "{}: {:.4}% of pixels differ by more than one step (max {})",
                self.name,
                beyond * 100.0,
                self.max_difference()
            );
        }
        Ok(())
    }

    fn write_failure(&self) -> Result<()> {
        let dir = comparison_dir();
        std::fs::create_dir_all(&dir)?;
        let colormap = ColorMap::grayscale();
        for (suffix, raster) in [("cpu.png", &self.cpu), ("gpu.png", &self.gpu)] {
            let path = dir.join(&self.name).with_extension(suffix);
            std::fs::write(&path, encode_png(raster, &colormap)?)?;
            eprintln!("Wrote {} result to {}", self.name, path.display());
        }
        Ok(())
    }
}

/// Renders tile `index` with `source` on both backends.
pub fn compare_gpu_cpu(
    name: &str,
    gpu: &mut WgpuBackend,
    source: &KernelSource,
    dataset: &Dataset,
    projection: &Projection,
    index: TileIndex,
) -> Result<GpuCpuComparison> {
    let transform = TileTransform::derive(index, projection)?;
    let mut selector = PointSelector::new(dataset, projection, f64::INFINITY)?;
    let selection = selector.select(index, projection)?;
    let gpu = render_tile(gpu, source, &transform, selection)?;
    let cpu = render_tile(&mut CpuBackend::new(), source, &transform, selection)?;
    Ok(GpuCpuComparison {
        name: name.to_owned(),
        cpu,
        gpu,
    })
}

fn render_tile<B: ComputeBackend>(
    backend: &mut B,
    source: &KernelSource,
    transform: &TileTransform,
    selection: Selection<'_>,
) -> Result<TileRaster> {
    let program = backend.compile(source)?;
    backend.reserve(selection.len())?;
    let mut raster = TileRaster::new();
    backend.dispatch(
        &program,
        transform,
        selection.points,
        selection.values,
        &mut raster,
    )?;
    Ok(raster)
}
