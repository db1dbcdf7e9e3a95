// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Heatmap tests.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(
    missing_debug_implementations,
    unreachable_pub,
    missing_docs,
    clippy::missing_assert_message,
    clippy::print_stderr,
    clippy::allow_attributes_without_reason
)]

use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use heatmap::geometry::LatLng;
use heatmap::kernels::{Defines, KernelSource};
use heatmap::util::ComputeContext;
use heatmap::{
    ComputeBackend, CpuBackend, Dataset, GeoPoint, TILE_SIZE, TileRaster, TileTransform,
    WgpuBackend,
};

mod compare;

pub use compare::{GpuCpuComparison, compare_gpu_cpu};

/// Wraps a backend and records what the renderer asked of it.
pub struct CountingBackend<B> {
    inner: B,
    pub compiles: usize,
    pub dispatches: usize,
    pub dispatched_points: usize,
    pub reserved: Option<usize>,
}

impl<B: ComputeBackend> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            compiles: 0,
            dispatches: 0,
            dispatched_points: 0,
            reserved: None,
        }
    }
}

impl CountingBackend<CpuBackend> {
    pub fn cpu() -> Self {
        Self::new(CpuBackend::new())
    }
}

impl<B: ComputeBackend> ComputeBackend for CountingBackend<B> {
    type Program = B::Program;

    fn name(&self) -> &'static str {
        "counting"
    }

    fn compile(&mut self, source: &KernelSource) -> heatmap::Result<B::Program> {
        self.compiles += 1;
        self.inner.compile(source)
    }

    fn reserve(&mut self, capacity: usize) -> heatmap::Result<()> {
        self.reserved = Some(capacity);
        self.inner.reserve(capacity)
    }

    fn dispatch(
        &mut self,
        program: &B::Program,
        transform: &TileTransform,
        points: &[[f32; 2]],
        values: &[f32],
        raster: &mut TileRaster,
    ) -> heatmap::Result<()> {
        self.dispatches += 1;
        self.dispatched_points += points.len();
        self.inner
            .dispatch(program, transform, points, values, raster)
    }
}

/// Loads a bundled kernel with `defines`.
pub fn kernel(name: &str, defines: &[&str]) -> Result<KernelSource> {
    Ok(KernelSource::load(name, &Defines::parse(defines)?)?)
}

/// A dataset with one point per `(lat, lng, value)`.
pub fn dataset(points: &[(f64, f64, f32)]) -> Dataset {
    Dataset::from_points(
        points
            .iter()
            .map(|&(lat, lng, value)| GeoPoint::new(LatLng::new(lat, lng), value))
            .collect(),
    )
}

/// `count` points on a spiral around `center`, reaching `radius` degrees,
/// with values rising from 0 to 1.
pub fn spiral(center: LatLng, radius: f64, count: usize) -> Dataset {
    let points = (0..count)
        .map(|i| {
            let t = i as f64 / count.max(1) as f64;
            let angle = t * 6.0 * std::f64::consts::PI;
            let location = LatLng::new(
                center.lat + radius * t * angle.sin(),
                center.lng + radius * t * angle.cos(),
            );
            GeoPoint::new(location, t as f32)
        })
        .collect();
    Dataset::from_points(points)
}

/// A GPU backend on the default adapter, `None` when this machine has none.
pub fn gpu_backend() -> Option<WgpuBackend> {
    let context = ComputeContext::new();
    match pollster::block_on(context.device(None)) {
        Ok(handle) => Some(WgpuBackend::new(handle)),
        Err(e) => {
            eprintln!("Skipping GPU test: {e}");
            None
        }
    }
}

/// A tile as read back from disk.
pub struct DecodedTile {
    pub pixels: Vec<u8>,
    pub palette: Vec<u8>,
    pub alpha: Vec<u8>,
}

impl DecodedTile {
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * TILE_SIZE + x) as usize]
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&p| p == 0)
    }
}

pub fn decode_tile(path: &Path) -> Result<DecodedTile> {
    let bytes = fs::read(path)?;
    let decoder = png::Decoder::new(bytes.as_slice());
    let mut reader = decoder.read_info()?;
    let info = reader.info();
    if info.color_type != png::ColorType::Indexed || info.bit_depth != png::BitDepth::Eight {
        bail!(
            "{} is {:?}/{:?}, expected 8-bit indexed",
            path.display(),
            info.color_type,
            info.bit_depth
        );
    }
    if (info.width, info.height) != (TILE_SIZE, TILE_SIZE) {
        bail!("{} is {}x{}", path.display(), info.width, info.height);
    }
    let palette = info.palette.as_deref().unwrap_or_default().to_vec();
    let alpha = info.trns.as_deref().unwrap_or_default().to_vec();
    let mut pixels = vec![0; reader.output_buffer_size()];
    reader.next_frame(&mut pixels)?;
    Ok(DecodedTile {
        pixels,
        palette,
        alpha,
    })
}

/// Every file below `root`, relative to it, with its contents. Sorted.
pub fn read_tree(root: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else {
                let name = path.strip_prefix(root)?.to_string_lossy().into_owned();
                out.push((name, fs::read(&path)?));
            }
        }
        Ok(())
    }
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}
