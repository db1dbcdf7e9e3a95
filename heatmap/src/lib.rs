// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Heatmap renders a geospatial point dataset into one zoom level of a
//! slippy-map tile pyramid, using a compute kernel written in WGSL and run
//! through [`wgpu`].
//!
//! Every tile in the requested bounds is 256×256 palette indices written as an
//! indexed PNG to `<outdir>/<zoom>/<x>/<y>.png`. Tiles which no point can
//! influence are hard links to a single shared `blank.png`.
//!
//! For each tile the renderer:
//!
//! 1. looks up the tile's pixel to planar meter transform in an on-disk
//!    [`TransformCache`], deriving it through the [`Projection`] on a miss;
//! 2. asks the [`PointSelector`] for the points inside the tile's footprint
//!    padded by the prefilter distance;
//! 3. dispatches the kernel on a [`ComputeBackend`] if any point was selected,
//!    and hands the resulting raster to the [`TileWriter`].
//!
//! ```ignore
//! let defines = kernels::Defines::parse(["POWER=2.0"])?;
//! let source = kernels::KernelSource::load("idw", &defines)?;
//! let context = util::ComputeContext::new();
//! let handle = pollster::block_on(context.device(None))?;
//! let mut renderer = TileRenderer::new(WgpuBackend::new(handle), &source)?;
//! let dataset = Dataset::from_path("input.json")?;
//! let projection = Projection::new(Projection::DEFAULT)?;
//! let options = RenderOptions::new(12, "46.0,13.0,45.0,15.0".parse()?, "./cache");
//! let summary = renderer.render(&dataset, &projection, &options)?;
//! ```

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    missing_debug_implementations,
    clippy::cast_possible_truncation,
    reason = "Deferred"
)]

mod backend;
mod cpu;
mod output;
mod pipeline;
mod selector;
mod transform_cache;
mod wgpu_engine;

pub mod colormap;
pub mod dataset;
pub mod geometry;
pub mod projection;
pub mod util;

pub use heatmap_kernels as kernels;
/// Styling and color types.
pub use peniko;
/// 2D geometry, with a focus on curves.
pub use peniko::kurbo;
#[doc(hidden)] // Exported for use in tests and the command line tool.
pub use wgpu;

pub use backend::{ComputeBackend, TileRaster};
pub use colormap::ColorMap;
pub use cpu::{CpuBackend, CpuProgram};
pub use dataset::{Dataset, GeoPoint};
pub use geometry::{GeoBounds, LatLng, TileIndex, TileRange};
pub use output::{TileWriter, encode_png};
pub use pipeline::{RenderOptions, RenderSummary, TileRenderer};
pub use projection::Projection;
pub use selector::{PointSelector, Selection};
pub use transform_cache::{TileTransform, TransformCache};
pub use wgpu_engine::{WgpuBackend, WgpuProgram};

pub use heatmap_kernels::{TILE_SIZE, WORKGROUP_SIZE};

use std::path::PathBuf;

use thiserror::Error;

/// Number of entries in every [`ColorMap`].
pub const COLORMAP_LEN: usize = heatmap_kernels::COLORS_LEN as usize;

/// Errors that can occur in Heatmap.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// There is no available device with the features required by Heatmap.
    #[error("Couldn't find suitable device")]
    NoCompatibleDevice,
    /// The `--device` index doesn't name an adapter.
    #[error("No adapter with index {index}, {available} available")]
    DeviceNotFound { index: usize, available: usize },
    /// See [`wgpu::RequestDeviceError`] for more information.
    #[error("Couldn't request device")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    /// Failed to async map a buffer.
    /// See [`wgpu::BufferAsyncError`] for more information.
    #[error("Failed to async map a buffer")]
    BufferAsyncError(#[from] wgpu::BufferAsyncError),
    #[error("Failed to wait for the device")]
    Poll(#[from] wgpu::PollError),
    #[error("The readback channel was closed before the buffer was mapped")]
    ReadbackChannelClosed,
    #[error("wgpu Error from scope: {0}")]
    WgpuErrorFromScope(String),

    /// The kernel couldn't be found, preprocessed or validated.
    #[error(transparent)]
    Kernel(#[from] heatmap_kernels::Error),
    #[error("Kernel `{0}` has no CPU implementation")]
    MissingCpuKernel(String),
    /// [`ComputeBackend::dispatch`] was called before [`ComputeBackend::reserve`].
    #[error("Dispatch pool used before it was reserved")]
    PoolNotReserved,
    #[error("Dispatch of {requested} points exceeds the pool capacity of {capacity}")]
    PoolExhausted { requested: usize, capacity: usize },

    #[error("Invalid projection `{definition}`: {reason}")]
    InvalidProjection { definition: String, reason: String },
    #[error("Couldn't project ({x}, {y}): {reason}")]
    ProjectionFailed { x: f64, y: f64, reason: String },
    #[error("Unknown colormap `{0}`, expected `heat` or `grayscale`")]
    UnknownColorMap(String),
    #[error("Invalid boundaries: {0}")]
    InvalidBounds(String),
    #[error("Zoom level {0} is out of range, the maximum is {max}", max = geometry::MAX_ZOOM)]
    InvalidZoom(u8),
    #[error("Prefilter distance must be a non-negative number of meters, got {0}")]
    InvalidPrefilter(f64),

    #[error("Failed to read dataset {}", .path.display())]
    DatasetIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed dataset")]
    DatasetSyntax(#[from] serde_json::Error),
    #[error("Malformed dataset point {index}: {reason}")]
    InvalidPoint { index: usize, reason: String },

    /// Failed to encode a tile.
    /// See [`png::EncodingError`] for more information.
    #[error("Failed to encode tile")]
    Encode(#[from] png::EncodingError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
