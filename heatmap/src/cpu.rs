// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runs kernels on the CPU, through their Rust implementations in
//! [`heatmap_kernels::cpu`].
//!
//! This is slow, but needs no GPU, which makes it the backend of choice for
//! tests and for machines without a usable adapter.

use heatmap_kernels::cpu::{CpuKernel, Invocation};
use heatmap_kernels::{Defines, KernelInfo, KernelSource};

use crate::backend::{check_capacity, narrow};
use crate::{ComputeBackend, Error, Result, TILE_SIZE, TileRaster, TileTransform};

#[derive(Debug, Default)]
pub struct CpuBackend {
    capacity: Option<usize>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct CpuProgram {
    name: String,
    kernel: CpuKernel,
    defines: Defines,
}

impl CpuProgram {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ComputeBackend for CpuBackend {
    type Program = CpuProgram;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn compile(&mut self, source: &KernelSource) -> Result<CpuProgram> {
        // The WGSL is still held to the kernel contract, so that a kernel
        // accepted here is also accepted by the GPU backend.
        KernelInfo::new(source)?;
        let kernel = heatmap_kernels::cpu::lookup(&source.name)
            .ok_or_else(|| Error::MissingCpuKernel(source.name.clone()))?;
        Ok(CpuProgram {
            name: source.name.clone(),
            kernel,
            defines: source.defines.clone(),
        })
    }

    fn reserve(&mut self, capacity: usize) -> Result<()> {
        self.capacity = Some(capacity);
        Ok(())
    }

    fn dispatch(
        &mut self,
        program: &CpuProgram,
        transform: &TileTransform,
        points: &[[f32; 2]],
        values: &[f32],
        raster: &mut TileRaster,
    ) -> Result<()> {
        check_capacity(points.len(), self.capacity)?;
        let invocation = Invocation {
            params: transform.to_params(points.len() as u32),
            points,
            values,
            defines: &program.defines,
        };
        let pixels = raster.pixels_mut();
        for y in 0..TILE_SIZE {
            for x in 0..TILE_SIZE {
                let index = (program.kernel)(&invocation, x, y);
                pixels[(y * TILE_SIZE + x) as usize] = narrow(index);
            }
        }
        Ok(())
    }
}
