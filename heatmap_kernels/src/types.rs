// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Types that are shared between the kernel crate and the backends.

use bytemuck::{Pod, Zeroable};

/// The type of resource that will be bound to a slot in a kernel.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BindType {
    /// A storage buffer with read/write access.
    Buffer,
    /// A storage buffer with read only access.
    BufReadOnly,
    /// A small buffer to be used as uniforms.
    Uniform,
}

impl BindType {
    pub fn is_mutable(self) -> bool {
        matches!(self, Self::Buffer)
    }
}

#[derive(Clone, Debug)]
pub struct BindingInfo {
    pub name: Option<String>,
    pub location: (u32, u32),
    pub ty: BindType,
}

/// Bindings every kernel must declare in group 0, in binding order.
///
/// 0: [`KernelParams`], 1: points (`array<vec2<f32>>`), 2: values (`array<f32>`),
/// 3: the output raster (`array<u32>`, one palette index per pixel).
pub const KERNEL_LAYOUT: [BindType; 4] = [
    BindType::Uniform,
    BindType::BufReadOnly,
    BindType::BufReadOnly,
    BindType::Buffer,
];

/// Uniform block handed to every kernel invocation.
///
/// Mirrors `Params` in `kernels/shared/common.wgsl`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
#[repr(C)]
pub struct KernelParams {
    /// `xy` is the tile's top-left corner in planar meters.
    pub origin: [f32; 4],
    /// `xy` is one pixel step along +x, `zw` one pixel step along +y, in meters.
    pub basis: [f32; 4],
    pub point_count: u32,
    pub _padding: [u32; 3],
}

impl KernelParams {
    pub fn new(origin: [f32; 4], basis: [f32; 4], point_count: u32) -> Self {
        Self {
            origin,
            basis,
            point_count,
            _padding: [0; 3],
        }
    }

    /// Planar meters of the centre of the pixel at `(x, y)`.
    pub fn pixel_to_meters(&self, x: u32, y: u32) -> [f32; 2] {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;
        [
            self.origin[0] + px * self.basis[0] + py * self.basis[2],
            self.origin[1] + px * self.basis[1] + py * self.basis[3],
        ]
    }
}
