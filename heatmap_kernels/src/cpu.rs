// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU implementations of the bundled kernels.
//!
//! Each function computes the palette index of a single pixel, following the
//! WGSL kernel of the same name step for step so that the two stay comparable.

mod density;
mod idw;
mod util;

pub use density::density;
pub use idw::idw;

use crate::{Defines, KernelParams};

/// Everything one tile dispatch hands to a kernel.
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    pub params: KernelParams,
    /// Planar meters of the selected points.
    pub points: &'a [[f32; 2]],
    pub values: &'a [f32],
    pub defines: &'a Defines,
}

impl Invocation<'_> {
    /// The points and values the kernel is allowed to read.
    pub fn samples(&self) -> impl Iterator<Item = ([f32; 2], f32)> + '_ {
        self.points
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .take(self.params.point_count as usize)
    }
}

/// Palette index of pixel `(x, y)`.
pub type CpuKernel = fn(&Invocation<'_>, u32, u32) -> u32;

/// The CPU version of the bundled kernel `name`, if there is one.
pub fn lookup(name: &str) -> Option<CpuKernel> {
    match name {
        "idw" => Some(idw),
        "density" => Some(density),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Invocation, lookup};
    use crate::{Defines, KernelParams, TILE_SIZE};

    #[test]
    fn bundled_kernels_are_registered() {
        assert!(lookup("idw").is_some());
        assert!(lookup("density").is_some());
        assert!(lookup("glow").is_none());
    }

    #[test]
    fn samples_stop_at_point_count() {
        let defines = Defines::default();
        let inv = Invocation {
            params: KernelParams::new([0.0; 4], [1.0, 0.0, 0.0, 1.0], 1),
            points: &[[1.0, 1.0], [2.0, 2.0]],
            values: &[0.5, 0.7],
            defines: &defines,
        };
        assert_eq!(inv.samples().collect::<Vec<_>>(), vec![([1.0, 1.0], 0.5)]);
    }

    #[test]
    fn every_kernel_marks_the_pixel_under_a_point() {
        let defines = Defines::parse(["VALUE_MAX=2.0", "RADIUS=10.0"]).unwrap();
        // One meter per pixel, y pointing down.
        let params = KernelParams::new([0.0, 256.0, 0.0, 0.0], [1.0, 0.0, 0.0, -1.0], 1);
        let inv = Invocation {
            params,
            points: &[[100.5, 155.5]],
            values: &[1.0],
            defines: &defines,
        };
        for name in ["idw", "density"] {
            let kernel = lookup(name).unwrap();
            let index = kernel(&inv, 100, 100);
            assert!(index > 0 && index < 256, "{name} gave {index}");
        }
        let far = lookup("density").unwrap()(&inv, TILE_SIZE - 1, 0);
        assert_eq!(far, 0);
    }
}
