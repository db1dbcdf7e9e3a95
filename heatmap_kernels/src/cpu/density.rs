// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::Invocation;
use super::util::{distance_squared, value_to_index};

const DEFAULT_RADIUS: f32 = 1000.0;
/// Densities at or below this leave the pixel transparent.
const CUTOFF: f32 = 1e-4;

/// Gaussian kernel density with bandwidth `RADIUS` meters.
pub fn density(inv: &Invocation<'_>, x: u32, y: u32) -> u32 {
    let radius = inv.defines.value_f32("RADIUS").unwrap_or(DEFAULT_RADIUS);
    let here = inv.params.pixel_to_meters(x, y);
    let inv_two_sigma2 = 1.0 / (2.0 * radius * radius);
    let mut sum = 0.0_f32;
    for (point, value) in inv.samples() {
        sum += value * (-distance_squared(point, here) * inv_two_sigma2).exp();
    }
    if sum > CUTOFF {
        value_to_index(inv, sum)
    } else {
        0
    }
}
