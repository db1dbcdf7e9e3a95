// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::Invocation;
use super::util::{distance_squared, value_to_index};

const DEFAULT_POWER: f32 = 2.0;
const EXACT_HIT: f32 = 1e-6;

/// Inverse distance weighting of every selected point.
pub fn idw(inv: &Invocation<'_>, x: u32, y: u32) -> u32 {
    let power = inv.defines.value_f32("POWER").unwrap_or(DEFAULT_POWER);
    let here = inv.params.pixel_to_meters(x, y);
    let mut weighted = 0.0_f32;
    let mut total = 0.0_f32;
    for (point, value) in inv.samples() {
        let d2 = distance_squared(point, here);
        if d2 < EXACT_HIT {
            weighted = value;
            total = 1.0;
            break;
        }
        let w = 1.0 / d2.powf(power * 0.5);
        weighted += w * value;
        total += w;
    }
    if total > 0.0 {
        value_to_index(inv, weighted / total)
    } else {
        0
    }
}
