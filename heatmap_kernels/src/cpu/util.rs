// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Helpers shared by the CPU kernels, mirroring `kernels/shared/common.wgsl`.

use super::Invocation;
use crate::COLORS_LEN;

pub(crate) fn distance_squared(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Maps `value` onto the palette indices `1..COLORS_LEN`.
///
/// Uses the same ties-to-even rounding as WGSL `round`.
pub(crate) fn value_to_index(inv: &Invocation<'_>, value: f32) -> u32 {
    let min = inv.defines.value_f32("VALUE_MIN").unwrap_or(0.0);
    let max = inv.defines.value_f32("VALUE_MAX").unwrap_or(1.0);
    let t = ((value - min) / (max - min)).clamp(0.0, 1.0);
    1 + (t * (COLORS_LEN - 2) as f32).round_ties_even() as u32
}
