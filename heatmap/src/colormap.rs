// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Palettes that tile pixels index into.
//!
//! Index 0 is always fully transparent: it marks pixels a kernel left alone.
//! The remaining entries are a gradient through a few color stops.

use peniko::Color;
use peniko::color::Rgba8;

use crate::{COLORMAP_LEN, Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct ColorMap {
    name: &'static str,
    entries: Vec<Rgba8>,
}

impl ColorMap {
    /// Names accepted by [`ColorMap::by_name`].
    pub const NAMES: [&str; 2] = ["heat", "grayscale"];

    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "heat" => Ok(Self::heat()),
            "grayscale" | "greyscale" => Ok(Self::grayscale()),
            _ => Err(Error::UnknownColorMap(name.to_owned())),
        }
    }

    /// Blue through cyan, green and yellow to red, growing more opaque.
    pub fn heat() -> Self {
        Self::from_stops(
            "heat",
            &[
                (0.0, Color::from_rgb8(0, 0, 255).with_alpha(0.35)),
                (0.25, Color::from_rgb8(0, 255, 255).with_alpha(0.55)),
                (0.5, Color::from_rgb8(0, 255, 0).with_alpha(0.7)),
                (0.75, Color::from_rgb8(255, 255, 0).with_alpha(0.85)),
                (1.0, Color::from_rgb8(255, 0, 0)),
            ],
        )
    }

    pub fn grayscale() -> Self {
        Self::from_stops(
            "grayscale",
            &[
                (0.0, Color::from_rgb8(0, 0, 0)),
                (1.0, Color::from_rgb8(255, 255, 255)),
            ],
        )
    }

    /// Interpolates `stops`, given as `(offset, color)` with increasing offsets
    /// in `0..=1`, over every entry after the background.
    fn from_stops(name: &'static str, stops: &[(f32, Color)]) -> Self {
        let mut entries = Vec::with_capacity(COLORMAP_LEN);
        entries.push(Rgba8::from_u8_array([0, 0, 0, 0]));
        let last = (COLORMAP_LEN - 2) as f32;
        for i in 0..COLORMAP_LEN - 1 {
            let t = i as f32 / last;
            entries.push(sample(stops, t).to_rgba8());
        }
        Self { name, entries }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entries(&self) -> &[Rgba8] {
        &self.entries
    }

    /// Packed RGB triples, as stored in a PNG `PLTE` chunk.
    pub fn palette(&self) -> Vec<u8> {
        self.entries.iter().flat_map(|c| [c.r, c.g, c.b]).collect()
    }

    /// Alpha of every entry, as stored in a PNG `tRNS` chunk.
    pub fn alpha(&self) -> Vec<u8> {
        self.entries.iter().map(|c| c.a).collect()
    }
}

fn sample(stops: &[(f32, Color)], t: f32) -> Color {
    let Some(upper) = stops.iter().position(|&(offset, _)| offset >= t) else {
        return stops.last().map_or(Color::TRANSPARENT, |&(_, c)| c);
    };
    if upper == 0 {
        return stops[0].1;
    }
    let (t0, c0) = stops[upper - 1];
    let (t1, c1) = stops[upper];
    let f = (t - t0) / (t1 - t0);
    let mut components = c0.components;
    for (c, end) in components.iter_mut().zip(c1.components) {
        *c += (end - *c) * f;
    }
    Color::new(components)
}

#[cfg(test)]
mod tests {
    use super::ColorMap;
    use crate::{COLORMAP_LEN, Error};

    #[test]
    fn background_is_transparent() {
        for name in ColorMap::NAMES {
            let map = ColorMap::by_name(name).unwrap();
            assert_eq!(map.entries().len(), COLORMAP_LEN);
            assert_eq!(map.alpha()[0], 0);
            assert!(map.alpha()[1..].iter().all(|&a| a > 0));
            assert_eq!(map.palette().len(), COLORMAP_LEN * 3);
        }
    }

    #[test]
    fn heat_runs_blue_to_red() {
        let map = ColorMap::heat();
        let first = map.entries()[1];
        let last = map.entries()[COLORMAP_LEN - 1];
        assert_eq!((first.r, first.g, first.b), (0, 0, 255));
        assert_eq!((last.r, last.g, last.b, last.a), (255, 0, 0, 255));
    }

    #[test]
    fn grayscale_is_monotonic() {
        let map = ColorMap::grayscale();
        let reds: Vec<u8> = map.entries()[1..].iter().map(|c| c.r).collect();
        assert!(reds.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(reds[0], 0);
        assert_eq!(reds[reds.len() - 1], 255);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            ColorMap::by_name("viridis"),
            Err(Error::UnknownColorMap(name)) if name == "viridis"
        ));
    }
}
