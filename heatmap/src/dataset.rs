// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Point datasets.
//!
//! The input is a JSON document of the form
//!
//! ```json
//! { "points": [ { "loc": [46.05, 14.5], "val": 0.8 } ] }
//! ```
//!
//! where `loc` is `[latitude, longitude]` in degrees. `location` and `value`
//! are accepted in place of `loc` and `val`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::geometry::LatLng;
use crate::{Error, Result};

/// One sample of the scalar field being rendered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub location: LatLng,
    pub value: f32,
}

impl GeoPoint {
    pub const fn new(location: LatLng, value: f32) -> Self {
        Self { location, value }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    points: Vec<GeoPoint>,
}

#[derive(Deserialize)]
struct RawDataset {
    points: Vec<RawPoint>,
}

#[derive(Deserialize)]
struct RawPoint {
    #[serde(alias = "location")]
    loc: Option<Vec<f64>>,
    #[serde(alias = "value")]
    val: Option<f64>,
}

impl RawPoint {
    fn validate(self, index: usize) -> Result<GeoPoint> {
        let invalid = |reason: String| Error::InvalidPoint { index, reason };
        let loc = self
            .loc
            .ok_or_else(|| invalid("missing `loc`".to_owned()))?;
        let &[lat, lng] = loc.as_slice() else {
            return Err(invalid(format!(
                "`loc` must be [lat, lng], got {} coordinates",
                loc.len()
            )));
        };
        if !(-90.0..=90.0).contains(&lat) {
            return Err(invalid(format!("latitude {lat} is out of range")));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(invalid(format!("longitude {lng} is out of range")));
        }
        let val = self.val.ok_or_else(|| invalid("missing `val`".to_owned()))?;
        let value = val as f32;
        if !value.is_finite() {
            return Err(invalid(format!("value {val} is not a finite f32")));
        }
        Ok(GeoPoint::new(LatLng::new(lat, lng), value))
    }
}

impl Dataset {
    pub fn from_points(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawDataset = serde_json::from_str(json)?;
        let points = raw
            .points
            .into_iter()
            .enumerate()
            .map(|(index, point)| point.validate(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { points })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| Error::DatasetIo {
            path: path.to_owned(),
            source,
        })?;
        let dataset = Self::from_json_str(&json)?;
        log::info!("Loaded {} points from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
