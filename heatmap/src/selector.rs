// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use peniko::kurbo::{Point, Rect};

use crate::geometry::{TileIndex, bounding_box, contains, inflate};
use crate::{Dataset, Error, Projection, Result};

/// Picks the points which can influence a tile.
///
/// Every point is projected once up front. A tile's selection is the points
/// inside its projected footprint grown by the prefilter distance, compacted
/// into scratch buffers which are reused from tile to tile.
#[derive(Debug)]
pub struct PointSelector {
    projected: Vec<Point>,
    values: Vec<f32>,
    prefilter: f64,
    scratch_points: Vec<[f32; 2]>,
    scratch_values: Vec<f32>,
}

/// The points selected for one tile, co-indexed.
#[derive(Clone, Copy, Debug)]
pub struct Selection<'a> {
    pub points: &'a [[f32; 2]],
    pub values: &'a [f32],
}

impl Selection<'_> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Rejects NaN and negative prefilter distances.
pub(crate) fn check_prefilter(prefilter: f64) -> Result<()> {
    if prefilter.is_nan() || prefilter < 0.0 {
        return Err(Error::InvalidPrefilter(prefilter));
    }
    Ok(())
}

impl PointSelector {
    /// `prefilter` is in meters, `f64::INFINITY` selects every point for every tile.
    pub fn new(dataset: &Dataset, projection: &Projection, prefilter: f64) -> Result<Self> {
        check_prefilter(prefilter)?;
        let projected = dataset
            .points()
            .iter()
            .map(|point| projection.to_meters(point.location))
            .collect::<Result<Vec<_>>>()?;
        let values: Vec<f32> = dataset.points().iter().map(|point| point.value).collect();
        let capacity = projected.len();
        Ok(Self {
            projected,
            values,
            prefilter,
            scratch_points: Vec::with_capacity(capacity),
            scratch_values: Vec::with_capacity(capacity),
        })
    }

    /// The largest selection this selector can return.
    pub fn capacity(&self) -> usize {
        self.projected.len()
    }

    pub fn prefilter(&self) -> f64 {
        self.prefilter
    }

    /// The region, in meters, whose points are selected for `index`.
    pub fn footprint(&self, index: TileIndex, projection: &Projection) -> Result<Rect> {
        let mut corners = [Point::ZERO; 4];
        for (corner, tile) in corners.iter_mut().zip(index.corners()) {
            *corner = projection.tile_to_meters(tile, index.zoom)?;
        }
        Ok(inflate(bounding_box(&corners), self.prefilter))
    }

    pub fn select(&mut self, index: TileIndex, projection: &Projection) -> Result<Selection<'_>> {
        let footprint = self.footprint(index, projection)?;
        Ok(self.select_within(footprint))
    }

    /// Every point inside `footprint`, edges included.
    pub fn select_within(&mut self, footprint: Rect) -> Selection<'_> {
        self.scratch_points.clear();
        self.scratch_values.clear();
        for (point, &value) in self.projected.iter().zip(&self.values) {
            if contains(footprint, *point) {
                self.scratch_points.push([point.x as f32, point.y as f32]);
                self.scratch_values.push(value);
            }
        }
        Selection {
            points: &self.scratch_points,
            values: &self.scratch_values,
        }
    }
}
