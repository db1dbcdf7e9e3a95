// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slippy-map tile geometry.
//!
//! Tile space is continuous: at zoom `z` the world spans `0..2^z` along both
//! axes, `x` growing east and `y` growing south. Tile `(x, y)` covers the unit
//! square whose top-left corner is `(x, y)`.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use peniko::kurbo::{Point, Rect};

use crate::{Error, Result};

/// The highest zoom level whose tile count fits the `u32` tile indices.
pub const MAX_ZOOM: u8 = 30;

/// Latitudes are clamped to this before conversion so that poles stay finite.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// A geodetic location in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// An axis aligned geodetic rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    north_west: LatLng,
    south_east: LatLng,
}

impl GeoBounds {
    /// Builds the bounds spanned by two arbitrary corners.
    pub fn new(a: LatLng, b: LatLng) -> Self {
        Self {
            north_west: LatLng::new(a.lat.max(b.lat), a.lng.min(b.lng)),
            south_east: LatLng::new(a.lat.min(b.lat), a.lng.max(b.lng)),
        }
    }

    pub fn north_west(&self) -> LatLng {
        self.north_west
    }

    pub fn south_east(&self) -> LatLng {
        self.south_east
    }
}

impl FromStr for GeoBounds {
    type Err = Error;

    /// Parses `lat,lng,lat,lng`.
    fn from_str(s: &str) -> Result<Self> {
        let coords = s
            .split(',')
            .map(|part| {
                let part = part.trim();
                part.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| Error::InvalidBounds(format!("`{part}` is not a number")))
            })
            .collect::<Result<Vec<_>>>()?;
        let &[lat0, lng0, lat1, lng1] = coords.as_slice() else {
            return Err(Error::InvalidBounds(format!(
                "expected `lat,lng,lat,lng`, got {} values",
                coords.len()
            )));
        };
        for lat in [lat0, lat1] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(Error::InvalidBounds(format!("latitude {lat} is out of range")));
            }
        }
        for lng in [lng0, lng1] {
            if !(-180.0..=180.0).contains(&lng) {
                return Err(Error::InvalidBounds(format!("longitude {lng} is out of range")));
            }
        }
        Ok(Self::new(LatLng::new(lat0, lng0), LatLng::new(lat1, lng1)))
    }
}

fn world_size(zoom: u8) -> f64 {
    2.0_f64.powi(i32::from(zoom))
}

/// Converts a geodetic location to continuous tile space at `zoom`.
pub fn geodetic_to_tile(location: LatLng, zoom: u8) -> Point {
    let n = world_size(zoom);
    let lat = location.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Point::new(
        (location.lng + 180.0) / 360.0 * n,
        (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n,
    )
}

/// Inverse of [`geodetic_to_tile`].
pub fn tile_to_geodetic(point: Point, zoom: u8) -> LatLng {
    let n = world_size(zoom);
    let lat = (PI * (1.0 - 2.0 * point.y / n)).sinh().atan();
    LatLng::new(lat.to_degrees(), point.x / n * 360.0 - 180.0)
}

/// Rounds both components to a multiple of `granularity`, toward +∞ when
/// `round_up`, toward −∞ otherwise.
pub fn round_point(point: Point, granularity: f64, round_up: bool) -> Point {
    let round = |v: f64| {
        let steps = v / granularity;
        let steps = if round_up { steps.ceil() } else { steps.floor() };
        steps * granularity
    };
    Point::new(round(point.x), round(point.y))
}

/// The smallest rectangle enclosing `points`, or [`Rect::ZERO`] if there are none.
pub fn bounding_box(points: &[Point]) -> Rect {
    let Some((&first, rest)) = points.split_first() else {
        return Rect::ZERO;
    };
    rest.iter()
        .fold(Rect::from_points(first, first), |rect, &p| rect.union_pt(p))
}

/// Grows `rect` by `margin` on every side.
pub fn inflate(rect: Rect, margin: f64) -> Rect {
    rect.inflate(margin, margin)
}

/// Containment test which includes every edge.
pub fn contains(rect: Rect, point: Point) -> bool {
    point.x >= rect.x0 && point.x <= rect.x1 && point.y >= rect.y0 && point.y <= rect.y1
}

/// The address of one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileIndex {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileIndex {
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Tile space corners in the order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        let x = f64::from(self.x);
        let y = f64::from(self.y);
        [
            Point::new(x, y),
            Point::new(x + 1.0, y),
            Point::new(x + 1.0, y + 1.0),
            Point::new(x, y + 1.0),
        ]
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// An inclusive rectangle of tile indices at one zoom level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl TileRange {
    /// The tiles from `floor` of the top-left to `ceil` of the bottom-right
    /// corner of `bounds` at `zoom`, both inclusive.
    ///
    /// Indices past the edge of the world are clamped onto it.
    pub fn covering(bounds: GeoBounds, zoom: u8) -> Result<Self> {
        if zoom > MAX_ZOOM {
            return Err(Error::InvalidZoom(zoom));
        }
        let rect = Rect::from_points(
            geodetic_to_tile(bounds.north_west(), zoom),
            geodetic_to_tile(bounds.south_east(), zoom),
        );
        let lt = round_point(rect.origin(), 1.0, false);
        let rb = round_point(Point::new(rect.x1, rect.y1), 1.0, true);
        let max = world_size(zoom) - 1.0;
        let mut clamped = false;
        let mut clamp = |v: f64| {
            let c = v.clamp(0.0, max);
            clamped |= c != v;
            c as u32
        };
        let x0 = clamp(lt.x);
        let y0 = clamp(lt.y);
        let x1 = clamp(rb.x);
        let y1 = clamp(rb.y);
        if clamped {
            log::debug!("Tile range for {bounds:?} clamped to the zoom {zoom} world");
        }
        Ok(Self {
            zoom,
            x0,
            y0,
            x1,
            y1,
        })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }

    pub fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Never true, a range holds at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, index: TileIndex) -> bool {
        index.zoom == self.zoom
            && (self.x0..=self.x1).contains(&index.x)
            && (self.y0..=self.y1).contains(&index.y)
    }

    /// Every tile, column by column.
    pub fn iter(&self) -> impl Iterator<Item = TileIndex> + use<> {
        let Self {
            zoom,
            x0,
            y0,
            x1,
            y1,
        } = *self;
        (x0..=x1).flat_map(move |x| (y0..=y1).map(move |y| TileIndex::new(zoom, x, y)))
    }
}

#[cfg(test)]
mod tests {
    use peniko::kurbo::{Point, Rect};

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn null_island_is_the_centre_of_the_world() {
        let p = geodetic_to_tile(LatLng::new(0.0, 0.0), 1);
        assert!(close(p.x, 1.0) && close(p.y, 1.0));
        let p = geodetic_to_tile(LatLng::new(0.0, -180.0), 4);
        assert!(close(p.x, 0.0) && close(p.y, 8.0));
    }

    #[test]
    fn poles_stay_finite() {
        let north = geodetic_to_tile(LatLng::new(90.0, 0.0), 3);
        let south = geodetic_to_tile(LatLng::new(-90.0, 0.0), 3);
        assert!(north.y.is_finite() && south.y.is_finite());
        assert!(close(north.y, 0.0));
        assert!((south.y - 8.0).abs() < 1e-6);
    }

    #[test]
    fn tile_to_geodetic_inverts() {
        let loc = LatLng::new(46.05, 14.5);
        let back = tile_to_geodetic(geodetic_to_tile(loc, 12), 12);
        assert!((back.lat - loc.lat).abs() < 1e-9);
        assert!((back.lng - loc.lng).abs() < 1e-9);
    }

    #[test]
    fn rounding_follows_direction() {
        let p = Point::new(2.3, -2.3);
        assert_eq!(round_point(p, 1.0, false), Point::new(2.0, -3.0));
        assert_eq!(round_point(p, 1.0, true), Point::new(3.0, -2.0));
        assert_eq!(round_point(Point::new(7.0, 13.0), 5.0, true), Point::new(10.0, 15.0));
    }

    #[test]
    fn bounding_box_and_inflate() {
        let rect = bounding_box(&[
            Point::new(3.0, 1.0),
            Point::new(-1.0, 4.0),
            Point::new(2.0, 2.0),
        ]);
        assert_eq!(rect, Rect::new(-1.0, 1.0, 3.0, 4.0));
        assert_eq!(inflate(rect, 1.0), Rect::new(-2.0, 0.0, 4.0, 5.0));
        let everything = inflate(rect, f64::INFINITY);
        assert!(contains(everything, Point::new(1e300, -1e300)));
        assert_eq!(bounding_box(&[]), Rect::ZERO);
    }

    #[test]
    fn containment_includes_edges() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(contains(rect, Point::new(0.0, 10.0)));
        assert!(contains(rect, Point::new(10.0, 0.0)));
        assert!(!contains(rect, Point::new(10.000_001, 5.0)));
    }

    #[test]
    fn bounds_parse_and_normalise() {
        let bounds: GeoBounds = "45.0, 15.0, 46.5, 13.0".parse().unwrap();
        assert_eq!(bounds.north_west(), LatLng::new(46.5, 13.0));
        assert_eq!(bounds.south_east(), LatLng::new(45.0, 15.0));
        assert!("1,2,3".parse::<GeoBounds>().is_err());
        assert!("a,2,3,4".parse::<GeoBounds>().is_err());
        assert!("95,2,3,4".parse::<GeoBounds>().is_err());
    }

    #[test]
    fn whole_world_is_one_tile_at_zoom_zero() {
        let bounds = GeoBounds::new(LatLng::new(85.0, -180.0), LatLng::new(-85.0, 180.0));
        let range = TileRange::covering(bounds, 0).unwrap();
        assert_eq!((range.x0, range.y0, range.x1, range.y1), (0, 0, 0, 0));
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn range_includes_the_ceiling_tiles() {
        // Slightly inside tile (2, 1) at zoom 2 on both corners.
        let a = tile_to_geodetic(Point::new(2.25, 1.25), 2);
        let b = tile_to_geodetic(Point::new(2.75, 1.75), 2);
        let range = TileRange::covering(GeoBounds::new(a, b), 2).unwrap();
        assert_eq!((range.x0, range.y0, range.x1, range.y1), (2, 1, 3, 2));
        assert_eq!(range.len(), 4);

        // Ceilings past the world edge are clamped.
        let c = tile_to_geodetic(Point::new(3.5, 2.5), 2);
        let range = TileRange::covering(GeoBounds::new(a, c), 2).unwrap();
        assert_eq!((range.x0, range.y0, range.x1, range.y1), (2, 1, 3, 3));
        assert_eq!(range.len(), 6);
    }

    #[test]
    fn one_degree_box_reaches_sibling_tiles() {
        let range = TileRange::covering("46,14,45,15".parse().unwrap(), 1).unwrap();
        assert_eq!((range.x0, range.y0, range.x1, range.y1), (1, 0, 1, 1));
        let range = TileRange::covering("46,-0.5,45,0.5".parse().unwrap(), 1).unwrap();
        assert_eq!((range.x0, range.y0, range.x1, range.y1), (0, 0, 1, 1));
    }

    #[test]
    fn iteration_is_column_major() {
        let range = TileRange {
            zoom: 5,
            x0: 3,
            y0: 7,
            x1: 4,
            y1: 8,
        };
        let order: Vec<_> = range.iter().map(|t| (t.x, t.y)).collect();
        assert_eq!(order, vec![(3, 7), (3, 8), (4, 7), (4, 8)]);
        assert!(range.contains(TileIndex::new(5, 4, 8)));
        assert!(!range.contains(TileIndex::new(6, 4, 8)));
    }

    #[test]
    fn excessive_zoom_is_rejected() {
        let bounds = GeoBounds::new(LatLng::new(1.0, 1.0), LatLng::new(0.0, 0.0));
        assert!(matches!(
            TileRange::covering(bounds, 31),
            Err(Error::InvalidZoom(31))
        ));
    }
}
