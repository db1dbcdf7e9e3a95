// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geodetic to planar projection, backed by the pure Rust [`proj4rs`].

use peniko::kurbo::Point;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::geometry::{LatLng, tile_to_geodetic};
use crate::{Error, Result};

const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// EPSG codes which can be named with `EPSG:NNNN` or `+init=epsg:NNNN`.
const EPSG_TABLE: &[(u32, &str)] = &[
    (
        3045,
        "+proj=utm +zone=33 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
    ),
    (
        3857,
        "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs",
    ),
    (4326, WGS84),
    (32633, "+proj=utm +zone=33 +datum=WGS84 +units=m +no_defs"),
];

/// A planar coordinate system that geodetic locations are projected into.
pub struct Projection {
    definition: String,
    proj_string: String,
    geodetic: Proj,
    planar: Proj,
    /// Geographic systems take and return radians, which are exposed as degrees.
    planar_is_geographic: bool,
}

impl Projection {
    /// ETRS89 / UTM zone 33N.
    pub const DEFAULT: &str = "+init=epsg:3045";

    /// Accepts a proj4 string or one of the EPSG codes in the built-in table.
    pub fn new(definition: &str) -> Result<Self> {
        let definition = definition.trim();
        let invalid = |reason: String| Error::InvalidProjection {
            definition: definition.to_owned(),
            reason,
        };
        let proj_string = expand(definition).map_err(invalid)?;
        let geodetic = Proj::from_proj_string(WGS84).map_err(|e| invalid(format!("{e:?}")))?;
        let planar = Proj::from_proj_string(&proj_string).map_err(|e| invalid(format!("{e:?}")))?;
        let planar_is_geographic = ["longlat", "latlong", "lonlat", "latlon"]
            .iter()
            .any(|name| proj_string.contains(&format!("+proj={name}")));
        log::debug!("Projection `{definition}` is `{proj_string}`");
        Ok(Self {
            definition: definition.to_owned(),
            proj_string,
            geodetic,
            planar,
            planar_is_geographic,
        })
    }

    /// The definition as given to [`Projection::new`].
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Identifies the projection independently of how it was spelled.
    pub fn fingerprint(&self) -> &str {
        &self.proj_string
    }

    /// Projects `location` to planar coordinates, meters for every projected system.
    pub fn to_meters(&self, location: LatLng) -> Result<Point> {
        let mut point = (location.lng.to_radians(), location.lat.to_radians(), 0.0);
        transform(&self.geodetic, &self.planar, &mut point).map_err(|e| {
            Error::ProjectionFailed {
                x: location.lng,
                y: location.lat,
                reason: format!("{e:?}"),
            }
        })?;
        let (x, y) = if self.planar_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        finite(x, y, location.lng, location.lat)
    }

    /// Inverse of [`Projection::to_meters`].
    pub fn to_geodetic(&self, point: Point) -> Result<LatLng> {
        let mut coords = if self.planar_is_geographic {
            (point.x.to_radians(), point.y.to_radians(), 0.0)
        } else {
            (point.x, point.y, 0.0)
        };
        transform(&self.planar, &self.geodetic, &mut coords).map_err(|e| {
            Error::ProjectionFailed {
                x: point.x,
                y: point.y,
                reason: format!("{e:?}"),
            }
        })?;
        let p = finite(coords.0.to_degrees(), coords.1.to_degrees(), point.x, point.y)?;
        Ok(LatLng::new(p.y, p.x))
    }

    /// Projects a point in continuous tile space at `zoom`.
    pub fn tile_to_meters(&self, point: Point, zoom: u8) -> Result<Point> {
        self.to_meters(tile_to_geodetic(point, zoom))
    }
}

impl std::fmt::Debug for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projection")
            .field("definition", &self.definition)
            .field("proj_string", &self.proj_string)
            .finish_non_exhaustive()
    }
}

fn finite(x: f64, y: f64, in_x: f64, in_y: f64) -> Result<Point> {
    if x.is_finite() && y.is_finite() {
        Ok(Point::new(x, y))
    } else {
        Err(Error::ProjectionFailed {
            x: in_x,
            y: in_y,
            reason: "result is not finite".to_owned(),
        })
    }
}

fn expand(definition: &str) -> Result<String, String> {
    let lower = definition.to_ascii_lowercase();
    let code = lower
        .strip_prefix("+init=epsg:")
        .or_else(|| lower.strip_prefix("epsg:"));
    match code {
        Some(code) => {
            let code: u32 = code
                .trim()
                .parse()
                .map_err(|_| format!("`{code}` is not an EPSG code"))?;
            EPSG_TABLE
                .iter()
                .find(|(known, _)| *known == code)
                .map(|(_, proj)| (*proj).to_owned())
                .ok_or_else(|| {
                    let known: Vec<_> = EPSG_TABLE.iter().map(|(c, _)| c.to_string()).collect();
                    format!(
                        "EPSG:{code} is not built in, use a proj4 string or one of {}",
                        known.join(", ")
                    )
                })
        }
        None if definition.starts_with('+') => Ok(definition.to_owned()),
        None => Err("expected a proj4 string or `EPSG:NNNN`".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use peniko::kurbo::Point;

    use super::Projection;
    use crate::Error;
    use crate::geometry::LatLng;

    #[test]
    fn central_meridian_maps_to_false_easting() {
        let projection = Projection::new(Projection::DEFAULT).unwrap();
        let p = projection.to_meters(LatLng::new(0.0, 15.0)).unwrap();
        assert!((p.x - 500_000.0).abs() < 0.01, "{p:?}");
        assert!(p.y.abs() < 0.01, "{p:?}");
    }

    #[test]
    fn spellings_share_a_fingerprint() {
        let a = Projection::new("+init=epsg:3045").unwrap();
        let b = Projection::new("EPSG:3045").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = Projection::new("EPSG:32633").unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn round_trip_through_meters() {
        let projection = Projection::new("EPSG:3857").unwrap();
        let loc = LatLng::new(46.05, 14.5);
        let meters = projection.to_meters(loc).unwrap();
        let back = projection.to_geodetic(meters).unwrap();
        assert!((back.lat - loc.lat).abs() < 1e-7);
        assert!((back.lng - loc.lng).abs() < 1e-7);
        let edge = projection.to_meters(LatLng::new(0.0, 180.0)).unwrap();
        assert!((edge.x - 20_037_508.342_789_244).abs() < 0.01);
    }

    #[test]
    fn tile_corner_projects() {
        let projection = Projection::new("EPSG:3857").unwrap();
        let origin = projection.tile_to_meters(Point::new(1.0, 1.0), 1).unwrap();
        assert!(origin.x.abs() < 1e-6 && origin.y.abs() < 1e-6);
    }

    #[test]
    fn unknown_definitions_are_rejected() {
        for bad in ["EPSG:999999", "epsg:abc", "utm", ""] {
            assert!(
                matches!(Projection::new(bad), Err(Error::InvalidProjection { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
