use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ValueError;

/// Smallest valid latitude.
pub const MIN_LATITUDE: f64 = -90.0;
/// Largest valid latitude.
pub const MAX_LATITUDE: f64 = 90.0;
/// Smallest valid longitude.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Largest valid longitude.
pub const MAX_LONGITUDE: f64 = 180.0;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLatLon")]
pub struct LatLon {
    lat: f64,
    lon: f64,
}

impl LatLon {
    /// Create a position, rejecting out-of-range or non-finite coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self, ValueError> {
        if !lat.is_finite() || !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
            return Err(ValueError::Latitude(lat));
        }
        if !lon.is_finite() || !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&lon) {
            return Err(ValueError::Longitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Latitude in degrees
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees
    pub fn lon(&self) -> f64 {
        self.lon
    }
}

#[derive(Deserialize)]
struct RawLatLon {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawLatLon> for LatLon {
    type Error = ValueError;

    fn try_from(raw: RawLatLon) -> Result<Self, Self::Error> {
        Self::new(raw.lat, raw.lon)
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// An axis-aligned area between two positions.
///
/// `min.lat() <= max.lat()` always holds. `min.lon() > max.lon()` is a valid
/// state: the box crosses the antimeridian. Area queries that forbid
/// wraparound must use [`BoundingBox::split_at_antimeridian`] first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundingBox")]
pub struct BoundingBox {
    min: LatLon,
    max: LatLon,
}

#[derive(Deserialize)]
struct RawBoundingBox {
    min: LatLon,
    max: LatLon,
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = ValueError;

    fn try_from(raw: RawBoundingBox) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
    }
}

impl BoundingBox {
    /// Create a bounding box from its south-west and north-east corners.
    pub fn new(min: LatLon, max: LatLon) -> Result<Self, ValueError> {
        if min.lat > max.lat {
            return Err(ValueError::InvertedLatitudes {
                min: min.lat,
                max: max.lat,
            });
        }
        Ok(Self { min, max })
    }

    /// Create a bounding box from raw coordinates.
    pub fn from_coords(
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    ) -> Result<Self, ValueError> {
        Self::new(LatLon::new(min_lat, min_lon)?, LatLon::new(max_lat, max_lon)?)
    }

    /// South-west corner
    pub fn min(&self) -> LatLon {
        self.min
    }

    /// North-east corner
    pub fn max(&self) -> LatLon {
        self.max
    }

    /// Whether the box wraps around the 180th meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.min.lon > self.max.lon
    }

    /// Split a box crossing the antimeridian into its western and eastern halves.
    ///
    /// A box that does not cross it is returned unchanged as the only element.
    pub fn split_at_antimeridian(&self) -> Vec<BoundingBox> {
        if !self.crosses_antimeridian() {
            return vec![*self];
        }
        vec![
            BoundingBox {
                min: self.min,
                max: LatLon {
                    lat: self.max.lat,
                    lon: MAX_LONGITUDE,
                },
            },
            BoundingBox {
                min: LatLon {
                    lat: self.min.lat,
                    lon: MIN_LONGITUDE,
                },
                max: self.max,
            },
        ]
    }

    /// Query parameter form: `minlon,minlat,maxlon,maxlat`.
    pub fn to_query_value(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min.lon, self.min.lat, self.max.lon, self.max.lat
        )
    }
}
