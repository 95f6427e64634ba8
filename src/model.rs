use std::{fmt, str::FromStr};

use geo::Point;
use serde::{Deserialize, Serialize};
use typed_floats::NonNaNFinite;

use crate::error::{Error, Result};

/// A latitude/longitude pair in degrees.
///
/// Both components are finite and within their geographic range; a value of
/// this type can only be built through [`Coordinates::new`] or parsing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct Coordinates {
    latitude: NonNaNFinite<f64>,
    longitude: NonNaNFinite<f64>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let lat = NonNaNFinite::<f64>::try_from(latitude)
            .map_err(|_| Error::InvalidCoordinates(format!("latitude {latitude} is not finite")))?;
        let lon = NonNaNFinite::<f64>::try_from(longitude)
            .map_err(|_| Error::InvalidCoordinates(format!("longitude {longitude} is not finite")))?;

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidCoordinates(format!(
                "latitude {latitude} is outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidCoordinates(format!(
                "longitude {longitude} is outside [-180, 180]"
            )));
        }

        Ok(Self {
            latitude: lat,
            longitude: lon,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude.get()
    }

    pub fn longitude(&self) -> f64 {
        self.longitude.get()
    }

    /// geo uses x = longitude, y = latitude
    pub fn to_point(self) -> Point {
        Point::new(self.longitude(), self.latitude())
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude(), self.longitude())
    }
}

impl FromStr for Coordinates {
    type Err = Error;

    /// Accepts `"lat, lon"`, optionally wrapped in `[]` or `()` as older
    /// tables stored them.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|x| x.strip_suffix(']'))
            .or_else(|| trimmed.strip_prefix('(').and_then(|x| x.strip_suffix(')')))
            .unwrap_or(trimmed);

        let (lat, lon) = inner
            .split_once(',')
            .ok_or_else(|| Error::InvalidCoordinates(format!("expected \"lat, lon\", got {s:?}")))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| Error::InvalidCoordinates(format!("bad latitude in {s:?}")))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| Error::InvalidCoordinates(format!("bad longitude in {s:?}")))?;

        Self::new(lat, lon)
    }
}

impl TryFrom<(f64, f64)> for Coordinates {
    type Error = Error;

    fn try_from((lat, lon): (f64, f64)) -> Result<Self> {
        Self::new(lat, lon)
    }
}

impl From<Coordinates> for (f64, f64) {
    fn from(value: Coordinates) -> Self {
        (value.latitude(), value.longitude())
    }
}

/// Canonical form of a location name used as the lookup key everywhere.
pub fn canonical_location(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
