//! Great-circle distance between the caller and the server.

use std::fmt;
use std::str::FromStr;

use crate::geo::GeoError;

const EARTH_RADIUS_MI: f64 = 3958.0;
const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_TO_NAUTICAL_MILES: f64 = 0.539957;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_zero(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    /// Haversine distance, returned as (statute miles, kilometers).
    pub fn distance_to(&self, other: &Coordinate) -> (f64, f64) {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        (c * EARTH_RADIUS_MI, c * EARTH_RADIUS_KM)
    }
}

impl FromStr for Coordinate {
    type Err = GeoError;

    /// Parse the `"lat,lon"` form used by ipinfo.io's `loc` field.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(GeoError::LocationFormat(s.to_string()));
        };

        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|_| GeoError::LocationNumber(lat.to_string()))?;
        let lon = lon
            .trim()
            .parse::<f64>()
            .map_err(|_| GeoError::LocationNumber(lon.to_string()))?;

        Ok(Self { lat, lon })
    }
}

/// Unit requested through the `distance` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceUnit {
    #[default]
    Miles,
    Kilometers,
    NauticalMiles,
}

impl DistanceUnit {
    /// `"km"` and `"NM"` select their units; anything else means miles.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("km") => Self::Kilometers,
            Some("NM") => Self::NauticalMiles,
            _ => Self::Miles,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Miles => "mi",
            Self::Kilometers => "km",
            Self::NauticalMiles => "NM",
        }
    }
}

/// A distance already converted to its display unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub value: f64,
    pub unit: DistanceUnit,
}

impl Distance {
    pub fn between(from: &Coordinate, to: &Coordinate, unit: DistanceUnit) -> Self {
        let (mi, km) = from.distance_to(to);
        let value = match unit {
            DistanceUnit::Miles => mi,
            DistanceUnit::Kilometers => km,
            DistanceUnit::NauticalMiles => km * KM_TO_NAUTICAL_MILES,
        };
        Self { value, unit }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.value, self.unit.suffix())
    }
}

/// Distance from a client `"lat,lon"` string to the server coordinate.
///
/// A malformed location only fails this computation.
pub fn distance_from_location(
    client_location: &str,
    server: &Coordinate,
    unit: DistanceUnit,
) -> Result<Distance, GeoError> {
    let client: Coordinate = client_location.parse()?;
    Ok(Distance::between(&client, server, unit))
}
