//! Geolocation resolution and great-circle distance
//!
//! Maps node addresses to coordinates through a pluggable provider with a
//! TTL-bounded cache, and computes haversine distance for proximity
//! scoring. Lookup failure degrades to an unknown sentinel location which
//! proximity scoring treats as neutral.

#![warn(missing_docs)]

pub mod resolver;

pub use resolver::{GeoProvider, GeoResolver, StaticGeoProvider};

use serde::{Deserialize, Serialize};

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Resolved geographic location of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Country label, when the provider reports one
    pub country: Option<String>,
    /// Region label (e.g. "eu-west")
    pub region: Option<String>,
    /// City label
    pub city: Option<String>,
    /// IANA timezone
    pub timezone: Option<String>,
    /// ISP label
    pub isp: Option<String>,
}

impl GeoLocation {
    /// Create a location from bare coordinates
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            country: None,
            region: None,
            city: None,
            timezone: None,
            isp: None,
        }
    }

    /// Attach a region label
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    /// Attach a country label
    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    /// Sentinel for addresses that failed to resolve
    ///
    /// The unlabeled null-island coordinate never occurs in provider
    /// output, so it doubles as the "unknown" marker. Proximity scoring
    /// treats it as neutral rather than near or far.
    pub fn unknown() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Whether this is the unresolved sentinel
    pub fn is_unknown(&self) -> bool {
        self.latitude == 0.0
            && self.longitude == 0.0
            && self.country.is_none()
            && self.region.is_none()
    }

    /// Best-effort region label for diversity grouping
    pub fn region_label(&self) -> &str {
        self.region
            .as_deref()
            .or(self.country.as_deref())
            .unwrap_or("unknown")
    }
}

/// Great-circle distance between two locations in kilometers
///
/// Haversine formula. Symmetric; zero iff the coordinates are equal;
/// monotonic in angular separation.
pub fn distance_km(a: &GeoLocation, b: &GeoLocation) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Map a distance to a [0,1] proximity score
///
/// Exponential falloff: `half_distance_km` is the distance at which the
/// score drops to 0.5. Zero distance scores 1.0.
pub fn proximity_score(distance_km: f64, half_distance_km: f64) -> f64 {
    if half_distance_km <= 0.0 {
        return 0.5;
    }
    0.5_f64.powf(distance_km / half_distance_km)
}
