use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both values are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Last reported position of an online employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub username: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl UserLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// A location is usable when it names a user and has sane coordinates.
    pub fn is_valid(&self) -> bool {
        !self.username.trim().is_empty() && self.coordinates().is_valid()
    }
}

/// A shift currently in progress and where its employee is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveShift {
    #[serde(alias = "shift_id")]
    pub id: i64,
    pub username: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ActiveShift {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn is_valid(&self) -> bool {
        !self.username.trim().is_empty() && self.coordinates().is_valid()
    }
}
