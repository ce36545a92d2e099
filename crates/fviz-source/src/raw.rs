//! Raw upstream session schema.
//!
//! This is the shape the structured feed hands us, quirks included:
//! positions in decimeters, speeds in km/h, optional fields that vanish
//! per sample. Everything downstream of `normalize` speaks the core model
//! instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSession {
    pub session_id: String,
    pub track: String,
    pub year: i32,
    /// "Q" or "SQ".
    #[serde(default)]
    pub session_kind: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    pub cars: Vec<RawCar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCar {
    /// Driver abbreviation, e.g. "VER".
    #[serde(alias = "abbreviation")]
    pub abbrev: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Each run is one flying lap attempt; the fastest usable one is kept.
    pub runs: Vec<RawRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRun {
    #[serde(default)]
    pub lap_number: Option<u32>,
    /// Sector times in seconds, when the feed has them.
    #[serde(default)]
    pub sector_times_s: Option<[f64; 3]>,
    pub samples: Vec<RawSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSample {
    /// Session-relative time, seconds.
    #[serde(alias = "time")]
    pub t: f64,
    /// Position in decimeters, feed convention.
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
    #[serde(default, alias = "speed")]
    pub speed_kmh: Option<f64>,
    #[serde(default)]
    pub lap: Option<u32>,
    #[serde(default)]
    pub sector: Option<u8>,
    /// Distance along the current lap, meters.
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub throttle: Option<f64>,
    #[serde(default)]
    pub brake: Option<bool>,
    #[serde(default)]
    pub gear: Option<i8>,
    #[serde(default)]
    pub rpm: Option<f64>,
    #[serde(default)]
    pub drs: Option<bool>,
}
