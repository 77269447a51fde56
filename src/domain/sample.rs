// Sample domain model - One timestamped reading for a vial
use chrono::{DateTime, NaiveDateTime, Utc};

use super::error::RenderError;

pub type VialId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub vial: VialId,
    pub timestamp: DateTime<Utc>,
    pub od: f64,
    pub temperature: Option<f64>,
    pub drug_concentration: Option<f64>,
    pub growth_rate: Option<f64>,
}

impl Sample {
    /// Build a sample, rejecting values the chart cannot place.
    pub fn new(vial: VialId, timestamp: DateTime<Utc>, od: f64) -> Result<Self, RenderError> {
        if !od.is_finite() {
            return Err(RenderError::NonFiniteValue { vial, value: od });
        }
        Ok(Self {
            vial,
            timestamp,
            od,
            temperature: None,
            drug_concentration: None,
            growth_rate: None,
        })
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature.filter(|v| v.is_finite());
        self
    }

    pub fn with_drug_concentration(mut self, drug_concentration: Option<f64>) -> Self {
        self.drug_concentration = drug_concentration.filter(|v| v.is_finite());
        self
    }

    pub fn with_growth_rate(mut self, growth_rate: Option<f64>) -> Self {
        self.growth_rate = growth_rate.filter(|v| v.is_finite());
        self
    }

    pub fn time_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Parse a backend timestamp.
///
/// The backend emits naive `isoformat()` strings without an offset; those are
/// taken as UTC. Anything carrying an offset goes through RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RenderError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| RenderError::InvalidTimestamp(raw.to_string()))
}
