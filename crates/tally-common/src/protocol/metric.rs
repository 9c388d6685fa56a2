//! Metric Types
//!
//! [`Metric`] is the JSON record exchanged on the wire. [`MetricUpdate`] is
//! the validated form the rest of the system works with: an id plus a
//! [`MetricValue`] that is either a gauge reading or a counter delta.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{Result, TallyError};

/// The two independent metric namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(TallyError::Validation(format!("unknown metric type '{}'", other))),
        }
    }
}

/// A gauge reading (replaced on update) or a counter delta (accumulated).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parses the textual value of a path-encoded update.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self> {
        match kind {
            MetricKind::Gauge => {
                let value: f64 = raw
                    .parse()
                    .map_err(|_| TallyError::Validation(format!("invalid gauge value '{}'", raw)))?;
                if !value.is_finite() {
                    return Err(TallyError::Validation(format!("invalid gauge value '{}'", raw)));
                }
                Ok(MetricValue::Gauge(value))
            }
            MetricKind::Counter => raw
                .parse()
                .map(MetricValue::Counter)
                .map_err(|_| TallyError::Validation(format!("invalid counter value '{}'", raw))),
        }
    }
}

impl fmt::Display for MetricValue {
    /// Shortest representation that parses back to the same value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{}", v),
            MetricValue::Counter(d) => write!(f, "{}", d),
        }
    }
}

/// JSON wire record.
///
/// ```json
/// {"id": "Alloc", "type": "gauge", "value": 123.45}
/// {"id": "PollCount", "type": "counter", "delta": 5}
/// ```
///
/// Exactly one of `value`/`delta` is set for updates. A lookup request
/// (`POST /value`) carries neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// A lookup record with neither value nor delta.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Metric {
            id: id.into(),
            kind,
            delta: None,
            value: None,
        }
    }

    /// Validates the record and converts it to an update.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Validation`] if the id is empty, or if the field
    /// matching `type` is missing.
    pub fn to_update(&self) -> Result<MetricUpdate> {
        if self.id.is_empty() {
            return Err(TallyError::Validation("metric id is empty".to_string()));
        }
        let value = match self.kind {
            MetricKind::Gauge => match self.value {
                Some(v) => MetricValue::Gauge(v),
                None => {
                    return Err(TallyError::Validation(format!(
                        "gauge '{}' has no value",
                        self.id
                    )))
                }
            },
            MetricKind::Counter => match self.delta {
                Some(d) => MetricValue::Counter(d),
                None => {
                    return Err(TallyError::Validation(format!(
                        "counter '{}' has no delta",
                        self.id
                    )))
                }
            },
        };
        Ok(MetricUpdate {
            id: self.id.clone(),
            value,
        })
    }
}

impl From<MetricUpdate> for Metric {
    fn from(update: MetricUpdate) -> Self {
        match update.value {
            MetricValue::Gauge(v) => Metric::gauge(update.id, v),
            MetricValue::Counter(d) => Metric::counter(update.id, d),
        }
    }
}

/// A validated single update.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub id: String,
    pub value: MetricValue,
}

impl MetricUpdate {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        MetricUpdate {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        MetricUpdate {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// JSON cannot carry NaN or infinities.
    pub fn is_encodable(&self) -> bool {
        match self.value {
            MetricValue::Gauge(v) => v.is_finite(),
            MetricValue::Counter(_) => true,
        }
    }
}
