//! Request and result types.
//!
//! [`ScoringRequest`] is exactly the JSON object the rubric documents as its
//! input format; [`ScoredResult`] is its output format plus the locally
//! attached `extracted_text`.

use crate::error::{FileFailure, ScoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Position of a file within the upload it arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchContext {
    pub total_files_in_batch: u32,
    pub file_position: u32,
}

impl BatchContext {
    /// A single-file upload is a batch of one.
    pub const fn single() -> Self {
        Self {
            total_files_in_batch: 1,
            file_position: 1,
        }
    }

    /// Build a context, clamping `total` to ≥ 1 and `position` into `1..=total`.
    pub fn new(total: u32, position: u32) -> Self {
        let total = total.max(1);
        Self {
            total_files_in_batch: total,
            file_position: position.clamp(1, total),
        }
    }
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::single()
    }
}

/// The payload sent to the scoring model for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub file_id: String,
    pub normalized_text: String,
    #[serde(default)]
    pub batch_context: BatchContext,
}

/// Coarse quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Premium,
    Good,
    Basic,
    Minimal,
    Zero,
}

impl Band {
    pub const ALL: [Band; 5] = [
        Band::Premium,
        Band::Good,
        Band::Basic,
        Band::Minimal,
        Band::Zero,
    ];

    /// The band the rubric assigns to `points`.
    pub fn for_points(points: u8) -> Self {
        match points {
            70.. => Band::Premium,
            50..=69 => Band::Good,
            30..=49 => Band::Basic,
            10..=29 => Band::Minimal,
            _ => Band::Zero,
        }
    }

    pub fn points_range(self) -> RangeInclusive<u8> {
        match self {
            Band::Premium => 70..=100,
            Band::Good => 50..=69,
            Band::Basic => 30..=49,
            Band::Minimal => 10..=29,
            Band::Zero => 0..=9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Band::Premium => "premium",
            Band::Good => "good",
            Band::Basic => "basic",
            Band::Minimal => "minimal",
            Band::Zero => "zero",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Band::ALL
            .into_iter()
            .find(|b| b.as_str() == wanted)
            .ok_or_else(|| format!("unknown band '{}'", s.trim()))
    }
}

/// A typed score for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub schema_version: String,
    pub points: u8,
    pub band: Band,
    pub reason: String,
    pub encouragement: String,
    /// Only expected for basic/minimal/zero. Always serialised, as `null` when absent.
    #[serde(default)]
    pub tip: Option<String>,
    /// Attached locally by `score_file`; the model never produces it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

impl ScoredResult {
    /// Map a parsed model response onto a result.
    ///
    /// Required keys: `schema_version`, `points`, `band`, `reason`,
    /// `encouragement`. `tip` is optional; `null` and absent are the same.
    pub fn from_response(value: &Value) -> Result<Self, ScoreError> {
        let obj = value.as_object().ok_or_else(|| ScoreError::MalformedResponse {
            detail: format!("expected a JSON object, got {}", json_kind(value)),
        })?;

        let field = |name: &str| {
            obj.get(name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| ScoreError::schema(name, "required field is missing"))
        };

        let schema_version = match field("schema_version")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(ScoreError::schema(
                    "schema_version",
                    format!("expected a string, got {}", json_kind(other)),
                ))
            }
        };

        let points = parse_points(field("points")?)?;

        let band = match field("band")? {
            Value::String(s) => s.parse::<Band>().map_err(|e| ScoreError::schema("band", e))?,
            other => {
                return Err(ScoreError::schema(
                    "band",
                    format!("expected a string, got {}", json_kind(other)),
                ))
            }
        };

        let reason = required_string(field("reason")?, "reason")?;
        let encouragement = required_string(field("encouragement")?, "encouragement")?;

        let tip = match obj.get("tip") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(ScoreError::schema(
                    "tip",
                    format!("expected a string or null, got {}", json_kind(other)),
                ))
            }
        };

        Ok(Self {
            schema_version,
            points,
            band,
            reason,
            encouragement,
            tip,
            extracted_text: None,
        })
    }

    /// Whether `band` agrees with the rubric's range for `points`.
    ///
    /// Advisory only; the scorer never rewrites the model's band.
    pub fn band_matches_points(&self) -> bool {
        self.band.points_range().contains(&self.points)
    }

    /// Copy without the locally attached extracted text.
    pub fn without_extracted_text(&self) -> Self {
        Self {
            extracted_text: None,
            ..self.clone()
        }
    }
}

fn parse_points(value: &Value) -> Result<u8, ScoreError> {
    let raw: f64 = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ScoreError::schema("points", format!("unrepresentable number {n}")))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ScoreError::schema("points", format!("'{s}' is not a number")))?,
        other => {
            return Err(ScoreError::schema(
                "points",
                format!("expected an integer, got {}", json_kind(other)),
            ))
        }
    };

    if raw.fract() != 0.0 {
        return Err(ScoreError::schema("points", format!("{raw} is not an integer")));
    }
    if !(0.0..=100.0).contains(&raw) {
        return Err(ScoreError::schema("points", format!("{raw} is outside 0-100")));
    }
    Ok(raw as u8)
}

fn required_string(value: &Value, name: &str) -> Result<String, ScoreError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ScoreError::schema(name, format!("expected a string, got {}", json_kind(value))))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A successfully scored file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub identifier: String,
    pub result: ScoredResult,
}

/// Outcome of scoring several files independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success: usize,
    pub failed: usize,
    pub results: Vec<BatchEntry>,
    pub errors: Vec<FileFailure>,
}

impl BatchOutcome {
    pub fn from_parts(results: Vec<BatchEntry>, errors: Vec<FileFailure>) -> Self {
        Self {
            success: results.len(),
            failed: errors.len(),
            results,
            errors,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    pub fn all_failed(&self) -> bool {
        self.success == 0 && self.failed > 0
    }
}
