//! # RevisionOperator Status
//!
//! Status types for the revision counter and conditions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of the RevisionOperator resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionOperatorStatus {
    /// Highest revision whose snapshot objects have been fully created
    /// 0 means no revision exists yet
    #[serde(default)]
    pub latest_available_revision: i32,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
