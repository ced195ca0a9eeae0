//! # ObjectBucket Status
//!
//! Status types for tracking reconciliation state and conditions.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of an ObjectBucket as recorded in its status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum BucketPhase {
    /// Nothing has been provisioned yet
    Unprovisioned,
    /// The owner's credential secret was found
    CredentialResolved,
    /// The remote bucket exists and is owned by the object user
    BucketProvisioned,
    /// The connection ConfigMap is up to date
    Published,
    /// The last reconciliation stopped at `failedStage`
    Failed,
}

impl fmt::Display for BucketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unprovisioned => "Unprovisioned",
            Self::CredentialResolved => "CredentialResolved",
            Self::BucketProvisioned => "BucketProvisioned",
            Self::Published => "Published",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Status of the ObjectBucket resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketStatus {
    /// Current phase of reconciliation
    #[serde(default)]
    pub phase: Option<BucketPhase>,
    /// Pipeline stage that failed (only set when phase is Failed)
    #[serde(default)]
    pub failed_stage: Option<String>,
    /// Machine-readable failure kind, e.g. `CredentialNotFound`
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable description of the current state
    #[serde(default)]
    pub message: Option<String>,
    /// Whether the failure is retried automatically
    #[serde(default)]
    pub retryable: Option<bool>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation the status describes
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Name of the provisioned bucket
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Name of the ConfigMap holding the connection details
    #[serde(default)]
    pub config_map_name: Option<String>,
    /// Last reconciliation time (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
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

impl Condition {
    /// `Ready` condition derived from a phase
    #[must_use]
    pub fn ready(phase: BucketPhase, reason: &str, message: Option<String>) -> Self {
        let status = match phase {
            BucketPhase::Published => "True",
            BucketPhase::Failed => "False",
            _ => "Unknown",
        };
        Self {
            r#type: "Ready".to_string(),
            status: status.to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_condition_follows_phase() {
        assert_eq!(
            Condition::ready(BucketPhase::Published, "Published", None).status,
            "True"
        );
        assert_eq!(
            Condition::ready(BucketPhase::Failed, "CredentialNotFound", None).status,
            "False"
        );
        assert_eq!(
            Condition::ready(BucketPhase::CredentialResolved, "InProgress", None).status,
            "Unknown"
        );
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = ObjectBucketStatus {
            phase: Some(BucketPhase::Failed),
            failed_stage: Some("credentials".to_string()),
            observed_generation: Some(3),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "Failed");
        assert_eq!(json["failedStage"], "credentials");
        assert_eq!(json["observedGeneration"], 3);
    }
}
