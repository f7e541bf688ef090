//! # Realm Child Status
//!
//! Status block shared by every realm child resource.

use serde::{Deserialize, Serialize};

/// Status of a realm child resource
///
/// Tracks the outcome of the last reconciliation and drives the retry cadence.
/// Absent optional fields serialize as `null` so a merge patch clears them.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakChildStatus {
    /// "OK" after a successful reconciliation, otherwise the last error message
    #[serde(default)]
    pub value: String,
    /// Consecutive failed reconciliations, reset to zero on success
    #[serde(default)]
    pub failure_count: i64,
    /// Identifier of the remote object, for kinds that are addressed by id
    #[serde(default)]
    pub id: Option<String>,
    /// Generation handled by the last reconciliation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Next scheduled reconciliation (RFC3339)
    /// Persisted so that watch events caused by our own writes do not bypass the backoff
    #[serde(default)]
    pub next_reconcile_time: Option<String>,
    /// Parent realm the last reconciliation resolved from owner references or spec
    #[serde(default)]
    pub observed_owner: Option<String>,
}

impl KeycloakChildStatus {
    /// Whether two statuses differ in anything but the schedule
    pub fn differs_from(&self, other: &Self) -> bool {
        self.value != other.value
            || self.failure_count != other.failure_count
            || self.id != other.id
            || self.observed_generation != other.observed_generation
            || self.observed_owner != other.observed_owner
    }
}
