//! YAML overlay files: per-entry policy overrides layered on a base registry.
//!
//! Overlays may flip status (enabled/disabled only), adjust autonomy, swap
//! rate limits, and attach channel/actor allow-deny lists. Anything else is
//! a validation failure, as is an override naming an entry the base
//! registry does not contain.

use serde::Deserialize;

use conductor_protocol::{AutonomyLevel, EntryStatus, RateLimit};

use crate::validation::RegistryIndex;

/// Wire shape of an overlay file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayFile {
    pub overlay_version: String,
    #[serde(default)]
    pub overrides: Vec<OverlayOverride>,
}

/// Single override entry. Only policy-adjacent fields can be overridden.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayOverride {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<OverlayStatus>,
    #[serde(default)]
    pub autonomy: Option<AutonomyLevel>,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    #[serde(default)]
    pub channels: Option<AllowDeny>,
    #[serde(default)]
    pub actors: Option<AllowDeny>,
}

/// Overlay status values. Overlays cannot deprecate entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayStatus {
    Enabled,
    Disabled,
}

impl From<OverlayStatus> for EntryStatus {
    fn from(status: OverlayStatus) -> Self {
        match status {
            OverlayStatus::Enabled => EntryStatus::Enabled,
            OverlayStatus::Disabled => EntryStatus::Disabled,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowDeny {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Validate overlay contents against the target registry index.
///
/// Serde already rejected unknown fields and malformed values; this checks
/// what serde cannot: rate-limit bounds and cross-references.
pub fn validate_overlay(
    overlay: &OverlayFile,
    index: &RegistryIndex,
    entry_label: &str,
) -> Vec<String> {
    let mut errors = Vec::new();
    for entry in &overlay.overrides {
        if let Some(rate_limit) = &entry.rate_limit {
            if rate_limit.max_per_minute < 1 {
                errors.push(format!(
                    "override {}: rate_limit.max_per_minute must be >= 1",
                    entry.name
                ));
            }
        }
        if !index.contains(&entry.name, entry.version.as_deref()) {
            match &entry.version {
                Some(version) => errors.push(format!(
                    "unknown {entry_label} {}@{version} in overlay",
                    entry.name
                )),
                None => errors.push(format!("unknown {entry_label} {} in overlay", entry.name)),
            }
        }
    }
    errors
}
