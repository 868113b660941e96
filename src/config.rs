use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::normalize::{AliasTable, Department};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Everything a pipeline run needs besides the store itself.
///
/// Built once at startup and passed by reference into every entry point.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub policy: AttendancePolicy,
    pub store: StoreLayout,
    pub aliases: AliasTable,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    policy: AttendancePolicy,
    #[serde(default)]
    store: StoreLayout,
    #[serde(default = "default_departments")]
    departments: Vec<Department>,
}

// ---------------------------------------------------------------------------
// Policy constants
// ---------------------------------------------------------------------------

/// Attendance policy constants.
///
/// `academic_days` and `late_share` are approximations inherited from the
/// department dashboards, not measured values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttendancePolicy {
    /// Attendance at or above this is `excellent`.
    pub excellent_threshold: f64,
    /// Attendance below this is `poor` and marks a defaulter.
    pub defaulter_threshold: f64,
    pub academic_days: u32,
    /// Share of absences reported as late arrivals.
    pub late_share: f64,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            excellent_threshold: 90.0,
            defaulter_threshold: 75.0,
            academic_days: 180,
            late_share: 0.10,
        }
    }
}

// ---------------------------------------------------------------------------
// Store layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreLayout {
    pub accounts: String,
    pub achievements: String,
    /// Candidate fee collections in priority order. The first location
    /// holding a roll number wins; later ones are never merged in.
    pub fee_locations: Vec<String>,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            accounts: "users".to_string(),
            achievements: "achievements".to_string(),
            fee_locations: vec!["fees".to_string(), "finance/studentFees".to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in department table
// ---------------------------------------------------------------------------

const DEFAULT_DEPARTMENTS: &[(&str, &str, &[&str])] = &[
    (
        "cse",
        "Computer Science and Engineering",
        &["cse", "Computer Science and Engineering", "Computer Science"],
    ),
    (
        "ai-ds",
        "Artificial Intelligence and Data Science",
        &[
            "ai-ds",
            "AI and DS",
            "AI&DS",
            "AIDS",
            "Artificial Intelligence and Data Science",
        ],
    ),
    (
        "ece",
        "Electronics and Communication Engineering",
        &["ece", "Electronics and Communication Engineering"],
    ),
    (
        "eee",
        "Electrical and Electronics Engineering",
        &["eee", "Electrical and Electronics Engineering"],
    ),
    (
        "mech",
        "Mechanical Engineering",
        &["mech", "Mechanical Engineering", "Mechanical"],
    ),
    ("civil", "Civil Engineering", &["civil", "Civil Engineering"]),
    ("it", "Information Technology", &["it", "Information Technology"]),
];

fn default_departments() -> Vec<Department> {
    DEFAULT_DEPARTMENTS
        .iter()
        .map(|(id, name, aliases)| Department {
            id: id.to_string(),
            name: Some(name.to_string()),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        })
        .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            policy: AttendancePolicy::default(),
            store: StoreLayout::default(),
            aliases: AliasTable::new(default_departments()),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate_departments(&raw.departments)?;
        validate_policy(&raw.policy)?;
        if raw.store.fee_locations.is_empty() {
            return Err(ConfigError::Validation(
                "store.fee_locations must list at least one location".into(),
            ));
        }

        Ok(Self {
            policy: raw.policy,
            store: raw.store,
            aliases: AliasTable::new(raw.departments),
        })
    }

    /// Load from a TOML file, or fall back to the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&input)?;
        log::info!(
            "Loaded {} departments from {}",
            config.aliases.departments().len(),
            path.display()
        );
        Ok(config)
    }
}

fn validate_departments(departments: &[Department]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for department in departments {
        let id = department.id.trim();
        if id.is_empty() {
            return Err(ConfigError::Validation(
                "department id must not be empty".into(),
            ));
        }
        if !seen.insert(id.to_string()) {
            return Err(ConfigError::Validation(format!(
                "department '{id}' is declared twice"
            )));
        }
    }
    Ok(())
}

fn validate_policy(policy: &AttendancePolicy) -> Result<(), ConfigError> {
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(policy.excellent_threshold) || !in_range(policy.defaulter_threshold) {
        return Err(ConfigError::Validation(
            "attendance thresholds must lie within 0..=100".into(),
        ));
    }
    if policy.defaulter_threshold > policy.excellent_threshold {
        return Err(ConfigError::Validation(format!(
            "defaulter_threshold ({}) exceeds excellent_threshold ({})",
            policy.defaulter_threshold, policy.excellent_threshold
        )));
    }
    if policy.academic_days == 0 {
        return Err(ConfigError::Validation(
            "academic_days must be positive".into(),
        ));
    }
    if !(0.0..=1.0).contains(&policy.late_share) {
        return Err(ConfigError::Validation(format!(
            "late_share must lie within 0..=1, got {}",
            policy.late_share
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CUSTOM: &str = r#"
[policy]
excellent_threshold = 85.0
defaulter_threshold = 70.0
academic_days = 200
late_share = 0.05

[store]
accounts = "people"
fee_locations = ["ledger/fees"]

[[departments]]
id = "cse"
aliases = ["CSE", "Computer Science and Engineering"]

[[departments]]
id = "ai-ds"
name = "AI & Data Science"
aliases = ["AI and DS"]
"#;

    #[test]
    fn parse_custom_config() {
        let config = PipelineConfig::from_toml(CUSTOM).unwrap();
        assert_eq!(config.policy.excellent_threshold, 85.0);
        assert_eq!(config.policy.academic_days, 200);
        assert_eq!(config.store.accounts, "people");
        // unspecified store fields keep their defaults
        assert_eq!(config.store.achievements, "achievements");
        assert_eq!(config.store.fee_locations, vec!["ledger/fees"]);
        assert_eq!(config.aliases.departments().len(), 2);
        assert_eq!(config.aliases.display_name("ai-ds"), "AI & Data Science");
        assert_eq!(config.aliases.display_name("cse"), "cse");
    }

    #[test]
    fn empty_document_uses_builtin_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config.policy, AttendancePolicy::default());
        assert_eq!(config.store, StoreLayout::default());
        assert_eq!(config.aliases.normalize(Some("AI and DS")), Some("ai-ds"));
        assert_eq!(
            config.aliases.normalize(Some("computer science and engineering")),
            Some("cse")
        );
    }

    #[test]
    fn builtin_table_has_no_overlaps() {
        assert!(PipelineConfig::default().aliases.overlaps().is_empty());
    }

    #[test]
    fn overlap_is_reported_not_rejected() {
        let input = r#"
[[departments]]
id = "cse"
aliases = ["CSE", "CS"]

[[departments]]
id = "cs"
aliases = ["cs"]
"#;
        let config = PipelineConfig::from_toml(input).unwrap();
        let overlaps = config.aliases.overlaps();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].winner, "cse");
        assert_eq!(overlaps[0].shadowed, "cs");
    }

    #[test]
    fn reject_duplicate_department_id() {
        let input = r#"
[[departments]]
id = "cse"
aliases = ["CSE"]

[[departments]]
id = "cse"
aliases = ["Computer Science"]
"#;
        let err = PipelineConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn reject_inverted_thresholds() {
        let input = r#"
[policy]
excellent_threshold = 60.0
defaulter_threshold = 75.0
"#;
        let err = PipelineConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("exceeds excellent_threshold"));
    }

    #[test]
    fn reject_zero_academic_days() {
        let err = PipelineConfig::from_toml("[policy]\nacademic_days = 0\n").unwrap_err();
        assert!(err.to_string().contains("academic_days"));
    }

    #[test]
    fn reject_empty_fee_locations() {
        let err = PipelineConfig::from_toml("[store]\nfee_locations = []\n").unwrap_err();
        assert!(err.to_string().contains("fee_locations"));
    }

    #[test]
    fn reject_unknown_policy_key() {
        let err = PipelineConfig::from_toml("[policy]\nlate_shares = 0.2\n");
        assert!(err.is_err(), "typo in policy key should fail deserialization");
    }

    #[test]
    fn load_without_path_is_default() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.policy.academic_days, 180);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("college.toml");
        std::fs::write(&path, CUSTOM).unwrap();
        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.policy.late_share, 0.05);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
