use std::path::Path;

use crate::aggregate::{aggregate, Dashboard};
use crate::attribution::{reconcile, Reconciled};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::loader::{load_all, probe_fee_record, roll_key, EntityKind, Snapshot};
use crate::models::{Achievement, Attributed, Role, StudentDetail};
use crate::normalize::AliasTable;
use crate::projector::Scope;
use crate::store::DocumentStore;

/// Output of one dashboard load. Each run works on its own snapshot.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub reconciled: Reconciled,
    pub dashboard: Dashboard,
}

/// Configuration for a run: the file at `path`, or the built-in tables.
pub fn configure(path: Option<&Path>) -> Result<PipelineConfig, PipelineError> {
    Ok(PipelineConfig::load(path)?)
}

pub async fn run(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
) -> Result<PipelineRun, PipelineError> {
    let snapshot = load_all(store, &config.store, &EntityKind::all()).await?;
    let reconciled = reconcile(&snapshot, config);
    let dashboard = aggregate(&reconciled);
    Ok(PipelineRun {
        reconciled,
        dashboard,
    })
}

/// Interpret a user-supplied department label. `None` means everything;
/// "unattributed" selects records without a department. Unknown labels
/// yield `None`.
pub fn resolve_scope(label: Option<&str>, aliases: &AliasTable) -> Option<Scope> {
    let Some(label) = label else {
        return Some(Scope::All);
    };
    if label.trim().eq_ignore_ascii_case("unattributed") {
        return Some(Scope::Unattributed);
    }
    aliases
        .normalize(Some(label))
        .map(|id| Scope::Group(id.to_string()))
}

#[derive(Debug, Clone)]
pub struct StudentLookup {
    pub detail: StudentDetail,
    pub achievements: Vec<Attributed<Achievement>>,
}

/// Single-student view: the account, its fee record found by probing the
/// fee locations in order, and its attributed achievements.
pub async fn lookup_student(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
    roll_number: &str,
) -> Result<Option<StudentLookup>, PipelineError> {
    let kinds = [EntityKind::Accounts, EntityKind::Achievements]
        .into_iter()
        .collect();
    let snapshot = load_all(store, &config.store, &kinds).await?;

    let key = roll_key(roll_number);
    let Some((account_id, stored_roll)) = snapshot.accounts.iter().find_map(|a| {
        if a.role != Role::Student {
            return None;
        }
        let roll = a.roll_number.as_deref()?;
        (roll_key(roll) == key).then(|| (a.id.clone(), roll.to_string()))
    }) else {
        return Ok(None);
    };

    let fee = probe_fee_record(store, &config.store.fee_locations, &stored_roll).await?;
    let narrowed = Snapshot {
        achievements: snapshot
            .achievements
            .into_iter()
            .filter(|a| a.student_id == account_id)
            .collect(),
        fee_records: fee.into_iter().collect(),
        accounts: snapshot.accounts,
    };
    let reconciled = reconcile(&narrowed, config);

    let Some(detail) = reconciled
        .students
        .into_iter()
        .find(|s| s.account_id == account_id)
    else {
        return Ok(None);
    };
    Ok(Some(StudentLookup {
        detail,
        achievements: reconciled.achievements,
    }))
}
