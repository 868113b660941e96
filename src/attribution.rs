use std::collections::HashMap;

use crate::config::{AttendancePolicy, PipelineConfig};
use crate::loader::{roll_key, Snapshot};
use crate::models::{
    Account, Achievement, Attributed, AttendanceBand, Discrepancies, FeeRecord, FeeStatus, Role,
    StudentDetail,
};
use crate::normalize::AliasTable;

/// Every record of a snapshot with its department resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    pub students: Vec<StudentDetail>,
    pub faculty: Vec<Attributed<Account>>,
    pub achievements: Vec<Attributed<Achievement>>,
    pub fees: Vec<Attributed<FeeRecord>>,
    pub discrepancies: Discrepancies,
}

pub fn classify(attendance: f64, policy: &AttendancePolicy) -> AttendanceBand {
    if attendance >= policy.excellent_threshold {
        AttendanceBand::Excellent
    } else if attendance >= policy.defaulter_threshold {
        AttendanceBand::Good
    } else {
        AttendanceBand::Poor
    }
}

pub fn is_defaulter(attendance: f64, policy: &AttendancePolicy) -> bool {
    attendance < policy.defaulter_threshold
}

pub fn attribute_account(account: &Account, aliases: &AliasTable) -> Option<String> {
    aliases
        .normalize(account.department.as_deref())
        .map(str::to_string)
}

/// Resolve an achievement's department.
///
/// The achievement's own `department` wins whenever it normalizes, even if
/// the student's account says otherwise. Only when it is missing or unknown
/// does the student's account decide.
pub fn attribute(
    achievement: &Achievement,
    accounts_by_id: &HashMap<&str, &Account>,
    aliases: &AliasTable,
) -> Option<String> {
    if let Some(group) = aliases.normalize(achievement.department.as_deref()) {
        return Some(group.to_string());
    }
    let account = accounts_by_id.get(achievement.student_id.as_str())?;
    log::debug!(
        "Achievement {} attributed through student {}",
        achievement.id,
        account.id
    );
    attribute_account(account, aliases)
}

/// A fee record belongs to the department of the account holding its roll
/// number; without such an account it stays unattributed.
pub fn attribute_fee(
    fee: &FeeRecord,
    account: Option<&Account>,
    aliases: &AliasTable,
) -> Option<String> {
    match account {
        Some(account) => attribute_account(account, aliases),
        None => {
            log::debug!("Fee record {} matches no account", fee.roll_number);
            None
        }
    }
}

/// Roll number → account. The first account (in load order) keeps a
/// duplicated roll number; the count of later duplicates is returned.
pub fn index_roll_numbers(accounts: &[Account]) -> (HashMap<String, &Account>, usize) {
    let mut index: HashMap<String, &Account> = HashMap::new();
    let mut duplicates = 0;
    for account in accounts {
        let Some(roll) = account.roll_number.as_deref() else {
            continue;
        };
        let key = roll_key(roll);
        if let Some(existing) = index.get(&key) {
            log::warn!(
                "Roll number {roll} is held by both {} and {}; keeping {}",
                existing.id,
                account.id,
                existing.id
            );
            duplicates += 1;
            continue;
        }
        index.insert(key, account);
    }
    (index, duplicates)
}

fn note_label(discrepancies: &mut Discrepancies, label: Option<&str>, aliases: &AliasTable) {
    if let Some(label) = label {
        if aliases.normalize(Some(label)).is_none() {
            *discrepancies
                .unknown_labels
                .entry(label.to_string())
                .or_default() += 1;
        }
    }
}

/// Attribute every record of `snapshot` to a canonical department.
pub fn reconcile(snapshot: &Snapshot, config: &PipelineConfig) -> Reconciled {
    let aliases = &config.aliases;
    let policy = &config.policy;
    let mut discrepancies = Discrepancies::default();

    let accounts_by_id: HashMap<&str, &Account> = snapshot
        .accounts
        .iter()
        .map(|a| (a.id.as_str(), a))
        .collect();
    let (by_roll, duplicates) = index_roll_numbers(&snapshot.accounts);
    discrepancies.duplicate_roll_numbers = duplicates;

    let fees_by_roll: HashMap<String, &FeeRecord> = snapshot
        .fee_records
        .iter()
        .map(|f| (roll_key(&f.roll_number), f))
        .collect();

    let mut students = Vec::new();
    let mut faculty = Vec::new();
    for account in &snapshot.accounts {
        if account.role != Role::Student && !account.role.is_faculty() {
            continue;
        }
        if account.department.is_none() {
            discrepancies.accounts_without_department += 1;
        }
        note_label(&mut discrepancies, account.department.as_deref(), aliases);
        let group = attribute_account(account, aliases);

        if account.role.is_faculty() {
            faculty.push(Attributed {
                group,
                record: account.clone(),
            });
            continue;
        }

        let fee = account
            .roll_number
            .as_deref()
            .map(roll_key)
            .filter(|key| by_roll.get(key).is_some_and(|owner| owner.id == account.id))
            .and_then(|key| fees_by_roll.get(&key))
            .map(|fee| (*fee).clone());
        let fee_status = fee
            .as_ref()
            .map(|f| f.status)
            .or(account.fee_status)
            .unwrap_or(FeeStatus::Pending);

        students.push(StudentDetail {
            account_id: account.id.clone(),
            roll_number: account.roll_number.clone(),
            name: account.name.clone(),
            group,
            attendance: account.attendance,
            average_marks: account.average_marks,
            band: classify(account.attendance, policy),
            defaulter: is_defaulter(account.attendance, policy),
            fee_status,
            fee,
        });
    }

    let achievements = snapshot
        .achievements
        .iter()
        .map(|achievement| {
            note_label(&mut discrepancies, achievement.department.as_deref(), aliases);
            if !accounts_by_id.contains_key(achievement.student_id.as_str()) {
                discrepancies.achievements_without_student += 1;
            }
            let group = attribute(achievement, &accounts_by_id, aliases);
            if group.is_none() {
                discrepancies.unattributed_achievements += 1;
            }
            Attributed {
                group,
                record: achievement.clone(),
            }
        })
        .collect();

    let fees = snapshot
        .fee_records
        .iter()
        .map(|fee| {
            let account = by_roll.get(&roll_key(&fee.roll_number)).copied();
            if account.is_none() {
                discrepancies.orphan_fee_records += 1;
            }
            Attributed {
                group: attribute_fee(fee, account, aliases),
                record: fee.clone(),
            }
        })
        .collect();

    log::info!(
        "Attributed {} students, {} faculty, {} achievements ({} unattributed), {} fee records ({} orphaned)",
        students.len(),
        faculty.len(),
        snapshot.achievements.len(),
        discrepancies.unattributed_achievements,
        snapshot.fee_records.len(),
        discrepancies.orphan_fee_records
    );

    Reconciled {
        students,
        faculty,
        achievements,
        fees,
        discrepancies,
    }
}
