use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::config::StoreLayout;
use crate::error::StoreError;
use crate::models::{Account, Achievement, AchievementStatus, FeeRecord, FeeStatus, Role};
use crate::store::{child_path, DocumentStore, StoreRead};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Accounts,
    Achievements,
    Fees,
}

impl EntityKind {
    pub fn all() -> BTreeSet<EntityKind> {
        [Self::Accounts, Self::Achievements, Self::Fees]
            .into_iter()
            .collect()
    }
}

/// Raw records of one pipeline run, decoded but not yet interpreted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub accounts: Vec<Account>,
    pub achievements: Vec<Achievement>,
    pub fee_records: Vec<FeeRecord>,
}

/// One full-collection read per requested kind, issued concurrently.
///
/// Absent collections load as empty; any store failure aborts the load.
pub async fn load_all(
    store: &dyn DocumentStore,
    layout: &StoreLayout,
    kinds: &BTreeSet<EntityKind>,
) -> Result<Snapshot, StoreError> {
    let (accounts, achievements, fee_records) = tokio::try_join!(
        async {
            if !kinds.contains(&EntityKind::Accounts) {
                return Ok(Vec::new());
            }
            let read = store.read(&layout.accounts).await?;
            Ok::<Vec<Account>, StoreError>(
                records(&layout.accounts, read)
                    .into_iter()
                    .map(|(id, fields)| decode_account(id, &fields))
                    .collect(),
            )
        },
        async {
            if !kinds.contains(&EntityKind::Achievements) {
                return Ok(Vec::new());
            }
            let read = store.read(&layout.achievements).await?;
            Ok::<Vec<Achievement>, StoreError>(
                records(&layout.achievements, read)
                    .into_iter()
                    .map(|(id, fields)| decode_achievement(id, &fields))
                    .collect(),
            )
        },
        async {
            if !kinds.contains(&EntityKind::Fees) {
                return Ok(Vec::new());
            }
            load_fee_records(store, &layout.fee_locations).await
        },
    )?;

    log::info!(
        "Loaded {} accounts, {} achievements, {} fee records",
        accounts.len(),
        achievements.len(),
        fee_records.len()
    );

    Ok(Snapshot {
        accounts,
        achievements,
        fee_records,
    })
}

/// Read every fee location and keep at most one record per roll number.
/// Earlier locations win; conflicting values are never merged.
pub async fn load_fee_records(
    store: &dyn DocumentStore,
    locations: &[String],
) -> Result<Vec<FeeRecord>, StoreError> {
    let reads = store.read_many(locations).await?;

    let mut seen = HashSet::new();
    let mut fees = Vec::new();
    for (location, read) in locations.iter().zip(reads) {
        for (roll_number, fields) in records(location, read) {
            if !seen.insert(roll_key(&roll_number)) {
                log::debug!("Fee record {roll_number} in {location} shadowed by an earlier location");
                continue;
            }
            fees.push(decode_fee(roll_number, location, &fields));
        }
    }
    Ok(fees)
}

/// Probe the fee locations for one roll number, stopping at the first
/// location that holds it.
///
/// The exact key is tried first; when absent, the location is scanned for a
/// key with the same `roll_key` before moving on. A non-object value under
/// the exact key still counts as present and ends the probe.
pub async fn probe_fee_record(
    store: &dyn DocumentStore,
    locations: &[String],
    roll_number: &str,
) -> Result<Option<FeeRecord>, StoreError> {
    let roll_number = roll_number.trim();
    let key = roll_key(roll_number);
    for location in locations {
        let read = store.read(&child_path(location, roll_number)).await?;
        if read.exists {
            let Value::Object(fields) = read.value else {
                log::warn!("Fee record {location}/{roll_number} is not an object; ignoring it");
                return Ok(None);
            };
            return Ok(Some(decode_fee(roll_number.to_string(), location, &fields)));
        }

        let collection = store.read(location).await?;
        if let Some((stored, fields)) = records(location, collection)
            .into_iter()
            .find(|(stored, _)| roll_key(stored) == key)
        {
            return Ok(Some(decode_fee(stored, location, &fields)));
        }
    }
    Ok(None)
}

/// Join key for roll numbers: trimmed and case-insensitive.
pub fn roll_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// `(id, fields)` pairs of a collection stored either as an object keyed by
/// id or as an array. Non-object entries are skipped.
fn records(collection: &str, read: StoreRead) -> Vec<(String, Map<String, Value>)> {
    let entries: Vec<(String, Value)> = match read.value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Null => return Vec::new(),
        _ => {
            log::warn!("'{collection}' holds a scalar, not a collection; ignoring it");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(id, value)| match value {
            Value::Object(fields) => Some((id, fields)),
            Value::Null => None,
            _ => {
                log::warn!("Skipping non-object record {collection}/{id}");
                None
            }
        })
        .collect()
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let value = match fields.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

fn number(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match fields.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|n| n.is_finite())
}

fn first_number(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| number(fields, key))
}

fn percentage(fields: &Map<String, Value>, key: &str) -> f64 {
    number(fields, key).unwrap_or(0.0).clamp(0.0, 100.0)
}

pub fn decode_account(id: String, fields: &Map<String, Value>) -> Account {
    Account {
        role: text(fields, "role")
            .map(|r| Role::parse(&r))
            .unwrap_or(Role::Other(String::new())),
        name: text(fields, "name").unwrap_or_default(),
        department: text(fields, "department"),
        roll_number: text(fields, "rollNumber"),
        attendance: percentage(fields, "attendance"),
        average_marks: percentage(fields, "averageMarks"),
        fee_status: text(fields, "feeStatus").and_then(|s| FeeStatus::parse(&s)),
        id,
    }
}

pub fn decode_achievement(id: String, fields: &Map<String, Value>) -> Achievement {
    Achievement {
        student_id: text(fields, "studentId").unwrap_or_default(),
        title: text(fields, "title").unwrap_or_default(),
        category: text(fields, "category").unwrap_or_else(|| "Uncategorized".to_string()),
        status: AchievementStatus::parse(text(fields, "status").as_deref()),
        date: text(fields, "date")
            .and_then(|d| NaiveDate::parse_from_str(d.get(..10).unwrap_or(&d), "%Y-%m-%d").ok()),
        department: text(fields, "department"),
        id,
    }
}

/// Missing amounts count as 0; `due` falls back to `total - paid`, and the
/// status is derived from the amounts unless a known status is stored.
pub fn decode_fee(roll_number: String, source: &str, fields: &Map<String, Value>) -> FeeRecord {
    let total = first_number(fields, &["total", "totalFees"]).unwrap_or(0.0);
    let paid = first_number(fields, &["paid", "paidAmount"]).unwrap_or(0.0);
    let due = first_number(fields, &["due", "dueAmount"]).unwrap_or(total - paid);
    let status = text(fields, "status")
        .and_then(|s| FeeStatus::parse(&s))
        .unwrap_or_else(|| FeeStatus::derive(total, paid, due));

    FeeRecord {
        roll_number,
        source: source.to_string(),
        total,
        paid,
        due,
        status,
    }
}
