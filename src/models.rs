use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Hod,
    Principal,
    Admin,
    Clerk,
    AccountsAssistant,
    CivilSupervisor,
    Other(String),
}

impl Role {
    /// Case-insensitive; `_`, `-` and spaces are ignored.
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "student" => Self::Student,
            "teacher" | "faculty" => Self::Teacher,
            "hod" => Self::Hod,
            "principal" => Self::Principal,
            "admin" => Self::Admin,
            "clerk" => Self::Clerk,
            "accountsassistant" => Self::AccountsAssistant,
            "civilsupervisor" => Self::CivilSupervisor,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn is_faculty(&self) -> bool {
        matches!(self, Self::Teacher | Self::Hod)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Paid,
    Partial,
    Pending,
    Overdue,
}

impl FeeStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "paid" => Some(Self::Paid),
            "partial" => Some(Self::Partial),
            "pending" => Some(Self::Pending),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    /// Status implied by the amounts. Never yields `Overdue`; only a stored
    /// status can mark a record overdue.
    pub fn derive(total: f64, paid: f64, due: f64) -> Self {
        if due <= 0.0 {
            Self::Paid
        } else if paid == 0.0 && due == total {
            Self::Pending
        } else {
            Self::Partial
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Partial => "partial",
            Self::Pending => "pending",
            Self::Overdue => "overdue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Pending,
    Approved,
    Rejected,
}

impl AchievementStatus {
    /// Unknown or missing statuses are still awaiting review.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("approved") => Self::Approved,
            Some("rejected") => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceBand {
    Excellent,
    Good,
    Poor,
}

impl AttendanceBand {
    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Poor => "Poor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub department: Option<String>,
    pub roll_number: Option<String>,
    /// Percentage in `0..=100`; 0 when never recorded.
    pub attendance: f64,
    pub average_marks: f64,
    pub fee_status: Option<FeeStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Achievement {
    pub id: String,
    pub student_id: String,
    pub title: String,
    pub category: String,
    pub status: AchievementStatus,
    pub date: Option<NaiveDate>,
    /// Only present on records written after departments were denormalized.
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeRecord {
    pub roll_number: String,
    /// Store location the record was read from.
    pub source: String,
    pub total: f64,
    pub paid: f64,
    pub due: f64,
    pub status: FeeStatus,
}

/// A record together with the canonical department it was attributed to.
/// `group` is `None` for unattributed records.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributed<T> {
    pub group: Option<String>,
    pub record: T,
}

/// Per-student view assembled from the account and its fee record.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentDetail {
    pub account_id: String,
    pub roll_number: Option<String>,
    pub name: String,
    pub group: Option<String>,
    pub attendance: f64,
    pub average_marks: f64,
    pub band: AttendanceBand,
    pub defaulter: bool,
    pub fee_status: FeeStatus,
    pub fee: Option<FeeRecord>,
}

/// Data conditions found while reconciling. None of these abort a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancies {
    /// Department labels that matched no alias, with occurrence counts.
    pub unknown_labels: BTreeMap<String, usize>,
    pub accounts_without_department: usize,
    pub achievements_without_student: usize,
    pub unattributed_achievements: usize,
    pub orphan_fee_records: usize,
    pub duplicate_roll_numbers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub student_count: usize,
    pub faculty_count: usize,
    pub total_fees: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    pub fee_record_count: usize,
    pub paid_count: usize,
    pub partial_count: usize,
    pub pending_count: usize,
    pub overdue_count: usize,
    pub payment_rate: u32,
    pub collection_rate: u32,
    pub average_attendance: f64,
    pub defaulter_count: usize,
    pub excellent_count: usize,
    pub good_count: usize,
    pub poor_count: usize,
    pub achievement_count: usize,
    pub approved_achievements: usize,
    pub pending_achievements: usize,
    pub rejected_achievements: usize,
    pub achievement_categories: BTreeMap<String, usize>,
}
