use serde::Serialize;

use crate::aggregate::Dashboard;
use crate::attribution::Reconciled;
use crate::config::AttendancePolicy;
use crate::models::{AttendanceBand, GroupStats, StudentDetail};

pub const UNATTRIBUTED: &str = "Unattributed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AttendanceFilter {
    All,
    Defaulters,
    Excellent,
    Good,
    Poor,
}

impl AttendanceFilter {
    fn admits(self, student: &StudentDetail) -> bool {
        match self {
            Self::All => true,
            Self::Defaulters => student.defaulter,
            Self::Excellent => student.band == AttendanceBand::Excellent,
            Self::Good => student.band == AttendanceBand::Good,
            Self::Poor => student.band == AttendanceBand::Poor,
        }
    }
}

/// Which slice of the college a report covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Group(String),
    Unattributed,
}

impl Scope {
    fn admits(&self, group: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Group(id) => group == Some(id.as_str()),
            Self::Unattributed => group.is_none(),
        }
    }

    pub fn summary(&self, dashboard: &Dashboard) -> GroupStats {
        match self {
            Self::All => dashboard.global.clone(),
            Self::Group(id) => dashboard.group(id),
            Self::Unattributed => dashboard.unattributed.clone(),
        }
    }
}

/// Flat rows plus the stats of the scope they were cut from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection<R> {
    pub rows: Vec<R>,
    pub summary: GroupStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Total Days")]
    pub total_days: u32,
    #[serde(rename = "Present Days")]
    pub present_days: u32,
    #[serde(rename = "Absent Days")]
    pub absent_days: u32,
    #[serde(rename = "Late Days")]
    pub late_days: u32,
    #[serde(rename = "Attendance %")]
    pub attendance_percent: f64,
    #[serde(rename = "Status")]
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeRow {
    #[serde(rename = "Roll Number")]
    pub roll_number: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Total")]
    pub total: f64,
    #[serde(rename = "Paid")]
    pub paid: f64,
    #[serde(rename = "Due")]
    pub due: f64,
    #[serde(rename = "Status")]
    pub status: &'static str,
}

/// Split a year of `academic_days` into present/absent/late days.
///
/// Late days are an estimate: a fixed share of absences, not a measurement.
pub fn attendance_days(attendance: f64, policy: &AttendancePolicy) -> (u32, u32, u32) {
    let total = policy.academic_days;
    let present = ((attendance / 100.0 * total as f64).round() as u32).min(total);
    let absent = total - present;
    let late = (absent as f64 * policy.late_share).floor() as u32;
    (present, absent, late)
}

pub fn attendance_row(student: &StudentDetail, policy: &AttendancePolicy) -> AttendanceRow {
    let (present_days, absent_days, late_days) = attendance_days(student.attendance, policy);
    AttendanceRow {
        id: student
            .roll_number
            .clone()
            .unwrap_or_else(|| student.account_id.clone()),
        name: student.name.clone(),
        total_days: policy.academic_days,
        present_days,
        absent_days,
        late_days,
        attendance_percent: student.attendance,
        status: student.band.label(),
    }
}

pub fn project(
    reconciled: &Reconciled,
    dashboard: &Dashboard,
    scope: &Scope,
    filter: AttendanceFilter,
    policy: &AttendancePolicy,
) -> Projection<AttendanceRow> {
    let rows = reconciled
        .students
        .iter()
        .filter(|s| scope.admits(s.group.as_deref()) && filter.admits(s))
        .map(|s| attendance_row(s, policy))
        .collect();
    Projection {
        rows,
        summary: scope.summary(dashboard),
    }
}

/// One row per student in scope; orphan fee records are listed too when the
/// scope includes unattributed records.
pub fn project_fees(
    reconciled: &Reconciled,
    dashboard: &Dashboard,
    scope: &Scope,
) -> Projection<FeeRow> {
    let department = |group: Option<&str>| group.unwrap_or(UNATTRIBUTED).to_string();

    let mut rows: Vec<FeeRow> = reconciled
        .students
        .iter()
        .filter(|s| scope.admits(s.group.as_deref()))
        .map(|s| {
            let (total, paid, due) = s
                .fee
                .as_ref()
                .map(|f| (f.total, f.paid, f.due))
                .unwrap_or((0.0, 0.0, 0.0));
            FeeRow {
                roll_number: s.roll_number.clone().unwrap_or_default(),
                name: s.name.clone(),
                department: department(s.group.as_deref()),
                total,
                paid,
                due,
                status: s.fee_status.label(),
            }
        })
        .collect();

    let linked: std::collections::HashSet<&str> = reconciled
        .students
        .iter()
        .filter_map(|s| s.fee.as_ref().map(|f| f.roll_number.as_str()))
        .collect();
    rows.extend(
        reconciled
            .fees
            .iter()
            .filter(|f| f.group.is_none() && scope.admits(None))
            .filter(|f| !linked.contains(f.record.roll_number.as_str()))
            .map(|f| FeeRow {
                roll_number: f.record.roll_number.clone(),
                name: String::new(),
                department: UNATTRIBUTED.to_string(),
                total: f.record.total,
                paid: f.record.paid,
                due: f.record.due,
                status: f.record.status.label(),
            }),
    );

    Projection {
        rows,
        summary: scope.summary(dashboard),
    }
}
