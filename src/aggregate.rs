use std::collections::BTreeMap;

use serde::Serialize;

use crate::attribution::Reconciled;
use crate::models::{
    Account, Achievement, AchievementStatus, AttendanceBand, Discrepancies, FeeRecord, FeeStatus,
    GroupStats, StudentDetail,
};

/// Everything a dashboard renders: one entry per canonical department, the
/// unattributed bucket, and the global totals.
///
/// Every count satisfies `sum(per_group) + unattributed == global`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub per_group: BTreeMap<String, GroupStats>,
    pub unattributed: GroupStats,
    pub global: GroupStats,
    pub discrepancies: Discrepancies,
}

/// Share of `part` in `whole` as a whole percentage in `0..=100`.
pub fn percent(part: f64, whole: f64) -> u32 {
    if whole <= 0.0 {
        return 0;
    }
    (part / whole * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Students without a fee record already count as pending, so every
/// student is part of the denominator.
pub fn payment_rate(stats: &GroupStats) -> u32 {
    let known = stats.paid_count + stats.partial_count + stats.pending_count + stats.overdue_count;
    percent(stats.paid_count as f64, known as f64)
}

#[derive(Debug, Default)]
struct Accumulator {
    stats: GroupStats,
    attendance_sum: f64,
}

impl Accumulator {
    fn add_student(&mut self, student: &StudentDetail) {
        let stats = &mut self.stats;
        stats.student_count += 1;
        self.attendance_sum += student.attendance;

        match student.band {
            AttendanceBand::Excellent => stats.excellent_count += 1,
            AttendanceBand::Good => stats.good_count += 1,
            AttendanceBand::Poor => stats.poor_count += 1,
        }
        if student.defaulter {
            stats.defaulter_count += 1;
        }

        match student.fee_status {
            FeeStatus::Paid => stats.paid_count += 1,
            FeeStatus::Partial => stats.partial_count += 1,
            FeeStatus::Pending => stats.pending_count += 1,
            FeeStatus::Overdue => stats.overdue_count += 1,
        }
    }

    fn add_faculty(&mut self, _account: &Account) {
        self.stats.faculty_count += 1;
    }

    fn add_achievement(&mut self, achievement: &Achievement) {
        let stats = &mut self.stats;
        stats.achievement_count += 1;
        match achievement.status {
            AchievementStatus::Approved => stats.approved_achievements += 1,
            AchievementStatus::Pending => stats.pending_achievements += 1,
            AchievementStatus::Rejected => stats.rejected_achievements += 1,
        }
        *stats
            .achievement_categories
            .entry(achievement.category.clone())
            .or_default() += 1;
    }

    fn add_fee(&mut self, fee: &FeeRecord) {
        let stats = &mut self.stats;
        stats.fee_record_count += 1;
        stats.total_fees += fee.total;
        stats.paid_amount += fee.paid;
        stats.due_amount += fee.due;
    }

    fn finish(self) -> GroupStats {
        let mut stats = self.stats;
        stats.average_attendance = if stats.student_count == 0 {
            0.0
        } else {
            self.attendance_sum / stats.student_count as f64
        };
        stats.payment_rate = payment_rate(&stats);
        stats.collection_rate = percent(stats.paid_amount, stats.total_fees);
        stats
    }
}

struct Buckets {
    groups: BTreeMap<String, Accumulator>,
    unattributed: Accumulator,
    global: Accumulator,
}

impl Buckets {
    /// The group's bucket (or the unattributed one) plus the global bucket.
    fn pick(&mut self, group: Option<&str>) -> (&mut Accumulator, &mut Accumulator) {
        let bucket = match group {
            Some(id) => self.groups.entry(id.to_string()).or_default(),
            None => &mut self.unattributed,
        };
        (bucket, &mut self.global)
    }
}

/// Fold attributed records into per-group and global statistics in one pass
/// over each record set.
pub fn aggregate(reconciled: &Reconciled) -> Dashboard {
    let mut buckets = Buckets {
        groups: BTreeMap::new(),
        unattributed: Accumulator::default(),
        global: Accumulator::default(),
    };

    for student in &reconciled.students {
        let (bucket, global) = buckets.pick(student.group.as_deref());
        bucket.add_student(student);
        global.add_student(student);
    }
    for member in &reconciled.faculty {
        let (bucket, global) = buckets.pick(member.group.as_deref());
        bucket.add_faculty(&member.record);
        global.add_faculty(&member.record);
    }
    for achievement in &reconciled.achievements {
        let (bucket, global) = buckets.pick(achievement.group.as_deref());
        bucket.add_achievement(&achievement.record);
        global.add_achievement(&achievement.record);
    }
    for fee in &reconciled.fees {
        let (bucket, global) = buckets.pick(fee.group.as_deref());
        bucket.add_fee(&fee.record);
        global.add_fee(&fee.record);
    }

    let per_group: BTreeMap<String, GroupStats> = buckets
        .groups
        .into_iter()
        .map(|(id, acc)| (id, acc.finish()))
        .collect();
    log::info!("Aggregated {} departments", per_group.len());

    Dashboard {
        per_group,
        unattributed: buckets.unattributed.finish(),
        global: buckets.global.finish(),
        discrepancies: reconciled.discrepancies.clone(),
    }
}

impl Dashboard {
    /// Stats for one canonical department, zeroed when it has no records.
    pub fn group(&self, id: &str) -> GroupStats {
        self.per_group.get(id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::reconcile;
    use crate::attribution::tests::{account, achievement, fee, student};
    use crate::config::PipelineConfig;
    use crate::loader::Snapshot;
    use crate::models::Role;

    fn dashboard(snapshot: &Snapshot) -> Dashboard {
        aggregate(&reconcile(snapshot, &PipelineConfig::default()))
    }

    fn mixed_snapshot() -> Snapshot {
        let mut overdue = student("4", Some("ece"), 77.0);
        overdue.fee_status = Some(FeeStatus::Overdue);
        overdue.roll_number = None;
        Snapshot {
            accounts: vec![
                student("1", Some("CSE"), 92.0),
                student("2", Some("Computer Science and Engineering"), 60.0),
                student("3", None, 81.0),
                overdue,
                student("5", Some("Quantum Studies"), 95.0),
                account("t1", Role::Teacher, Some("cse")),
                account("h1", Role::Hod, Some("ECE")),
                account("t2", Role::Teacher, None),
                account("c1", Role::Clerk, Some("cse")),
            ],
            achievements: vec![
                achievement("a1", "1", None),
                achievement("a2", "2", Some("ece")),
                achievement("a3", "3", None),
                achievement("a4", "missing", None),
            ],
            fee_records: vec![
                fee("R1", 50_000.0, 50_000.0),
                fee("R2", 50_000.0, 10_000.0),
                fee("R3", 40_000.0, 0.0),
                fee("R900", 30_000.0, 30_000.0),
            ],
        }
    }

    #[test]
    fn department_scenario_from_aliases() {
        let snapshot = Snapshot {
            accounts: vec![
                student("1", Some("CSE"), 92.0),
                student("2", Some("Computer Science and Engineering"), 60.0),
            ],
            ..Snapshot::default()
        };
        let cse = dashboard(&snapshot).group("cse");
        assert_eq!(cse.student_count, 2);
        assert_eq!(cse.average_attendance, 76.0);
        assert_eq!(cse.excellent_count, 1);
        assert_eq!(cse.good_count, 0);
        assert_eq!(cse.poor_count, 1);
        assert_eq!(cse.defaulter_count, 1);
    }

    #[test]
    fn counts_are_conserved_across_buckets() {
        let dashboard = dashboard(&mixed_snapshot());
        let sum = |f: fn(&GroupStats) -> usize| {
            dashboard.per_group.values().map(f).sum::<usize>() + f(&dashboard.unattributed)
        };

        assert_eq!(sum(|s| s.student_count), dashboard.global.student_count);
        assert_eq!(sum(|s| s.faculty_count), dashboard.global.faculty_count);
        assert_eq!(sum(|s| s.achievement_count), dashboard.global.achievement_count);
        assert_eq!(sum(|s| s.fee_record_count), dashboard.global.fee_record_count);
        assert_eq!(sum(|s| s.paid_count), dashboard.global.paid_count);
        assert_eq!(sum(|s| s.defaulter_count), dashboard.global.defaulter_count);

        assert_eq!(dashboard.global.student_count, 5);
        assert_eq!(dashboard.global.faculty_count, 3);
        assert_eq!(dashboard.unattributed.student_count, 2);
        assert_eq!(dashboard.unattributed.faculty_count, 1);
    }

    #[test]
    fn orphan_fees_stay_in_global_totals() {
        let dashboard = dashboard(&mixed_snapshot());
        assert_eq!(dashboard.global.total_fees, 170_000.0);
        assert_eq!(dashboard.unattributed.total_fees, 70_000.0);
        assert_eq!(dashboard.unattributed.fee_record_count, 2);
        let per_group_total: f64 = dashboard.per_group.values().map(|s| s.total_fees).sum();
        assert_eq!(per_group_total + dashboard.unattributed.total_fees, 170_000.0);
    }

    #[test]
    fn fee_statuses_and_rates() {
        let dashboard = dashboard(&mixed_snapshot());
        let cse = dashboard.group("cse");
        assert_eq!(cse.paid_count, 1);
        assert_eq!(cse.partial_count, 1);
        assert_eq!(cse.payment_rate, 50);
        assert_eq!(cse.collection_rate, 60);
        assert_eq!(cse.faculty_count, 1);

        let ece = dashboard.group("ece");
        assert_eq!(ece.overdue_count, 1);
        assert_eq!(ece.payment_rate, 0);
        assert_eq!(ece.faculty_count, 1);

        // student 3 has a pending fee record, student 5 has none at all
        assert_eq!(dashboard.unattributed.pending_count, 2);
        assert_eq!(dashboard.global.payment_rate, 20);
    }

    #[test]
    fn achievements_follow_attribution() {
        let dashboard = dashboard(&mixed_snapshot());
        let cse = dashboard.group("cse");
        assert_eq!(cse.achievement_count, 1);
        assert_eq!(cse.approved_achievements, 1);
        assert_eq!(cse.achievement_categories.get("Technical"), Some(&1));
        assert_eq!(dashboard.group("ece").achievement_count, 1);
        assert_eq!(dashboard.unattributed.achievement_count, 2);
        assert_eq!(dashboard.global.achievement_count, 4);
    }

    #[test]
    fn empty_input_has_zero_rates() {
        let dashboard = dashboard(&Snapshot::default());
        assert!(dashboard.per_group.is_empty());
        assert_eq!(dashboard.global.average_attendance, 0.0);
        assert_eq!(dashboard.global.payment_rate, 0);
        assert_eq!(dashboard.global.collection_rate, 0);
    }

    #[test]
    fn payment_rate_stays_in_range() {
        let mut stats = GroupStats::default();
        assert_eq!(payment_rate(&stats), 0);
        stats.paid_count = 3;
        assert_eq!(payment_rate(&stats), 100);
        stats.pending_count = 1;
        stats.overdue_count = 2;
        assert_eq!(payment_rate(&stats), 50);
        stats.partial_count = 3;
        assert_eq!(payment_rate(&stats), 33);
    }

    #[test]
    fn aggregate_is_idempotent() {
        let reconciled = reconcile(&mixed_snapshot(), &PipelineConfig::default());
        assert_eq!(aggregate(&reconciled), aggregate(&reconciled));
    }
}
