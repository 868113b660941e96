use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate::Dashboard;
use crate::models::GroupStats;
use crate::normalize::AliasTable;
use crate::projector::{Scope, UNATTRIBUTED};

fn stats_row(output: &mut String, label: &str, stats: &GroupStats) {
    let _ = writeln!(
        output,
        "| {} | {} | {} | {:.1}% | {} | {}% | {:.2} | {:.2} | {} |",
        label,
        stats.student_count,
        stats.faculty_count,
        stats.average_attendance,
        stats.defaulter_count,
        stats.payment_rate,
        stats.paid_amount,
        stats.due_amount,
        stats.achievement_count
    );
}

pub fn build_report(
    dashboard: &Dashboard,
    aliases: &AliasTable,
    scope: &Scope,
    generated_on: NaiveDate,
) -> String {
    let mut output = String::new();
    let scope_label = match scope {
        Scope::All => "all departments".to_string(),
        Scope::Group(id) => aliases.display_name(id).to_string(),
        Scope::Unattributed => "unattributed records".to_string(),
    };

    let _ = writeln!(output, "# College Dashboard Report");
    let _ = writeln!(output, "Generated for {} on {}", scope_label, generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Departments");
    let _ = writeln!(
        output,
        "| Department | Students | Faculty | Avg attendance | Defaulters | Paid rate | Collected | Due | Achievements |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");

    let show_groups = !matches!(scope, Scope::Unattributed);
    for (id, stats) in &dashboard.per_group {
        if !show_groups || matches!(scope, Scope::Group(only) if only != id) {
            continue;
        }
        stats_row(&mut output, aliases.display_name(id), stats);
    }
    if !matches!(scope, Scope::Group(_)) {
        stats_row(&mut output, UNATTRIBUTED, &dashboard.unattributed);
    }
    if matches!(scope, Scope::All) {
        stats_row(&mut output, "**All**", &dashboard.global);
    }

    let summary = scope.summary(dashboard);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");
    let _ = writeln!(
        output,
        "- Excellent: {}, Good: {}, Poor: {} (defaulters: {})",
        summary.excellent_count, summary.good_count, summary.poor_count, summary.defaulter_count
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Fees");
    let _ = writeln!(
        output,
        "- Paid: {}, Partial: {}, Pending: {}, Overdue: {}",
        summary.paid_count, summary.partial_count, summary.pending_count, summary.overdue_count
    );
    let _ = writeln!(
        output,
        "- Collected {:.2} of {:.2} ({}%), {:.2} outstanding across {} records",
        summary.paid_amount,
        summary.total_fees,
        summary.collection_rate,
        summary.due_amount,
        summary.fee_record_count
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Achievement Review");
    if summary.achievement_count == 0 {
        let _ = writeln!(output, "No achievements recorded.");
    } else {
        let _ = writeln!(
            output,
            "- Approved: {}, Pending: {}, Rejected: {}",
            summary.approved_achievements,
            summary.pending_achievements,
            summary.rejected_achievements
        );
        let mut categories: Vec<(&String, &usize)> =
            summary.achievement_categories.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in categories {
            let _ = writeln!(output, "- {}: {}", category, count);
        }
    }

    let discrepancies = &dashboard.discrepancies;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Quality");
    let _ = writeln!(
        output,
        "- Accounts without department: {}",
        discrepancies.accounts_without_department
    );
    let _ = writeln!(
        output,
        "- Achievements without a matching student: {}",
        discrepancies.achievements_without_student
    );
    let _ = writeln!(
        output,
        "- Unattributed achievements: {}",
        discrepancies.unattributed_achievements
    );
    let _ = writeln!(
        output,
        "- Fee records without a matching account: {}",
        discrepancies.orphan_fee_records
    );
    let _ = writeln!(
        output,
        "- Duplicate roll numbers: {}",
        discrepancies.duplicate_roll_numbers
    );
    if discrepancies.unknown_labels.is_empty() {
        let _ = writeln!(output, "- Every department label matched the alias table.");
    } else {
        let _ = writeln!(output, "- Unknown department labels:");
        for (label, count) in &discrepancies.unknown_labels {
            let _ = writeln!(output, "  - \"{}\" ({} records)", label, count);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::ingest::seed;
    use crate::pipeline::run;
    use crate::store::SnapshotStore;

    async fn seeded() -> (Dashboard, PipelineConfig) {
        let store = SnapshotStore::default();
        let config = PipelineConfig::default();
        seed(&store, &config.store).await.unwrap();
        let run = run(&store, &config).await.unwrap();
        (run.dashboard, config)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn full_report_labels_unattributed_bucket() {
        let (dashboard, config) = seeded().await;
        let report = build_report(&dashboard, &config.aliases, &Scope::All, today());
        assert!(report.contains("Generated for all departments on 2026-01-15"));
        assert!(report.contains("| Computer Science and Engineering | 2 |"));
        assert!(report.contains("| Unattributed | 1 |"));
        assert!(report.contains("| **All** | 6 |"));
        assert!(report.contains("Fee records without a matching account: 1"));
    }

    #[tokio::test]
    async fn department_report_hides_other_rows() {
        let (dashboard, config) = seeded().await;
        let scope = Scope::Group("cse".into());
        let report = build_report(&dashboard, &config.aliases, &scope, today());
        assert!(report.contains("Generated for Computer Science and Engineering"));
        assert!(!report.contains("| Mechanical Engineering |"));
        assert!(!report.contains("| Unattributed |"));
        assert!(report.contains("- Approved: 2, Pending: 0, Rejected: 0"));
    }

    #[test]
    fn unknown_labels_are_listed() {
        let mut dashboard = Dashboard::default();
        dashboard
            .discrepancies
            .unknown_labels
            .insert("Robotics".into(), 3);
        let report = build_report(
            &dashboard,
            &PipelineConfig::default().aliases,
            &Scope::All,
            today(),
        );
        assert!(report.contains("\"Robotics\" (3 records)"));
        assert!(report.contains("No achievements recorded."));
    }
}
