use anyhow::Context;
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::config::StoreLayout;
use crate::store::{child_path, DocumentStore};

/// Write a small college: department labels in several spellings, legacy
/// achievements without a department, fee records split across locations.
pub async fn seed(store: &dyn DocumentStore, layout: &StoreLayout) -> anyhow::Result<()> {
    let accounts = vec![
        ("stu-001", "student", "Avery Lee", Some("CSE"), Some("21CS001"), 94.0),
        ("stu-002", "student", "Jules Moreno", Some("Computer Science and Engineering"), Some("21CS002"), 71.5),
        ("stu-003", "student", "Kiara Patel", Some("AI and DS"), Some("21AD001"), 83.0),
        ("stu-004", "student", "Rohan Das", Some("AIDS"), Some("21AD002"), 58.0),
        ("stu-005", "student", "Meera Nair", Some("Mechanical"), Some("21ME001"), 90.0),
        ("stu-006", "student", "Sam Okafor", None, Some("21XX001"), 77.0),
        ("fac-001", "teacher", "Dr. Anita Rao", Some("cse"), None, 0.0),
        ("fac-002", "hod", "Dr. Vikram Iyer", Some("Artificial Intelligence and Data Science"), None, 0.0),
        ("adm-001", "accounts_assistant", "Leela Menon", None, None, 0.0),
    ];

    for (id, role, name, department, roll, attendance) in accounts {
        let mut record = json!({ "role": role, "name": name });
        if let Some(department) = department {
            record["department"] = json!(department);
        }
        if let Some(roll) = roll {
            record["rollNumber"] = json!(roll);
            record["attendance"] = json!(attendance);
        }
        store
            .set(&child_path(&layout.accounts, id), record)
            .await
            .with_context(|| format!("failed to seed account {id}"))?;
    }

    let achievements = vec![
        ("ach-001", "stu-001", "Smart India Hackathon finalist", "Technical", "approved", "2025-09-14", None),
        ("ach-002", "stu-003", "Kaggle competition silver", "Competition", "pending", "2025-10-02", Some("AI and DS")),
        ("ach-003", "stu-004", "Inter-college football", "Sports", "approved", "2025-08-21", Some("CSE")),
        ("ach-004", "stu-999", "Paper at IEEE conference", "Research", "rejected", "2025-07-30", None),
    ];

    for (id, student_id, title, category, status, date, department) in achievements {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").context("invalid date")?;
        let mut record = json!({
            "studentId": student_id,
            "title": title,
            "category": category,
            "status": status,
            "date": date,
        });
        if let Some(department) = department {
            record["department"] = json!(department);
        }
        store
            .set(&child_path(&layout.achievements, id), record)
            .await
            .with_context(|| format!("failed to seed achievement {id}"))?;
    }

    let primary = layout
        .fee_locations
        .first()
        .context("no fee location configured")?;
    let legacy = layout.fee_locations.get(1).unwrap_or(primary);
    let fees = vec![
        (primary, "21CS001", json!({ "total": 85000, "paid": 85000 })),
        (primary, "21CS002", json!({ "total": 85000, "paid": 40000 })),
        (legacy, "21CS002", json!({ "totalFees": 85000, "paidAmount": 85000 })),
        (legacy, "21AD001", json!({ "totalFees": 90000, "paidAmount": 0 })),
        (primary, "21AD002", json!({ "total": 90000, "paid": 30000, "status": "overdue" })),
        (legacy, "21ME001", json!({ "totalFees": 80000, "paidAmount": 80000 })),
        (primary, "22XX404", json!({ "total": 60000, "paid": 15000 })),
    ];

    for (location, roll, record) in fees {
        store
            .set(&child_path(location, roll), record)
            .await
            .with_context(|| format!("failed to seed fee record {roll}"))?;
    }

    Ok(())
}

/// Push achievements from a CSV file; returns how many were imported.
pub async fn import_csv(
    store: &dyn DocumentStore,
    layout: &StoreLayout,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        title: String,
        category: String,
        status: Option<String>,
        date: NaiveDate,
        department: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad achievement row {}", line + 1))?;
        let mut record = json!({
            "studentId": row.student_id.trim(),
            "title": row.title.trim(),
            "category": row.category.trim(),
            "status": row.status.as_deref().map(str::trim).unwrap_or("pending"),
            "date": row.date.to_string(),
        });
        if let Some(department) = row.department.filter(|d| !d.trim().is_empty()) {
            record["department"] = Value::String(department.trim().to_string());
        }

        store.push(&layout.achievements, record).await?;
        inserted += 1;
    }

    Ok(inserted)
}
