use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;

mod aggregate;
mod attribution;
mod config;
mod db;
mod error;
mod ingest;
mod loader;
mod models;
mod normalize;
mod pipeline;
mod projector;
mod report;
mod store;

use config::PipelineConfig;
use projector::{AttendanceFilter, Scope};
use store::{DocumentStore, SnapshotStore};

#[derive(Parser)]
#[command(name = "college-dashboard")]
#[command(about = "Department dashboards reconciled from the college document store", long_about = None)]
struct Cli {
    /// Read and write a JSON snapshot instead of Postgres (DATABASE_URL)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,
    /// Alias table and policy constants (TOML); built-in table when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Named document tree inside Postgres
    #[arg(long, global = true, default_value = "default")]
    tree: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import achievements from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the alias table and fail on overlapping aliases
    CheckConfig,
    /// Per-department, unattributed and global statistics
    Dashboard {
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        department: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export rows as CSV
    Export {
        #[arg(value_enum)]
        kind: ExportKind,
        #[arg(long, value_enum, default_value_t = AttendanceFilter::All)]
        filter: AttendanceFilter,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Look up one student by roll number
    Student {
        #[arg(long)]
        roll: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    Attendance,
    Fees,
}

enum Backend {
    Snapshot { store: SnapshotStore, path: PathBuf },
    Postgres(db::PgDocumentStore),
}

impl Backend {
    async fn open(cli: &Cli) -> anyhow::Result<Self> {
        if let Some(path) = &cli.snapshot {
            let store = SnapshotStore::open(path)
                .with_context(|| format!("failed to open snapshot {}", path.display()))?;
            return Ok(Self::Snapshot {
                store,
                path: path.clone(),
            });
        }

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set unless --snapshot is given")?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self::Postgres(db::PgDocumentStore::with_tree(pool, &cli.tree)))
    }

    fn store(&self) -> &dyn DocumentStore {
        match self {
            Self::Snapshot { store, .. } => store,
            Self::Postgres(store) => store,
        }
    }

    /// Persist writes; Postgres commits per write already.
    async fn flush(&self) -> anyhow::Result<()> {
        if let Self::Snapshot { store, path } = self {
            store.save(path).await?;
        }
        Ok(())
    }
}

fn scope_for(department: Option<&str>, config: &PipelineConfig) -> anyhow::Result<Scope> {
    match pipeline::resolve_scope(department, &config.aliases) {
        Some(scope) => Ok(scope),
        None => bail!(
            "unknown department '{}'; add it to the alias table or use 'unattributed'",
            department.unwrap_or_default()
        ),
    }
}

fn write_csv<R: Serialize>(rows: &[R], out: Option<&Path>) -> anyhow::Result<()> {
    let sink: Box<dyn std::io::Write> = match out {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut writer = csv::Writer::from_writer(sink);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = pipeline::configure(cli.config.as_deref())?;

    if let Commands::CheckConfig = cli.command {
        for department in config.aliases.departments() {
            println!(
                "{} ({}): {}",
                department.id,
                config.aliases.display_name(&department.id),
                department.aliases.join(", ")
            );
        }
        let overlaps = config.aliases.overlaps();
        if !overlaps.is_empty() {
            for overlap in overlaps {
                println!(
                    "overlap: '{}' claimed by '{}' and '{}' ('{}' wins)",
                    overlap.alias, overlap.winner, overlap.shadowed, overlap.winner
                );
            }
            bail!("{} overlapping aliases", overlaps.len());
        }
        println!("Alias table OK.");
        return Ok(());
    }

    let backend = Backend::open(&cli).await?;
    let store = backend.store();

    match cli.command {
        Commands::CheckConfig => {}
        Commands::InitDb => match &backend {
            Backend::Postgres(pg) => {
                db::init_db(pg.pool()).await?;
                println!("Schema ready.");
            }
            Backend::Snapshot { .. } => bail!("init-db applies to Postgres only"),
        },
        Commands::Seed => {
            ingest::seed(store, &config.store).await?;
            backend.flush().await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = ingest::import_csv(store, &config.store, &csv).await?;
            backend.flush().await?;
            println!("Inserted {inserted} achievements from {}.", csv.display());
        }
        Commands::Dashboard { department, json } => {
            let scope = scope_for(department.as_deref(), &config)?;
            let run = pipeline::run(store, &config).await?;
            let dashboard = &run.dashboard;

            if json {
                match &scope {
                    Scope::All => println!("{}", serde_json::to_string_pretty(dashboard)?),
                    _ => println!("{}", serde_json::to_string_pretty(&scope.summary(dashboard))?),
                }
                return Ok(());
            }

            let print = |label: &str, stats: &models::GroupStats| {
                println!(
                    "- {}: {} students, {} faculty, attendance {:.1}% ({} defaulters), paid rate {}%, due {:.2}, {} achievements",
                    label,
                    stats.student_count,
                    stats.faculty_count,
                    stats.average_attendance,
                    stats.defaulter_count,
                    stats.payment_rate,
                    stats.due_amount,
                    stats.achievement_count
                );
            };
            match &scope {
                Scope::Group(id) => print(config.aliases.display_name(id), &dashboard.group(id)),
                Scope::Unattributed => print(projector::UNATTRIBUTED, &dashboard.unattributed),
                Scope::All => {
                    for (id, stats) in &dashboard.per_group {
                        print(config.aliases.display_name(id), stats);
                    }
                    print(projector::UNATTRIBUTED, &dashboard.unattributed);
                    print("All", &dashboard.global);
                }
            }
        }
        Commands::Report { department, out } => {
            let scope = scope_for(department.as_deref(), &config)?;
            let run = pipeline::run(store, &config).await?;
            let report = report::build_report(
                &run.dashboard,
                &config.aliases,
                &scope,
                Utc::now().date_naive(),
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            kind,
            filter,
            department,
            out,
        } => {
            let scope = scope_for(department.as_deref(), &config)?;
            let run = pipeline::run(store, &config).await?;
            let count = match kind {
                ExportKind::Attendance => {
                    let projection = projector::project(
                        &run.reconciled,
                        &run.dashboard,
                        &scope,
                        filter,
                        &config.policy,
                    );
                    write_csv(&projection.rows, out.as_deref())?;
                    projection.rows.len()
                }
                ExportKind::Fees => {
                    let projection =
                        projector::project_fees(&run.reconciled, &run.dashboard, &scope);
                    write_csv(&projection.rows, out.as_deref())?;
                    projection.rows.len()
                }
            };
            if let Some(out) = &out {
                println!("Exported {count} rows to {}.", out.display());
            }
        }
        Commands::Student { roll } => {
            let Some(lookup) = pipeline::lookup_student(store, &config, &roll).await? else {
                println!("No student with roll number {roll}.");
                return Ok(());
            };
            let detail = &lookup.detail;
            let (present, absent, late) =
                projector::attendance_days(detail.attendance, &config.policy);
            println!(
                "{} ({}) - {}",
                detail.name,
                detail.roll_number.as_deref().unwrap_or(&roll),
                detail
                    .group
                    .as_deref()
                    .map(|g| config.aliases.display_name(g))
                    .unwrap_or(projector::UNATTRIBUTED)
            );
            println!(
                "Attendance {:.1}% ({}): {present} present, {absent} absent, ~{late} late",
                detail.attendance,
                detail.band.label()
            );
            println!("Average marks {:.1}", detail.average_marks);
            match &detail.fee {
                Some(fee) => println!(
                    "Fees {}: paid {:.2} of {:.2}, due {:.2} (from {})",
                    fee.status.label(),
                    fee.paid,
                    fee.total,
                    fee.due,
                    fee.source
                ),
                None => println!("Fees {}: no fee record", detail.fee_status.label()),
            }
            if lookup.achievements.is_empty() {
                println!("No achievements recorded.");
            }
            for achievement in &lookup.achievements {
                let record = &achievement.record;
                println!(
                    "- {} [{}] {:?}{}",
                    record.title,
                    record.category,
                    record.status,
                    record
                        .date
                        .map(|d| format!(" on {d}"))
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
