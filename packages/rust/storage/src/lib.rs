//! libSQL storage layer for pipeline run history.
//!
//! The [`Storage`] struct wraps a local libSQL database holding one row per
//! run (completed or failed), the finalized members of completed runs, and
//! every cost ledger entry.
//!
//! **Access rules:**
//! - `buyergroup run --save`: read-write via [`Storage::open`]
//! - `buyergroup history` / `show`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info, instrument};

use buyergroup_shared::{BuyerGroupError, PipelineFailure, PipelineReport, Result, RunFlag};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Summary row for one persisted run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: String,
    pub identifier: String,
    pub company: Option<String>,
    pub status: String,
    pub stage: String,
    pub last_completed: Option<String>,
    pub member_count: usize,
    pub cohesion_score: Option<f64>,
    pub cohesion_level: Option<String>,
    pub total_cost: u64,
    pub failure_kind: Option<String>,
    pub failure_message: Option<String>,
    pub flags: Vec<RunFlag>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One finalized member of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub rank: usize,
    pub name: String,
    pub title: String,
    pub department: String,
    pub role: String,
    pub influence: f64,
    pub relevance: f64,
    pub confidence: f64,
    pub enriched: bool,
}

/// One persisted cost ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub seq: usize,
    pub kind: String,
    pub units: u64,
    pub succeeded: bool,
    pub detail: String,
    pub at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, identifier, company, status, stage, last_completed, member_count, \
     cohesion_score, cohesion_level, total_cost, failure_kind, failure_message, flags_json, \
     started_at, finished_at";

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BuyerGroupError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for browsing only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BuyerGroupError::Storage(format!(
                "no run history at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        BuyerGroupError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(BuyerGroupError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist a completed run with its members and cost entries.
    #[instrument(skip_all, fields(run_id = %report.run_id))]
    pub async fn save_report(&self, report: &PipelineReport) -> Result<()> {
        self.check_writable()?;
        let id = report.run_id.to_string();
        let report_json = to_json(report)?;
        let flags_json = to_json(&report.flags)?;

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO runs (id, identifier, company, status, stage, last_completed, member_count,
                               cohesion_score, cohesion_level, total_cost, failure_kind, failure_message,
                               flags_json, report_json, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL, ?11, ?12, ?13, ?14)",
            params![
                id.as_str(),
                report.identifier.as_str(),
                report.intelligence.name.as_str(),
                report.status.as_str(),
                report.stage.as_str(),
                report.stage.as_str(),
                report.buyer_group.len() as i64,
                report.cohesion.score,
                report.cohesion.level.as_str(),
                report.costs.total() as i64,
                flags_json,
                report_json,
                report.started_at.to_rfc3339(),
                report.finished_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        for member in &report.buyer_group {
            let candidate = member.assignment.candidate();
            tx.execute(
                "INSERT INTO members (run_id, rank, name, title, department, role, influence,
                                      relevance, confidence, enriched)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.as_str(),
                    member.rank as i64,
                    candidate.name.as_str(),
                    candidate.title.as_str(),
                    candidate.department.as_str(),
                    member.assignment.role.as_str(),
                    member.assignment.influence(),
                    member.assignment.scored.relevance,
                    member.assignment.confidence,
                    member.is_enriched() as i64,
                ],
            )
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;
        }

        insert_costs(&tx, &id, report.costs.entries()).await?;

        tx.commit()
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        info!(
            members = report.buyer_group.len(),
            costs = report.costs.len(),
            "run saved"
        );
        Ok(())
    }

    /// Persist a failed run with the costs it accrued.
    #[instrument(skip_all, fields(run_id = %failure.run_id))]
    pub async fn save_failure(&self, failure: &PipelineFailure) -> Result<()> {
        self.check_writable()?;
        let id = failure.run_id.to_string();
        let flags_json = to_json(&failure.flags)?;
        let finished_at = Utc::now();
        let started_at = finished_at - chrono::Duration::milliseconds(failure.elapsed_ms as i64);
        let company = failure.partial.facts.as_ref().map(|f| f.name.as_str());

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO runs (id, identifier, company, status, stage, last_completed, member_count,
                               cohesion_score, cohesion_level, total_cost, failure_kind, failure_message,
                               flags_json, report_json, started_at, finished_at)
             VALUES (?1, ?2, ?3, 'FAILED', ?4, ?5, 0, NULL, NULL, ?6, ?7, ?8, ?9, NULL, ?10, ?11)",
            params![
                id.as_str(),
                failure.identifier.as_str(),
                company,
                failure.stage.as_str(),
                failure.last_completed.map(|s| s.as_str()),
                failure.costs.total() as i64,
                failure.cause.kind(),
                failure.cause.to_string(),
                flags_json,
                started_at.to_rfc3339(),
                finished_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        insert_costs(&tx, &id, failure.costs.entries()).await?;

        tx.commit()
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        info!(stage = %failure.stage, cause = failure.cause.kind(), "failed run saved");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1");
        let mut rows = self
            .conn
            .query(&sql, params![limit as i64])
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run(&row)?);
        }
        debug!(count = results.len(), "listed runs");
        Ok(results)
    }

    /// Get one run by ID.
    pub async fn get_run(&self, id: &str) -> Result<Option<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(BuyerGroupError::Storage(e.to_string())),
        }
    }

    /// Full report of a completed run, as it was returned by the pipeline.
    pub async fn get_report(&self, id: &str) -> Result<Option<PipelineReport>> {
        let mut rows = self
            .conn
            .query("SELECT report_json FROM runs WHERE id = ?1", params![id])
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => match row.get::<String>(0).ok() {
                Some(json) => serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|e| BuyerGroupError::Storage(format!("invalid report_json: {e}"))),
                None => Ok(None),
            },
            Ok(None) => Ok(None),
            Err(e) => Err(BuyerGroupError::Storage(e.to_string())),
        }
    }

    /// Members of a run in rank order. Empty for failed runs.
    pub async fn list_members(&self, run_id: &str) -> Result<Vec<MemberRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT rank, name, title, department, role, influence, relevance, confidence, enriched
                 FROM members WHERE run_id = ?1 ORDER BY rank",
                params![run_id],
            )
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(MemberRecord {
                rank: get_i64(&row, 0)? as usize,
                name: get_string(&row, 1)?,
                title: get_string(&row, 2)?,
                department: get_string(&row, 3)?,
                role: get_string(&row, 4)?,
                influence: get_f64(&row, 5)?,
                relevance: get_f64(&row, 6)?,
                confidence: get_f64(&row, 7)?,
                enriched: get_i64(&row, 8)? != 0,
            });
        }
        Ok(results)
    }

    /// Cost entries of a run in ledger order.
    pub async fn list_costs(&self, run_id: &str) -> Result<Vec<CostRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT seq, kind, units, succeeded, detail, at
                 FROM cost_entries WHERE run_id = ?1 ORDER BY seq",
                params![run_id],
            )
            .await
            .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(CostRecord {
                seq: get_i64(&row, 0)? as usize,
                kind: get_string(&row, 1)?,
                units: get_i64(&row, 2)? as u64,
                succeeded: get_i64(&row, 3)? != 0,
                detail: get_string(&row, 4)?,
                at: parse_time(&get_string(&row, 5)?)?,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_costs(
    conn: &Connection,
    run_id: &str,
    entries: &[buyergroup_shared::CostEntry],
) -> Result<()> {
    for entry in entries {
        conn.execute(
            "INSERT INTO cost_entries (run_id, seq, kind, units, succeeded, detail, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                entry.seq as i64,
                entry.kind.as_str(),
                entry.units as i64,
                entry.succeeded as i64,
                entry.detail.as_str(),
                entry.at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| BuyerGroupError::Storage(e.to_string()))?;
    }
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
    serde_json::to_string(data).map_err(|e| BuyerGroupError::Storage(e.to_string()))
}

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| BuyerGroupError::Storage(e.to_string()))
}

fn get_i64(row: &libsql::Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx)
        .map_err(|e| BuyerGroupError::Storage(e.to_string()))
}

fn get_f64(row: &libsql::Row, idx: i32) -> Result<f64> {
    row.get::<f64>(idx)
        .map_err(|e| BuyerGroupError::Storage(e.to_string()))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BuyerGroupError::Storage(format!("invalid date: {e}")))
}

/// Convert a `runs` row selected with [`RUN_COLUMNS`] to a [`RunRecord`].
fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    let flags_json = get_string(row, 12)?;
    Ok(RunRecord {
        id: get_string(row, 0)?,
        identifier: get_string(row, 1)?,
        company: row.get::<String>(2).ok(),
        status: get_string(row, 3)?,
        stage: get_string(row, 4)?,
        last_completed: row.get::<String>(5).ok(),
        member_count: get_i64(row, 6)? as usize,
        cohesion_score: row.get::<f64>(7).ok(),
        cohesion_level: row.get::<String>(8).ok(),
        total_cost: get_i64(row, 9)? as u64,
        failure_kind: row.get::<String>(10).ok(),
        failure_message: row.get::<String>(11).ok(),
        flags: serde_json::from_str(&flags_json)
            .map_err(|e| BuyerGroupError::Storage(format!("invalid flags_json: {e}")))?,
        started_at: parse_time(&get_string(row, 13)?)?,
        finished_at: parse_time(&get_string(row, 14)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use buyergroup_shared::{
        CallKind, Candidate, CohesionLevel, CohesionReport, CompanyFacts, CostLedger, DealBand,
        DerivedParameters, EngagementStrategy, EnrichedMember, EnrichmentStatus, FailureCause,
        GroupPriority, PartialResults, PipelineRun, Role, RoleAssignment, RunId, RunStatus,
        ScoredCandidate, Seniority, Stage,
    };
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("bg_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn member(rank: usize, name: &str, title: &str, dept: &str, role: Role, enriched: bool) -> EnrichedMember {
        EnrichedMember {
            rank,
            assignment: RoleAssignment {
                scored: ScoredCandidate {
                    candidate: Candidate::new(name, title, dept),
                    relevance: 0.5,
                    influence: 60.0,
                    seniority: Seniority::Director,
                    discovery_index: rank - 1,
                },
                role,
                confidence: 0.8,
                justification: String::new(),
            },
            profile: None,
            enrichment: if enriched {
                EnrichmentStatus::Enriched
            } else {
                EnrichmentStatus::Failed {
                    reason: "timed out".into(),
                }
            },
        }
    }

    fn report() -> PipelineReport {
        let mut costs = CostLedger::new();
        costs.record(CallKind::DiscoveryPage, 1, true, "page 1");
        costs.record(CallKind::ProfileEnrichment, 10, true, "Ana Lee");
        costs.record(CallKind::ProfileEnrichment, 10, false, "Bo Park");
        let now = Utc::now();
        PipelineReport {
            run_id: RunId::new(),
            identifier: "acme.io".into(),
            status: RunStatus::Completed,
            stage: Stage::ReportReady,
            buyer_group: vec![
                member(1, "Ana Lee", "Director of Sales", "Sales", Role::Decision, true),
                member(2, "Bo Park", "Legal Counsel", "Legal", Role::Blocker, false),
            ],
            cohesion: CohesionReport {
                score: 61.2,
                level: CohesionLevel::Moderate,
                role_balance: 1.0,
                department_balance: 1.0,
                seniority_spread: 0.0,
                role_counts: BTreeMap::from([(Role::Decision, 1), (Role::Blocker, 1)]),
                department_counts: BTreeMap::from([("legal".into(), 1), ("sales".into(), 1)]),
                strategy: EngagementStrategy::DecisionLed,
                priority: GroupPriority::Low,
                notes: vec!["no champion identified".into()],
            },
            costs,
            intelligence: CompanyFacts::degraded("Acme"),
            degraded_context: false,
            under_filled: true,
            parameters: DerivedParameters {
                band: DealBand::MidMarket,
                max_pages: 2,
                target_size: 7,
            },
            flags: vec![RunFlag::UnderFilled { selected: 2, min: 3 }],
            timings: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("bg_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.unwrap();
        drop(s1);
        let s2 = Storage::open(&tmp).await.unwrap();
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn report_round_trip() {
        let storage = test_storage().await;
        let report = report();
        let id = report.run_id.to_string();
        storage.save_report(&report).await.unwrap();

        let run = storage.get_run(&id).await.unwrap().expect("run exists");
        assert_eq!(run.status, "COMPLETED");
        assert_eq!(run.stage, "REPORT_READY");
        assert_eq!(run.company.as_deref(), Some("Acme"));
        assert_eq!(run.member_count, 2);
        assert_eq!(run.cohesion_score, Some(61.2));
        assert_eq!(run.cohesion_level.as_deref(), Some("moderate"));
        assert_eq!(run.total_cost, 21);
        assert_eq!(run.failure_kind, None);
        assert_eq!(run.flags, report.flags);

        let members = storage.list_members(&id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "Ana Lee");
        assert_eq!(members[0].role, "decision");
        assert!(members[0].enriched);
        assert!(!members[1].enriched);

        let costs = storage.list_costs(&id).await.unwrap();
        assert_eq!(costs.len(), 3);
        assert_eq!(costs[2].kind, "profile_enrichment");
        assert!(!costs[2].succeeded);
        assert_eq!(costs.iter().map(|c| c.units).sum::<u64>(), 21);

        let stored = storage.get_report(&id).await.unwrap().expect("report json");
        assert_eq!(stored.buyer_group, report.buyer_group);
    }

    #[tokio::test]
    async fn failure_keeps_stage_and_costs() {
        let storage = test_storage().await;
        let mut run = PipelineRun::start("ghost.io").advance(std::time::Duration::ZERO);
        run.ledger.record(CallKind::ContextResolution, 0, false, "ghost.io");
        run.ledger.record(CallKind::DiscoveryPage, 1, true, "page 1");
        let run = run.advance(std::time::Duration::ZERO);
        let failure = run.fail(
            FailureCause::EmptyGroup {
                discovered: 0,
                scored: 0,
            },
            std::time::Duration::ZERO,
            PartialResults::default(),
        );
        let id = failure.run_id.to_string();
        storage.save_failure(&failure).await.unwrap();

        let run = storage.get_run(&id).await.unwrap().expect("run exists");
        assert_eq!(run.status, "FAILED");
        assert_eq!(run.stage, "SCORING");
        assert_eq!(run.last_completed.as_deref(), Some("DISCOVERY"));
        assert_eq!(run.failure_kind.as_deref(), Some("empty_group"));
        assert!(run.failure_message.unwrap().contains("empty group"));
        assert_eq!(run.total_cost, 1);
        assert_eq!(run.cohesion_score, None);

        assert!(storage.list_members(&id).await.unwrap().is_empty());
        assert_eq!(storage.list_costs(&id).await.unwrap().len(), 2);
        assert!(storage.get_report(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_runs_newest_first() {
        let storage = test_storage().await;
        let mut older = report();
        older.started_at = Utc::now() - chrono::Duration::hours(1);
        let newer = report();
        storage.save_report(&older).await.unwrap();
        storage.save_report(&newer).await.unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, newer.run_id.to_string());

        assert_eq!(storage.list_runs(1).await.unwrap().len(), 1);
        assert!(storage.get_run("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("bg_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.save_report(&report()).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_runs(10).await.unwrap().len(), 1);
        let result = ro.save_report(&report()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("bg_test_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
