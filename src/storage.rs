//! SQLite storage layer for CareWatch.
//!
//! Tables:
//!
//! - `analyses`: one row per analyzed submission, report and result as stored
//! - `disease_cases`: surveillance cases derived from analyses or logged by staff
//! - `outbreaks`: outbreak declarations, plus `outbreak_cases` (affected set)
//!   and `outbreak_actions` (append-only log)
//!
//! Timestamps are stored as unix seconds. At most one *active* outbreak may
//! exist per (disease, location); a partial unique index enforces this, so
//! concurrent detection runs cannot both create one.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::model::{
    AnalysisRecord, AnalysisResult, CaseReviewRequest, CaseStatus, DiseaseCase, NewDiseaseCase,
    Outbreak, OutbreakAction, OutbreakCandidate, OutbreakStatistics, OutbreakStatus,
    SymptomReport,
};

/// SQL list of the statuses covered by the active-outbreak constraint.
const ACTIVE_OUTBREAK_STATUSES: &str = "('detected', 'confirmed', 'contained')";

/// SQL list of the case statuses that count towards detection.
const DETECTABLE_CASE_STATUSES: &str = "('detected', 'confirmed')";

/// Outcome of [`Storage::create_outbreak_if_absent`].
#[derive(Debug, Clone)]
pub enum OutbreakInsert {
    /// A new outbreak was declared.
    Created(Outbreak),
    /// An active outbreak with the same key already exists; nothing was written.
    Existing(i64),
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

fn from_unix(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:carewatch.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to ":memory:" opens its own database, so an
        // in-memory pool must hold exactly one connection for its lifetime.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                report TEXT NOT NULL,
                risk_score REAL NOT NULL,
                risk_level TEXT NOT NULL,
                predicted_syndrome TEXT NOT NULL,
                confidence REAL NOT NULL,
                recommendations TEXT NOT NULL,
                flagged INTEGER NOT NULL,
                review_reasons TEXT NOT NULL,
                location TEXT,
                disease_case_id INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_analyses_flagged
            ON analyses(flagged, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS disease_cases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                analysis_id INTEGER,
                disease_name TEXT NOT NULL,
                confidence REAL NOT NULL,
                severity TEXT NOT NULL,
                is_emergency INTEGER NOT NULL,
                location TEXT NOT NULL,
                case_date INTEGER NOT NULL,
                status TEXT NOT NULL,
                is_outbreak_related INTEGER NOT NULL DEFAULT 0,
                outbreak_id INTEGER,
                reviewed_by TEXT,
                updated_at INTEGER NOT NULL
            )
            "#,
            // Window scans filter on status and date
            r#"
            CREATE INDEX IF NOT EXISTS idx_disease_cases_status_date
            ON disease_cases(status, case_date)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_disease_cases_key
            ON disease_cases(disease_name, location)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS outbreaks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                disease_name TEXT NOT NULL,
                location TEXT NOT NULL,
                start_date INTEGER NOT NULL,
                last_case_date INTEGER NOT NULL,
                total_cases INTEGER NOT NULL,
                emergency_cases INTEGER NOT NULL,
                critical_cases INTEGER NOT NULL,
                average_confidence REAL NOT NULL,
                severity TEXT NOT NULL,
                threshold INTEGER NOT NULL,
                time_window_days INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_outbreaks_active_key
            ON outbreaks(disease_name, location)
            WHERE status IN ('detected', 'confirmed', 'contained')
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS outbreak_cases (
                outbreak_id INTEGER NOT NULL,
                case_id INTEGER NOT NULL,
                PRIMARY KEY (outbreak_id, case_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS outbreak_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                outbreak_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                performed_by TEXT,
                performed_at INTEGER NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Analyses
    // ------------------------------------------------------------------

    /// Persist an analysis and, if given, the disease case derived from it.
    ///
    /// Both rows are written in one transaction.
    pub async fn record_analysis(
        &self,
        report: &SymptomReport,
        result: &AnalysisResult,
        location: Option<&str>,
        case: Option<NewDiseaseCase>,
    ) -> anyhow::Result<AnalysisRecord> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO analyses (
                report, risk_score, risk_level, predicted_syndrome, confidence,
                recommendations, flagged, review_reasons, location, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(serde_json::to_string(report)?)
        .bind(result.risk_score)
        .bind(result.risk_level.as_str())
        .bind(&result.predicted_syndrome)
        .bind(result.confidence)
        .bind(serde_json::to_string(&result.recommendations)?)
        .bind(result.flagged_for_review)
        .bind(serde_json::to_string(&result.review_reasons)?)
        .bind(location)
        .bind(result.timestamp.timestamp())
        .execute(&mut *tx)
        .await?;
        let analysis_id = inserted.last_insert_rowid();

        let mut disease_case_id = None;
        if let Some(mut case) = case {
            case.analysis_id = Some(analysis_id);
            let case_id = insert_case_row(&mut tx, &case, result.timestamp).await?;

            sqlx::query("UPDATE analyses SET disease_case_id = ? WHERE id = ?")
                .bind(case_id)
                .bind(analysis_id)
                .execute(&mut *tx)
                .await?;
            disease_case_id = Some(case_id);
        }

        tx.commit().await?;

        Ok(AnalysisRecord {
            id: analysis_id,
            report: report.clone(),
            result: result.clone(),
            location: location.map(str::to_string),
            disease_case_id,
        })
    }

    pub async fn get_analysis(&self, id: i64) -> anyhow::Result<Option<AnalysisRecord>> {
        let row = sqlx::query("SELECT * FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(analysis_from_row).transpose()
    }

    /// List analyses, newest first, optionally filtered on the review flag.
    pub async fn list_analyses(
        &self,
        flagged: Option<bool>,
        limit: u32,
    ) -> anyhow::Result<Vec<AnalysisRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM analyses
            WHERE (? IS NULL OR flagged = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(flagged)
        .bind(flagged)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(analysis_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Disease cases
    // ------------------------------------------------------------------

    pub async fn insert_case(
        &self,
        case: &NewDiseaseCase,
        now: DateTime<Utc>,
    ) -> anyhow::Result<DiseaseCase> {
        let mut tx = self.pool.begin().await?;
        let id = insert_case_row(&mut tx, case, now).await?;
        tx.commit().await?;

        self.get_case(id)
            .await?
            .with_context(|| format!("disease case {id} vanished after insert"))
    }

    pub async fn get_case(&self, id: i64) -> anyhow::Result<Option<DiseaseCase>> {
        let row = sqlx::query("SELECT * FROM disease_cases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(case_from_row).transpose()
    }

    /// List cases, newest first.
    pub async fn list_cases(
        &self,
        status: Option<CaseStatus>,
        disease: Option<&str>,
        limit: u32,
    ) -> anyhow::Result<Vec<DiseaseCase>> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query(
            r#"
            SELECT * FROM disease_cases
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR disease_name = ?)
            ORDER BY case_date DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(status)
        .bind(status)
        .bind(disease)
        .bind(disease)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(case_from_row).collect()
    }

    /// Every case dated within `[start, end]`, regardless of status.
    pub async fn cases_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DiseaseCase>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM disease_cases
            WHERE case_date >= ? AND case_date <= ?
            ORDER BY case_date ASC, id ASC
            "#,
        )
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(case_from_row).collect()
    }

    /// Apply a doctor's review to a case. Returns `None` if the case does not exist.
    pub async fn review_case(
        &self,
        id: i64,
        review: &CaseReviewRequest,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<DiseaseCase>> {
        let result = sqlx::query(
            r#"
            UPDATE disease_cases
            SET status = COALESCE(?, status),
                severity = COALESCE(?, severity),
                reviewed_by = COALESCE(?, reviewed_by),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(review.status.map(|s| s.as_str()))
        .bind(review.severity.map(|s| s.as_str()))
        .bind(review.reviewed_by.as_deref())
        .bind(now.timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_case(id).await
    }

    /// Cases dated within `[start, end]` whose status counts towards detection.
    ///
    /// Cases already linked to a closed outbreak are left out, so a resolved
    /// or dismissed outbreak is not declared again from the same cases.
    pub async fn detectable_cases_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DiseaseCase>> {
        let query = format!(
            r#"
            SELECT * FROM disease_cases
            WHERE status IN {DETECTABLE_CASE_STATUSES}
              AND case_date >= ? AND case_date <= ?
              AND (
                outbreak_id IS NULL
                OR outbreak_id IN (
                    SELECT id FROM outbreaks WHERE status IN {ACTIVE_OUTBREAK_STATUSES}
                )
              )
            ORDER BY case_date ASC, id ASC
            "#
        );

        let rows = sqlx::query(&query)
            .bind(start.timestamp())
            .bind(end.timestamp())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(case_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Outbreaks
    // ------------------------------------------------------------------

    /// Declare an outbreak for a candidate unless an active one already exists.
    ///
    /// The insert relies on the partial unique index, so the existence check
    /// and the create are a single atomic step. When the outbreak is created,
    /// its affected cases are linked in the same transaction.
    pub async fn create_outbreak_if_absent(
        &self,
        candidate: &OutbreakCandidate,
        threshold: u32,
        time_window_days: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<OutbreakInsert> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO outbreaks (
                disease_name, location, start_date, last_case_date, total_cases,
                emergency_cases, critical_cases, average_confidence, severity,
                threshold, time_window_days, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'detected', ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&candidate.disease_name)
        .bind(&candidate.location)
        .bind(candidate.first_case_date.timestamp())
        .bind(candidate.last_case_date.timestamp())
        .bind(candidate.case_count as i64)
        .bind(candidate.emergency_cases as i64)
        .bind(candidate.critical_cases as i64)
        .bind(candidate.average_confidence)
        .bind(candidate.severity.as_str())
        .bind(i64::from(threshold))
        .bind(i64::from(time_window_days))
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            let query = format!(
                r#"
                SELECT id FROM outbreaks
                WHERE disease_name = ? AND location = ? AND status IN {ACTIVE_OUTBREAK_STATUSES}
                "#
            );
            let row = sqlx::query(&query)
                .bind(&candidate.disease_name)
                .bind(&candidate.location)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Ok(OutbreakInsert::Existing(row.try_get("id")?));
        }

        let outbreak_id = inserted.last_insert_rowid();
        link_cases(&mut tx, outbreak_id, &candidate.case_ids, now).await?;

        sqlx::query(
            r#"
            INSERT INTO outbreak_actions (outbreak_id, action, performed_by, performed_at)
            VALUES (?, ?, NULL, ?)
            "#,
        )
        .bind(outbreak_id)
        .bind(format!(
            "Detected automatically: {} cases within {} days (threshold {})",
            candidate.case_count, time_window_days, threshold
        ))
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let outbreak = self
            .get_outbreak(outbreak_id)
            .await?
            .with_context(|| format!("outbreak {outbreak_id} vanished after insert"))?;
        Ok(OutbreakInsert::Created(outbreak))
    }

    pub async fn get_outbreak(&self, id: i64) -> anyhow::Result<Option<Outbreak>> {
        let row = sqlx::query("SELECT * FROM outbreaks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_outbreak(&row).await?)),
            None => Ok(None),
        }
    }

    /// List outbreaks, newest first.
    pub async fn list_outbreaks(&self, active_only: bool) -> anyhow::Result<Vec<Outbreak>> {
        let query = if active_only {
            format!(
                "SELECT * FROM outbreaks WHERE status IN {ACTIVE_OUTBREAK_STATUSES} ORDER BY created_at DESC, id DESC"
            )
        } else {
            "SELECT * FROM outbreaks ORDER BY created_at DESC, id DESC".to_string()
        };

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut outbreaks = Vec::with_capacity(rows.len());
        for row in &rows {
            outbreaks.push(self.hydrate_outbreak(row).await?);
        }
        Ok(outbreaks)
    }

    /// Change an outbreak's status if it still has status `from`, logging the change.
    ///
    /// Returns `false` when the outbreak is missing or its status moved on.
    pub async fn update_outbreak_status(
        &self,
        id: i64,
        from: OutbreakStatus,
        to: OutbreakStatus,
        action: &str,
        performed_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE outbreaks SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(now.timestamp())
        .bind(id)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_action(&mut tx, id, action, performed_by, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Append an entry to an outbreak's action log.
    pub async fn append_outbreak_action(
        &self,
        id: i64,
        action: &str,
        performed_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_action(&mut tx, id, action, performed_by, now).await?;
        sqlx::query("UPDATE outbreaks SET updated_at = ? WHERE id = ?")
            .bind(now.timestamp())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Link detectable cases for the outbreak's key that are not yet part of any
    /// outbreak and are dated on or after `since`. Returns the newly linked ids.
    ///
    /// The claim is a single `UPDATE`, so the transaction takes the write lock
    /// with its first statement.
    pub async fn attach_unlinked_cases(
        &self,
        outbreak_id: i64,
        disease_name: &str,
        location: &str,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            UPDATE disease_cases
            SET is_outbreak_related = 1, outbreak_id = ?, updated_at = ?
            WHERE disease_name = ? AND location = ?
              AND status IN {DETECTABLE_CASE_STATUSES}
              AND outbreak_id IS NULL
              AND case_date >= ?
            RETURNING id
            "#
        );
        let mut ids: Vec<i64> = sqlx::query(&query)
            .bind(outbreak_id)
            .bind(now.timestamp())
            .bind(disease_name)
            .bind(location)
            .bind(since.timestamp())
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<_, _>>()?;
        ids.sort_unstable();

        for case_id in &ids {
            sqlx::query("INSERT OR IGNORE INTO outbreak_cases (outbreak_id, case_id) VALUES (?, ?)")
                .bind(outbreak_id)
                .bind(*case_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(ids)
    }

    /// All cases currently in an outbreak's affected set.
    pub async fn outbreak_cases(&self, outbreak_id: i64) -> anyhow::Result<Vec<DiseaseCase>> {
        let rows = sqlx::query(
            r#"
            SELECT c.* FROM disease_cases c
            JOIN outbreak_cases oc ON oc.case_id = c.id
            WHERE oc.outbreak_id = ?
            ORDER BY c.case_date ASC, c.id ASC
            "#,
        )
        .bind(outbreak_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(case_from_row).collect()
    }

    pub async fn write_outbreak_statistics(
        &self,
        id: i64,
        stats: &OutbreakStatistics,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE outbreaks
            SET total_cases = ?, emergency_cases = ?, critical_cases = ?,
                average_confidence = ?, start_date = ?, last_case_date = ?,
                severity = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(stats.total_cases as i64)
        .bind(stats.emergency_cases as i64)
        .bind(stats.critical_cases as i64)
        .bind(stats.average_confidence)
        .bind(stats.start_date.timestamp())
        .bind(stats.last_case_date.timestamp())
        .bind(stats.severity.as_str())
        .bind(now.timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn hydrate_outbreak(&self, row: &SqliteRow) -> anyhow::Result<Outbreak> {
        let id: i64 = row.try_get("id")?;

        let affected_case_ids = sqlx::query(
            "SELECT case_id FROM outbreak_cases WHERE outbreak_id = ? ORDER BY case_id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| r.try_get("case_id"))
        .collect::<Result<Vec<i64>, _>>()?;

        let actions = sqlx::query(
            r#"
            SELECT action, performed_by, performed_at FROM outbreak_actions
            WHERE outbreak_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> Result<OutbreakAction, sqlx::Error> {
            Ok(OutbreakAction {
                action: r.try_get("action")?,
                performed_by: r.try_get("performed_by")?,
                performed_at: from_unix(r.try_get("performed_at")?),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Outbreak {
            id,
            disease_name: row.try_get("disease_name")?,
            location: row.try_get("location")?,
            start_date: from_unix(row.try_get("start_date")?),
            last_case_date: from_unix(row.try_get("last_case_date")?),
            total_cases: row.try_get::<i64, _>("total_cases")? as usize,
            emergency_cases: row.try_get::<i64, _>("emergency_cases")? as usize,
            critical_cases: row.try_get::<i64, _>("critical_cases")? as usize,
            average_confidence: row.try_get("average_confidence")?,
            severity: row.try_get::<String, _>("severity")?.parse()?,
            threshold: u32::try_from(row.try_get::<i64, _>("threshold")?)?,
            time_window_days: u32::try_from(row.try_get::<i64, _>("time_window_days")?)?,
            status: row.try_get::<String, _>("status")?.parse()?,
            affected_case_ids,
            actions,
            created_at: from_unix(row.try_get("created_at")?),
            updated_at: from_unix(row.try_get("updated_at")?),
        })
    }
}

async fn insert_case_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    case: &NewDiseaseCase,
    now: DateTime<Utc>,
) -> anyhow::Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO disease_cases (
            analysis_id, disease_name, confidence, severity, is_emergency,
            location, case_date, status, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(case.analysis_id)
    .bind(&case.disease_name)
    .bind(case.confidence)
    .bind(case.severity.as_str())
    .bind(case.is_emergency)
    .bind(&case.location)
    .bind(case.case_date.timestamp())
    .bind(case.status.as_str())
    .bind(now.timestamp())
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn link_cases(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    outbreak_id: i64,
    case_ids: &[i64],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    for case_id in case_ids {
        sqlx::query("INSERT OR IGNORE INTO outbreak_cases (outbreak_id, case_id) VALUES (?, ?)")
            .bind(outbreak_id)
            .bind(*case_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE disease_cases
            SET is_outbreak_related = 1, outbreak_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(outbreak_id)
        .bind(now.timestamp())
        .bind(*case_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn insert_action(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    outbreak_id: i64,
    action: &str,
    performed_by: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbreak_actions (outbreak_id, action, performed_by, performed_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(outbreak_id)
    .bind(action)
    .bind(performed_by)
    .bind(now.timestamp())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn analysis_from_row(row: &SqliteRow) -> anyhow::Result<AnalysisRecord> {
    let report: String = row.try_get("report")?;
    let recommendations: String = row.try_get("recommendations")?;
    let review_reasons: String = row.try_get("review_reasons")?;

    Ok(AnalysisRecord {
        id: row.try_get("id")?,
        report: serde_json::from_str(&report)?,
        result: AnalysisResult {
            risk_score: row.try_get("risk_score")?,
            risk_level: row.try_get::<String, _>("risk_level")?.parse()?,
            predicted_syndrome: row.try_get("predicted_syndrome")?,
            confidence: row.try_get("confidence")?,
            recommendations: serde_json::from_str(&recommendations)?,
            flagged_for_review: row.try_get::<i64, _>("flagged")? != 0,
            review_reasons: serde_json::from_str(&review_reasons)?,
            timestamp: from_unix(row.try_get("created_at")?),
        },
        location: row.try_get("location")?,
        disease_case_id: row.try_get("disease_case_id")?,
    })
}

fn case_from_row(row: &SqliteRow) -> anyhow::Result<DiseaseCase> {
    Ok(DiseaseCase {
        id: row.try_get("id")?,
        analysis_id: row.try_get("analysis_id")?,
        disease_name: row.try_get("disease_name")?,
        confidence: row.try_get("confidence")?,
        severity: row.try_get::<String, _>("severity")?.parse()?,
        is_emergency: row.try_get::<i64, _>("is_emergency")? != 0,
        location: row.try_get("location")?,
        case_date: from_unix(row.try_get("case_date")?),
        status: row.try_get::<String, _>("status")?.parse()?,
        is_outbreak_related: row.try_get::<i64, _>("is_outbreak_related")? != 0,
        outbreak_id: row.try_get("outbreak_id")?,
        reviewed_by: row.try_get("reviewed_by")?,
        updated_at: from_unix(row.try_get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Severity, Symptom, SymptomDuration};

    fn new_case(disease: &str, location: &str, case_date: DateTime<Utc>) -> NewDiseaseCase {
        NewDiseaseCase {
            analysis_id: None,
            disease_name: disease.to_string(),
            confidence: 0.7,
            severity: Severity::Medium,
            is_emergency: false,
            location: location.to_string(),
            case_date,
            status: CaseStatus::Detected,
        }
    }

    fn candidate(case_ids: Vec<i64>, now: DateTime<Utc>) -> OutbreakCandidate {
        OutbreakCandidate {
            disease_name: "flu".to_string(),
            location: "Clinic A".to_string(),
            case_count: case_ids.len(),
            emergency_cases: 0,
            critical_cases: 0,
            average_confidence: 0.7,
            first_case_date: now - chrono::Duration::days(2),
            last_case_date: now,
            severity: Severity::Low,
            case_ids,
        }
    }

    #[tokio::test]
    async fn test_record_and_fetch_analysis() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();

        let report = SymptomReport {
            symptoms: vec![Symptom {
                name: "fever".to_string(),
                severity: 7,
                duration: SymptomDuration {
                    value: 2.0,
                    unit: "days".to_string(),
                },
            }],
            vital_signs: None,
            recent_travel: true,
            recent_exposure: false,
        };
        let result = AnalysisResult {
            risk_score: 0.4,
            risk_level: Severity::Medium,
            predicted_syndrome: "unknown".to_string(),
            confidence: 0.5,
            recommendations: vec!["Rest".to_string()],
            flagged_for_review: true,
            review_reasons: vec!["travel_or_exposure".to_string()],
            timestamp: now,
        };
        let case = new_case("flu", "Clinic A", now);

        let record = storage
            .record_analysis(&report, &result, Some("Clinic A"), Some(case))
            .await
            .unwrap();

        let fetched = storage.get_analysis(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.report, report);
        assert_eq!(fetched.result.recommendations, result.recommendations);
        assert!(fetched.result.flagged_for_review);
        assert_eq!(fetched.disease_case_id, record.disease_case_id);

        let case_id = record.disease_case_id.unwrap();
        let stored_case = storage.get_case(case_id).await.unwrap().unwrap();
        assert_eq!(stored_case.analysis_id, Some(record.id));

        let flagged = storage.list_analyses(Some(true), 10).await.unwrap();
        assert_eq!(flagged.len(), 1);
        let unflagged = storage.list_analyses(Some(false), 10).await.unwrap();
        assert!(unflagged.is_empty());
    }

    #[tokio::test]
    async fn test_missing_rows_return_none() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        assert!(storage.get_analysis(42).await.unwrap().is_none());
        assert!(storage.get_case(42).await.unwrap().is_none());
        assert!(storage.get_outbreak(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detectable_cases_window() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();

        storage
            .insert_case(&new_case("flu", "Clinic A", now - chrono::Duration::days(1)), now)
            .await
            .unwrap();
        storage
            .insert_case(&new_case("flu", "Clinic A", now - chrono::Duration::days(10)), now)
            .await
            .unwrap();
        let mut resolved = new_case("flu", "Clinic A", now);
        resolved.status = CaseStatus::Resolved;
        storage.insert_case(&resolved, now).await.unwrap();

        let cases = storage
            .detectable_cases_between(now - chrono::Duration::days(7), now)
            .await
            .unwrap();

        assert_eq!(cases.len(), 1);
    }

    #[tokio::test]
    async fn test_review_case_updates_status_and_severity() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let case = storage
            .insert_case(&new_case("flu", "Clinic A", now), now)
            .await
            .unwrap();

        let review = CaseReviewRequest {
            status: Some(CaseStatus::Confirmed),
            severity: Some(Severity::High),
            reviewed_by: Some("dr-lee".to_string()),
        };
        let updated = storage.review_case(case.id, &review, now).await.unwrap().unwrap();

        assert_eq!(updated.status, CaseStatus::Confirmed);
        assert_eq!(updated.severity, Severity::High);
        assert_eq!(updated.reviewed_by.as_deref(), Some("dr-lee"));

        // Fields left out of the review keep their values.
        let partial = CaseReviewRequest {
            status: Some(CaseStatus::Treated),
            ..Default::default()
        };
        let updated = storage.review_case(case.id, &partial, now).await.unwrap().unwrap();
        assert_eq!(updated.severity, Severity::High);
        assert_eq!(updated.status, CaseStatus::Treated);

        assert!(storage.review_case(999, &partial, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_outbreak_is_unique_per_key() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let case = storage
                .insert_case(&new_case("flu", "Clinic A", now), now)
                .await
                .unwrap();
            ids.push(case.id);
        }

        let first = storage
            .create_outbreak_if_absent(&candidate(ids.clone(), now), 3, 7, now)
            .await
            .unwrap();
        let created = match first {
            OutbreakInsert::Created(outbreak) => outbreak,
            OutbreakInsert::Existing(_) => panic!("expected a new outbreak"),
        };
        assert_eq!(created.affected_case_ids, ids);
        assert_eq!(created.status, OutbreakStatus::Detected);
        assert_eq!(created.actions.len(), 1);

        let linked = storage.get_case(ids[0]).await.unwrap().unwrap();
        assert!(linked.is_outbreak_related);
        assert_eq!(linked.outbreak_id, Some(created.id));

        let second = storage
            .create_outbreak_if_absent(&candidate(ids.clone(), now), 3, 7, now)
            .await
            .unwrap();
        assert!(matches!(second, OutbreakInsert::Existing(id) if id == created.id));
        assert_eq!(storage.list_outbreaks(false).await.unwrap().len(), 1);

        // Once resolved, the key is free again.
        let moved = storage
            .update_outbreak_status(
                created.id,
                OutbreakStatus::Detected,
                OutbreakStatus::Resolved,
                "Resolved",
                None,
                now,
            )
            .await
            .unwrap();
        assert!(moved);

        let third = storage
            .create_outbreak_if_absent(&candidate(ids, now), 3, 7, now)
            .await
            .unwrap();
        assert!(matches!(third, OutbreakInsert::Created(_)));
        assert_eq!(storage.list_outbreaks(true).await.unwrap().len(), 1);
        assert_eq!(storage.list_outbreaks(false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_set() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let created = match storage
            .create_outbreak_if_absent(&candidate(vec![], now), 3, 7, now)
            .await
            .unwrap()
        {
            OutbreakInsert::Created(outbreak) => outbreak,
            OutbreakInsert::Existing(_) => panic!("expected a new outbreak"),
        };

        let stale = storage
            .update_outbreak_status(
                created.id,
                OutbreakStatus::Confirmed,
                OutbreakStatus::Contained,
                "Contained",
                Some("admin"),
                now,
            )
            .await
            .unwrap();
        assert!(!stale);

        let outbreak = storage.get_outbreak(created.id).await.unwrap().unwrap();
        assert_eq!(outbreak.status, OutbreakStatus::Detected);
        assert_eq!(outbreak.actions.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_outbreak_cases_leave_detection_window() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let case = storage
                .insert_case(&new_case("flu", "Clinic A", now), now)
                .await
                .unwrap();
            ids.push(case.id);
        }
        let start = now - chrono::Duration::days(7);
        assert_eq!(storage.detectable_cases_between(start, now).await.unwrap().len(), 3);

        let created = match storage
            .create_outbreak_if_absent(&candidate(ids.clone(), now), 3, 7, now)
            .await
            .unwrap()
        {
            OutbreakInsert::Created(outbreak) => outbreak,
            OutbreakInsert::Existing(_) => panic!("expected a new outbreak"),
        };

        // Still counted while the outbreak is active.
        assert_eq!(storage.detectable_cases_between(start, now).await.unwrap().len(), 3);

        storage
            .update_outbreak_status(
                created.id,
                OutbreakStatus::Detected,
                OutbreakStatus::Resolved,
                "Resolved",
                None,
                now,
            )
            .await
            .unwrap();

        assert!(storage.detectable_cases_between(start, now).await.unwrap().is_empty());

        let fresh = storage
            .insert_case(&new_case("flu", "Clinic A", now), now)
            .await
            .unwrap();
        let remaining = storage.detectable_cases_between(start, now).await.unwrap();
        assert_eq!(remaining.iter().map(|c| c.id).collect::<Vec<_>>(), vec![fresh.id]);
    }

    #[tokio::test]
    async fn test_attach_claims_only_unlinked_matching_cases() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();

        let created = match storage
            .create_outbreak_if_absent(&candidate(vec![], now), 3, 7, now)
            .await
            .unwrap()
        {
            OutbreakInsert::Created(outbreak) => outbreak,
            OutbreakInsert::Existing(_) => panic!("expected a new outbreak"),
        };

        let matching = storage
            .insert_case(&new_case("flu", "Clinic A", now), now)
            .await
            .unwrap();
        let elsewhere = storage
            .insert_case(&new_case("flu", "Clinic B", now), now)
            .await
            .unwrap();
        let too_old = storage
            .insert_case(
                &new_case("flu", "Clinic A", now - chrono::Duration::days(30)),
                now,
            )
            .await
            .unwrap();

        let since = now - chrono::Duration::days(2);
        let attached = storage
            .attach_unlinked_cases(created.id, "flu", "Clinic A", since, now)
            .await
            .unwrap();
        assert_eq!(attached, vec![matching.id]);

        let again = storage
            .attach_unlinked_cases(created.id, "flu", "Clinic A", since, now)
            .await
            .unwrap();
        assert!(again.is_empty());

        let linked = storage.get_case(matching.id).await.unwrap().unwrap();
        assert_eq!(linked.outbreak_id, Some(created.id));
        assert!(linked.is_outbreak_related);
        assert!(storage.get_case(elsewhere.id).await.unwrap().unwrap().outbreak_id.is_none());
        assert!(storage.get_case(too_old.id).await.unwrap().unwrap().outbreak_id.is_none());

        let outbreak = storage.get_outbreak(created.id).await.unwrap().unwrap();
        assert_eq!(outbreak.affected_case_ids, vec![matching.id]);
    }
}
