use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};

use crate::models::{
    ApplicationStatus, ApplyType, JobDetail, JobResult, MatchResult, MatchSignals, MatchStatus,
    StoredResult,
};

/// Counts returned by a batch upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertSummary {
    pub written: usize,
    pub new_rows: usize,
}

pub struct ResultStore {
    conn: Connection,
    path: PathBuf,
}

impl ResultStore {
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::default_path()?)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "pounce") {
            Ok(proj_dirs.data_dir().join("pounce.db"))
        } else {
            // Fallback to current directory
            Ok(PathBuf::from("pounce.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user TEXT NOT NULL,
                company_url TEXT NOT NULL,
                page INTEGER NOT NULL DEFAULT 1,
                ordinal INTEGER NOT NULL DEFAULT 1,
                title TEXT NOT NULL DEFAULT '',
                company TEXT NOT NULL DEFAULT '',
                experience_required TEXT NOT NULL DEFAULT '',
                salary TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                posted TEXT NOT NULL DEFAULT '',
                openings TEXT NOT NULL DEFAULT '',
                applicants TEXT NOT NULL DEFAULT '',
                key_skills TEXT NOT NULL DEFAULT '',
                role_info TEXT NOT NULL DEFAULT '',
                early_applicant INTEGER NOT NULL DEFAULT 0,
                skills_match INTEGER NOT NULL DEFAULT 0,
                location_match INTEGER NOT NULL DEFAULT 0,
                experience_match INTEGER NOT NULL DEFAULT 0,
                score INTEGER NOT NULL DEFAULT 0,
                match_status TEXT NOT NULL DEFAULT 'poor_match',
                apply_type TEXT NOT NULL DEFAULT 'no_button',
                status TEXT NOT NULL CHECK (status IN ('applied', 'skipped')),
                skip_reason TEXT,
                recorded_at TEXT NOT NULL,
                UNIQUE (user, company_url)
            );

            CREATE INDEX IF NOT EXISTS idx_results_user ON job_results(user);
            CREATE INDEX IF NOT EXISTS idx_results_status ON job_results(status);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='job_results'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'pounce init' first."
            ));
        }
        Ok(())
    }

    // --- Result operations ---

    /// Write a batch of results in one transaction. Rows are keyed by
    /// (user, company_url); a re-run updates the existing row instead
    /// of duplicating it.
    pub fn upsert_results(&mut self, user: &str, results: &[JobResult]) -> Result<UpsertSummary> {
        let before = self.count_all()?;
        let tx = self.conn.transaction()?;
        for r in results {
            tx.execute(
                "INSERT INTO job_results (
                    user, company_url, page, ordinal, title, company,
                    experience_required, salary, location, posted, openings,
                    applicants, key_skills, role_info, early_applicant,
                    skills_match, location_match, experience_match, score,
                    match_status, apply_type, status, skip_reason, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                          ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
                ON CONFLICT (user, company_url) DO UPDATE SET
                    page = excluded.page,
                    ordinal = excluded.ordinal,
                    title = excluded.title,
                    company = excluded.company,
                    experience_required = excluded.experience_required,
                    salary = excluded.salary,
                    location = excluded.location,
                    posted = excluded.posted,
                    openings = excluded.openings,
                    applicants = excluded.applicants,
                    key_skills = excluded.key_skills,
                    role_info = excluded.role_info,
                    early_applicant = excluded.early_applicant,
                    skills_match = excluded.skills_match,
                    location_match = excluded.location_match,
                    experience_match = excluded.experience_match,
                    score = excluded.score,
                    match_status = excluded.match_status,
                    apply_type = excluded.apply_type,
                    status = excluded.status,
                    skip_reason = excluded.skip_reason,
                    recorded_at = excluded.recorded_at",
                params![
                    user,
                    r.url,
                    r.page,
                    r.ordinal,
                    r.detail.title,
                    r.detail.company,
                    r.detail.experience_required,
                    r.detail.salary,
                    r.detail.location,
                    r.detail.posted,
                    r.detail.openings,
                    r.detail.applicants,
                    r.detail.key_skills.join(", "),
                    r.detail.role_info.join(" | "),
                    r.match_result.signals.early_applicant,
                    r.match_result.signals.skills,
                    r.match_result.signals.location,
                    r.match_result.signals.experience,
                    r.match_result.score,
                    r.match_result.status.as_str(),
                    r.apply_type.as_str(),
                    r.status.as_str(),
                    r.skip_reason,
                    r.recorded_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("Failed to save result for {}", r.url))?;
        }
        tx.commit()?;
        let after = self.count_all()?;
        let new_rows = (after - before).max(0) as usize;
        Ok(UpsertSummary {
            written: results.len(),
            new_rows,
        })
    }

    fn count_all(&self) -> Result<i64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM job_results", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn list_results(
        &self,
        user: Option<&str>,
        status: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredResult>> {
        let mut sql = String::from(
            "SELECT id, user, company_url, page, ordinal, title, company,
                    experience_required, salary, location, posted, openings,
                    applicants, key_skills, role_info, early_applicant,
                    skills_match, location_match, experience_match, score,
                    match_status, apply_type, status, skip_reason, recorded_at
             FROM job_results WHERE 1=1",
        );

        let mut params: Vec<String> = vec![];
        if let Some(u) = user {
            sql.push_str(&format!(" AND user = ?{}", params.len() + 1));
            params.push(u.to_string());
        }
        if let Some(s) = status {
            sql.push_str(&format!(" AND status = ?{}", params.len() + 1));
            params.push(s.to_string());
        }
        sql.push_str(" ORDER BY recorded_at DESC, id DESC");
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match params.len() {
            0 => stmt.query_map([], Self::row_to_result)?,
            1 => stmt.query_map([&params[0]], Self::row_to_result)?,
            2 => stmt.query_map([&params[0], &params[1]], Self::row_to_result)?,
            _ => return Err(anyhow!("Too many parameters")),
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list results")
    }

    /// (status, count) pairs, for the summary line.
    pub fn count_by_status(&self, user: Option<&str>) -> Result<Vec<(String, i64)>> {
        let mut sql =
            String::from("SELECT status, COUNT(*) FROM job_results WHERE 1=1");
        if user.is_some() {
            sql.push_str(" AND user = ?1");
        }
        sql.push_str(" GROUP BY status ORDER BY status");

        let mut stmt = self.conn.prepare(&sql)?;
        let mapper = |row: &rusqlite::Row| -> rusqlite::Result<(String, i64)> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let rows = match user {
            Some(u) => stmt.query_map([u], mapper)?,
            None => stmt.query_map([], mapper)?,
        };
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to count results")
    }

    fn row_to_result(row: &rusqlite::Row) -> rusqlite::Result<StoredResult> {
        let key_skills: String = row.get(13)?;
        let role_info: String = row.get(14)?;
        let match_status: String = row.get(20)?;
        let apply_type: String = row.get(21)?;
        let status: String = row.get(22)?;
        let recorded_at: String = row.get(24)?;
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(StoredResult {
            id: row.get(0)?,
            user: row.get(1)?,
            result: JobResult {
                url: row.get(2)?,
                page: row.get(3)?,
                ordinal: row.get(4)?,
                detail: JobDetail {
                    title: row.get(5)?,
                    company: row.get(6)?,
                    experience_required: row.get(7)?,
                    salary: row.get(8)?,
                    location: row.get(9)?,
                    posted: row.get(10)?,
                    openings: row.get(11)?,
                    applicants: row.get(12)?,
                    key_skills: split_list(&key_skills, ", "),
                    role_info: split_list(&role_info, " | "),
                },
                match_result: MatchResult {
                    signals: MatchSignals {
                        early_applicant: row.get(15)?,
                        skills: row.get(16)?,
                        location: row.get(17)?,
                        experience: row.get(18)?,
                    },
                    score: row.get(19)?,
                    status: MatchStatus::parse(&match_status),
                },
                apply_type: ApplyType::parse(&apply_type),
                status: ApplicationStatus::parse(&status),
                skip_reason: row.get(23)?,
                recorded_at,
            },
        })
    }
}

// --- Helpers ---

fn split_list(raw: &str, sep: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(sep).map(|s| s.to_string()).collect()
}
