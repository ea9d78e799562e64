use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::models::{JobResult, StoredResult};

const HEADER: [&str; 19] = [
    "user",
    "url",
    "page",
    "ordinal",
    "title",
    "company",
    "experience_required",
    "salary",
    "location",
    "posted",
    "openings",
    "applicants",
    "key_skills",
    "score",
    "match_status",
    "apply_type",
    "status",
    "skip_reason",
    "recorded_at",
];

/// Where the run batch lands when no other path is configured: a
/// results.csv next to the database.
pub fn default_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "pounce") {
        proj_dirs.data_dir().join("results.csv")
    } else {
        PathBuf::from("results.csv")
    }
}

/// Write one run's results (or a store dump) as CSV, overwriting the
/// target file.
pub fn write_csv(path: &Path, user: &str, results: &[JobResult]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    writer.write_record(HEADER)?;
    for result in results {
        writer.write_record(row(user, result))?;
    }
    writer.flush()?;
    Ok(results.len())
}

/// Dump stored rows (possibly spanning several portal users) as CSV.
pub fn write_csv_stored(path: &Path, rows: &[StoredResult]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    writer.write_record(HEADER)?;
    for stored in rows {
        writer.write_record(row(&stored.user, &stored.result))?;
    }
    writer.flush()?;
    Ok(rows.len())
}

fn row(user: &str, r: &JobResult) -> Vec<String> {
    vec![
        user.to_string(),
        r.url.clone(),
        r.page.to_string(),
        r.ordinal.to_string(),
        r.detail.title.clone(),
        r.detail.company.clone(),
        r.detail.experience_required.clone(),
        r.detail.salary.clone(),
        r.detail.location.clone(),
        r.detail.posted.clone(),
        r.detail.openings.clone(),
        r.detail.applicants.clone(),
        r.detail.key_skills.join(", "),
        r.match_result.score.to_string(),
        r.match_result.status.as_str().to_string(),
        r.apply_type.as_str().to_string(),
        r.status.as_str().to_string(),
        r.skip_reason.clone().unwrap_or_default(),
        r.recorded_at.to_rfc3339(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApplicationStatus, ApplyType, JobDetail, MatchResult, MatchSignals, MatchStatus,
    };
    use chrono::Utc;

    fn sample(url: &str) -> JobResult {
        JobResult {
            url: url.to_string(),
            page: 1,
            ordinal: 1,
            detail: JobDetail {
                title: "Python Developer".to_string(),
                company: "Initech, Inc".to_string(),
                key_skills: vec!["Python".to_string(), "Django".to_string()],
                ..JobDetail::default()
            },
            match_result: MatchResult {
                signals: MatchSignals::all(),
                score: 4,
                status: MatchStatus::GoodMatch,
            },
            apply_type: ApplyType::Direct,
            status: ApplicationStatus::Applied,
            skip_reason: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_write_csv_quotes_embedded_commas() {
        let path = std::env::temp_dir().join(format!(
            "pounce-export-test-{}.csv",
            std::process::id()
        ));
        let results = vec![sample("https://x.example/a"), sample("https://x.example/b")];
        let written = write_csv(&path, "me@example.com", &results).unwrap();
        assert_eq!(written, 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines = raw.lines();
        assert!(lines.next().unwrap().starts_with("user,url,page"));
        let first = lines.next().unwrap();
        assert!(first.contains("\"Initech, Inc\""));
        assert!(first.contains("\"Python, Django\""));
        assert_eq!(raw.lines().count(), 3);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_csv_stored_keeps_each_rows_user() {
        let path = std::env::temp_dir().join(format!(
            "pounce-export-stored-test-{}.csv",
            std::process::id()
        ));
        let rows = vec![
            StoredResult {
                id: 1,
                user: "one@example.com".to_string(),
                result: sample("https://x.example/a"),
            },
            StoredResult {
                id: 2,
                user: "two@example.com".to_string(),
                result: sample("https://x.example/b"),
            },
        ];
        let written = write_csv_stored(&path, &rows).unwrap();
        assert_eq!(written, 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("one@example.com"));
        assert!(raw.contains("two@example.com"));

        std::fs::remove_file(&path).ok();
    }
}
