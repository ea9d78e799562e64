use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::export;

/// Portal login credentials. The username doubles as the identity key
/// for persisted results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One skill the candidate claims, with optional canned answers for
/// screening questions about it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    /// Alternate spellings recruiters use for the same skill.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// e.g. "5 years"
    #[serde(default)]
    pub experience: Option<String>,
    /// Self-rating on a 10 scale, e.g. "8".
    #[serde(default)]
    pub rating: Option<String>,
}

/// Free-text answers for common screening questions. Empty fields are
/// treated as "not configured" and skipped by the answer dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub full_name: String,
    pub total_experience: String,
    pub location: String,
    pub notice_period: String,
    pub current_ctc: String,
    pub expected_ctc: String,
    pub availability: String,
    pub phone: String,
    /// Free-form pitch used for "tell us about yourself" style
    /// questions.
    pub resume_text: String,
    /// Extra keyword -> answer pairs checked before the built-in
    /// dictionary. Keys match case-insensitively on containment.
    pub custom_answers: BTreeMap<String, String>,
}

/// What to crawl. Either an explicit listing URL or a keyword search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Search {
    pub keywords: String,
    pub location: String,
    /// Overrides the keyword search when set.
    pub listing_url: Option<String>,
    pub pages: u32,
}

impl Default for Search {
    fn default() -> Self {
        Self {
            keywords: String::new(),
            location: String::new(),
            listing_url: None,
            pages: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub webdriver_url: String,
    pub headless: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: false,
        }
    }
}

/// Timing knobs. Defaults follow the portal's observed tolerance; tests
/// swap in a no-op sleeper so none of these slow the suite down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// Delays between page-load retry attempts, in ms. Length + 1 is the
    /// total number of attempts.
    pub load_retry_ms: Vec<u64>,
    /// Settle time after a successful navigation.
    pub settle_ms: u64,
    /// Extra settle after submitting the login form.
    pub login_settle_ms: u64,
    /// How long to wait for the chat widget to appear after apply.
    pub chat_open_wait_ms: u64,
    /// Interval between chat polls.
    pub chat_poll_ms: u64,
    /// Hard cap on chat polls per job.
    pub chat_max_polls: u32,
    /// Random pause between jobs, min/max ms.
    pub job_pause_min_ms: u64,
    pub job_pause_max_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            load_retry_ms: vec![2000, 3000, 3000],
            settle_ms: 1500,
            login_settle_ms: 4000,
            chat_open_wait_ms: 5000,
            chat_poll_ms: 1000,
            chat_max_polls: 20,
            job_pause_min_ms: 1200,
            job_pause_max_ms: 3500,
        }
    }
}

/// Top-level run configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub credentials: Credentials,
    pub profile: Profile,
    pub skills: Vec<Skill>,
    pub search: Search,
    pub browser: BrowserOptions,
    pub pacing: Pacing,
    /// Load a custom selector book instead of the built-in one.
    pub selectors_path: Option<PathBuf>,
    /// CSV file every run writes its results to when it ends.
    pub export_csv: PathBuf,
    /// Walk the full pipeline but never click apply.
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            profile: Profile::default(),
            skills: Vec::new(),
            search: Search::default(),
            browser: BrowserOptions::default(),
            pacing: Pacing::default(),
            selectors_path: None,
            export_csv: export::default_path(),
            dry_run: false,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: RunConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "pounce") {
            proj_dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("pounce.json")
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.credentials.username.trim().is_empty() {
            return Err(anyhow!("config: credentials.username is required"));
        }
        if self.credentials.password.trim().is_empty() {
            return Err(anyhow!("config: credentials.password is required"));
        }
        if self.search.listing_url.is_none() && self.search.keywords.trim().is_empty() {
            return Err(anyhow!(
                "config: set search.keywords or search.listing_url"
            ));
        }
        if self.search.pages == 0 {
            return Err(anyhow!("config: search.pages must be at least 1"));
        }
        Ok(())
    }

    /// Template written by `pounce init` for the user to fill in.
    pub fn example() -> Self {
        Self {
            credentials: Credentials {
                username: "you@example.com".to_string(),
                password: "change-me".to_string(),
            },
            profile: Profile {
                full_name: "Your Name".to_string(),
                total_experience: "4 years".to_string(),
                location: "Pune".to_string(),
                notice_period: "30 days".to_string(),
                current_ctc: "12 LPA".to_string(),
                expected_ctc: "18 LPA".to_string(),
                availability: "Immediately available for interviews".to_string(),
                phone: "9999999999".to_string(),
                resume_text: "Backend developer with 4 years of Python and Django."
                    .to_string(),
                custom_answers: BTreeMap::new(),
            },
            skills: vec![
                Skill {
                    name: "Python".to_string(),
                    aliases: vec!["python3".to_string()],
                    experience: Some("4 years".to_string()),
                    rating: Some("8".to_string()),
                },
                Skill {
                    name: "Django".to_string(),
                    aliases: Vec::new(),
                    experience: Some("3 years".to_string()),
                    rating: None,
                },
            ],
            search: Search {
                keywords: "python developer".to_string(),
                location: "pune".to_string(),
                listing_url: None,
                pages: 2,
            },
            ..Default::default()
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}
