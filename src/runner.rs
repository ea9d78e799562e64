use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::browser::{Browser, BrowserError, BrowserProvider};
use crate::chat;
use crate::config::RunConfig;
use crate::crawl::{self, ListingState};
use crate::db::ResultStore;
use crate::export;
use crate::locator::{self, Locator, SelectorBook};
use crate::models::{
    ApplicationStatus, ApplyType, JobDetail, JobListing, JobResult, MatchResult, MatchSignals,
    RunReport,
};
use crate::nav;
use crate::pacing::{self, Sleeper};
use crate::progress::{ProgressSink, Reporter};
use crate::resolver::{resolve_present, resolve_unique};
use crate::score;
use crate::session;

pub const SKIP_POOR_MATCH: &str = "poor match";
pub const SKIP_EXTERNAL: &str = "external application";
pub const SKIP_NO_BUTTON: &str = "no apply button";
pub const SKIP_ALREADY_APPLIED: &str = "already applied";
pub const SKIP_LOAD_FAILED: &str = "page load failed";
pub const SKIP_CLICK_FAILED: &str = "apply click failed";
pub const SKIP_DRY_RUN: &str = "dry run";
pub const SKIP_BROWSER_ERROR: &str = "browser error";

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("a run is already active")]
    AlreadyRunning,
}

/// Owns the single-flight guard and the stop flag. One agent instance
/// runs at most one session at a time; a second `run` call while the
/// guard is held is rejected before any browser is launched.
#[derive(Default)]
pub struct Agent {
    running: AtomicBool,
    stop: AtomicBool,
}

/// Per-run working set, created at run start and folded into the
/// report at run end.
#[derive(Default)]
struct RunState {
    pages_visited: u32,
    jobs_seen: u32,
    applied: u32,
    skipped: u32,
    results: Vec<JobResult>,
}

impl RunState {
    fn skip_reason_counts(&self) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            if let Some(reason) = &result.skip_reason {
                *counts.entry(reason.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[derive(Clone, Copy)]
struct RunCtx<'a> {
    config: &'a RunConfig,
    book: &'a SelectorBook,
    browser: &'a dyn Browser,
    sleeper: &'a dyn Sleeper,
    reporter: &'a Reporter<'a>,
}

enum ApplyAction {
    Direct(Locator),
    External,
    None,
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the active run to stop. Honored at the next page or job
    /// checkpoint; mid-job work finishes first.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Execute one full run. Always returns a report when a run was
    /// admitted: fatal errors surface as `success: false` with the
    /// partial results and log attached, never as a bare Err.
    pub async fn run(
        &self,
        config: &RunConfig,
        book: &SelectorBook,
        provider: &dyn BrowserProvider,
        store: &mut ResultStore,
        sleeper: &dyn Sleeper,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, RunnerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunnerError::AlreadyRunning);
        }
        self.stop.store(false, Ordering::SeqCst);

        let started_at = Utc::now();
        let reporter = Reporter::new(sink);
        let mut state = RunState::default();

        let outcome = self
            .drive(config, book, provider, sleeper, &reporter, &mut state)
            .await;

        let mut error = outcome.err().map(|e| format!("{e:#}"));
        if let Some(msg) = &error {
            reporter.error(format!("Run failed: {msg}"));
        }

        if !state.results.is_empty() {
            match store.upsert_results(&config.credentials.username, &state.results) {
                Ok(summary) => reporter.info(format!(
                    "Saved {} results ({} new)",
                    summary.written, summary.new_rows
                )),
                Err(e) => {
                    reporter.error(format!("Failed to save results: {e:#}"));
                    error.get_or_insert_with(|| format!("failed to save results: {e:#}"));
                }
            }
            match export::write_csv(
                &config.export_csv,
                &config.credentials.username,
                &state.results,
            ) {
                Ok(n) => reporter.info(format!(
                    "Exported {n} rows to {}",
                    config.export_csv.display()
                )),
                Err(e) => reporter.warning(format!("CSV export failed: {e:#}")),
            }
        }

        let report = RunReport {
            success: error.is_none(),
            error,
            started_at,
            finished_at: Utc::now(),
            pages_visited: state.pages_visited,
            jobs_seen: state.jobs_seen,
            jobs_applied: state.applied,
            jobs_skipped: state.skipped,
            skip_reasons: state.skip_reason_counts(),
            results: state.results,
            logs: reporter.into_entries(),
        };
        self.running.store(false, Ordering::SeqCst);
        Ok(report)
    }

    /// Open the session, run the pipeline, and close the session on
    /// every path out, exactly once.
    async fn drive(
        &self,
        config: &RunConfig,
        book: &SelectorBook,
        provider: &dyn BrowserProvider,
        sleeper: &dyn Sleeper,
        reporter: &Reporter<'_>,
        state: &mut RunState,
    ) -> Result<()> {
        reporter.info(format!(
            "Starting run for {} (up to {} listing pages)",
            config.credentials.username, config.search.pages
        ));
        if config.dry_run {
            reporter.info("Dry run: no application will be submitted");
        }

        let browser = provider
            .open()
            .await
            .context("Could not open a browser session")?;

        let ctx = RunCtx {
            config,
            book,
            browser: browser.as_ref(),
            sleeper,
            reporter,
        };
        let result = self.pipeline(&ctx, state).await;

        if result.is_err() {
            capture_failure_screenshot(browser.as_ref(), reporter).await;
        }
        if let Err(e) = browser.close().await {
            reporter.warning(format!("Browser shutdown reported an error: {e}"));
        }
        result
    }

    async fn pipeline(&self, ctx: &RunCtx<'_>, state: &mut RunState) -> Result<()> {
        let RunCtx {
            config,
            book,
            browser,
            sleeper,
            reporter,
        } = *ctx;

        session::login(
            browser,
            book,
            &config.credentials,
            &config.pacing,
            sleeper,
            reporter,
        )
        .await?;

        let search_url = book.search_url(&config.search);
        let mut seen: HashSet<String> = HashSet::new();

        'pages: for page in 1..=config.search.pages {
            if self.stop_requested() {
                reporter.warning("Stop requested, ending run");
                break;
            }

            let url = locator::page_url(&search_url, &book.page_rule, page);
            reporter.info(format!("Listing page {page}: {url}"));
            let markers: [&[Locator]; 2] = [&book.results_markers, &book.no_results_markers];
            if !nav::safe_load(browser, &url, &markers, &config.pacing, sleeper, reporter).await? {
                reporter.warning(format!("Skipping listing page {page}, it never loaded"));
                continue;
            }
            nav::dismiss_overlays(browser, book).await?;
            state.pages_visited += 1;

            if crawl::listing_state(browser, book).await? == ListingState::Empty {
                reporter.info("Portal reports no results, stopping pagination");
                break;
            }
            let listings = crawl::harvest_links(browser, book, page, &mut seen).await?;
            if listings.is_empty() {
                reporter.warning(format!("No new job links on page {page}"));
                continue;
            }
            reporter.info(format!("Found {} new jobs on page {page}", listings.len()));

            for (index, listing) in listings.iter().enumerate() {
                if self.stop_requested() {
                    reporter.warning("Stop requested, ending run");
                    break 'pages;
                }
                state.jobs_seen += 1;
                self.process_job(ctx, state, listing, (index + 1) as u32).await?;
                sleeper
                    .sleep(pacing::jitter(
                        config.pacing.job_pause_min_ms,
                        config.pacing.job_pause_max_ms,
                    ))
                    .await;
            }
        }

        reporter.info(format!(
            "Run finished: {} applied, {} skipped over {} pages",
            state.applied, state.skipped, state.pages_visited
        ));
        Ok(())
    }

    /// Job-level failures are contained here: anything short of a lost
    /// session records a skipped result and lets the run continue.
    async fn process_job(
        &self,
        ctx: &RunCtx<'_>,
        state: &mut RunState,
        listing: &JobListing,
        ordinal: u32,
    ) -> Result<()> {
        match self.try_job(ctx, state, listing, ordinal).await {
            Ok(()) => Ok(()),
            Err(BrowserError::Session(msg)) => Err(BrowserError::Session(msg).into()),
            Err(e) => {
                ctx.reporter
                    .warning(format!("Job hit a browser error ({e}), skipping"));
                record(
                    state,
                    listing,
                    ordinal,
                    JobDetail::default(),
                    score::evaluate(MatchSignals::default()),
                    ApplyType::NoButton,
                    ApplicationStatus::Skipped,
                    Some(SKIP_BROWSER_ERROR),
                );
                Ok(())
            }
        }
    }

    async fn try_job(
        &self,
        ctx: &RunCtx<'_>,
        state: &mut RunState,
        listing: &JobListing,
        ordinal: u32,
    ) -> Result<(), BrowserError> {
        let RunCtx {
            config,
            book,
            browser,
            sleeper,
            reporter,
        } = *ctx;

        if !nav::safe_load(browser, &listing.url, &[], &config.pacing, sleeper, reporter).await? {
            record(
                state,
                listing,
                ordinal,
                JobDetail::default(),
                score::evaluate(MatchSignals::default()),
                ApplyType::NoButton,
                ApplicationStatus::Skipped,
                Some(SKIP_LOAD_FAILED),
            );
            return Ok(());
        }
        nav::dismiss_overlays(browser, book).await?;

        let detail = score::read_detail(browser, book).await?;
        let signals = score::read_signals(browser, book).await?;
        let matched = score::evaluate(signals);
        let label = job_label(&detail, &listing.url);

        if resolve_present(browser, &book.already_applied_markers)
            .await?
            .is_some()
        {
            reporter.info(format!("{label}: already applied earlier, skipping"));
            record(
                state,
                listing,
                ordinal,
                detail,
                matched,
                ApplyType::Direct,
                ApplicationStatus::Skipped,
                Some(SKIP_ALREADY_APPLIED),
            );
            return Ok(());
        }

        let action = detect_apply_action(browser, book).await?;
        let apply_type = match &action {
            ApplyAction::Direct(_) => ApplyType::Direct,
            ApplyAction::External => ApplyType::External,
            ApplyAction::None => ApplyType::NoButton,
        };

        if !matched.can_apply() {
            reporter.info(format!(
                "{label}: {}/{} match signals, skipping",
                matched.score,
                MatchSignals::COUNT
            ));
            record(
                state,
                listing,
                ordinal,
                detail,
                matched,
                apply_type,
                ApplicationStatus::Skipped,
                Some(SKIP_POOR_MATCH),
            );
            return Ok(());
        }

        match action {
            ApplyAction::External => {
                reporter.info(format!("{label}: external application, skipping"));
                record(
                    state,
                    listing,
                    ordinal,
                    detail,
                    matched,
                    ApplyType::External,
                    ApplicationStatus::Skipped,
                    Some(SKIP_EXTERNAL),
                );
            }
            ApplyAction::None => {
                reporter.warning(format!("{label}: no apply button found, skipping"));
                record(
                    state,
                    listing,
                    ordinal,
                    detail,
                    matched,
                    ApplyType::NoButton,
                    ApplicationStatus::Skipped,
                    Some(SKIP_NO_BUTTON),
                );
            }
            ApplyAction::Direct(apply_locator) => {
                if config.dry_run {
                    reporter.info(format!("{label}: full match (dry run, not applying)"));
                    record(
                        state,
                        listing,
                        ordinal,
                        detail,
                        matched,
                        ApplyType::Direct,
                        ApplicationStatus::Skipped,
                        Some(SKIP_DRY_RUN),
                    );
                    return Ok(());
                }
                match browser.click(&apply_locator).await {
                    Ok(()) => {}
                    Err(BrowserError::Session(msg)) => return Err(BrowserError::Session(msg)),
                    Err(e) => {
                        reporter.warning(format!("{label}: apply click failed ({e})"));
                        record(
                            state,
                            listing,
                            ordinal,
                            detail,
                            matched,
                            ApplyType::Direct,
                            ApplicationStatus::Skipped,
                            Some(SKIP_CLICK_FAILED),
                        );
                        return Ok(());
                    }
                }
                let outcome = chat::fill_chat(
                    browser,
                    book,
                    &config.profile,
                    &config.skills,
                    &config.pacing,
                    sleeper,
                    reporter,
                )
                .await?;
                reporter.success(format!(
                    "{label}: applied ({} chat answers, {} skipped)",
                    outcome.answered, outcome.skipped
                ));
                record(
                    state,
                    listing,
                    ordinal,
                    detail,
                    matched,
                    ApplyType::Direct,
                    ApplicationStatus::Applied,
                    None,
                );
            }
        }
        Ok(())
    }
}

/// External is checked before the generic apply cascade because the
/// company-site button's label usually also matches "Apply".
async fn detect_apply_action(
    browser: &dyn Browser,
    book: &SelectorBook,
) -> Result<ApplyAction, BrowserError> {
    if resolve_unique(browser, &book.external_apply_markers)
        .await?
        .is_some()
    {
        return Ok(ApplyAction::External);
    }
    if let Some(locator) = resolve_unique(browser, &book.apply_button).await? {
        return Ok(ApplyAction::Direct(locator));
    }
    Ok(ApplyAction::None)
}

#[allow(clippy::too_many_arguments)]
fn record(
    state: &mut RunState,
    listing: &JobListing,
    ordinal: u32,
    detail: JobDetail,
    match_result: MatchResult,
    apply_type: ApplyType,
    status: ApplicationStatus,
    skip_reason: Option<&str>,
) {
    match status {
        ApplicationStatus::Applied => state.applied += 1,
        ApplicationStatus::Skipped => state.skipped += 1,
    }
    state.results.push(JobResult {
        url: listing.url.clone(),
        page: listing.page,
        ordinal,
        detail,
        match_result,
        apply_type,
        status,
        skip_reason: skip_reason.map(|s| s.to_string()),
        recorded_at: Utc::now(),
    });
}

fn job_label(detail: &JobDetail, url: &str) -> String {
    if detail.title.is_empty() {
        return url.to_string();
    }
    if detail.company.is_empty() {
        detail.title.clone()
    } else {
        format!("{} at {}", detail.title, detail.company)
    }
}

async fn capture_failure_screenshot(browser: &dyn Browser, reporter: &Reporter<'_>) {
    let name = format!("pounce-failure-{}.png", Utc::now().format("%Y%m%d-%H%M%S"));
    let path = PathBuf::from(name);
    match browser.screenshot(&path).await {
        Ok(()) => reporter.info(format!("Saved failure screenshot to {}", path.display())),
        Err(e) => reporter.warning(format!("Could not capture a failure screenshot: {e}")),
    }
}
