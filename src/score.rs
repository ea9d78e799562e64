use crate::browser::{Browser, BrowserError};
use crate::locator::SelectorBook;
use crate::models::{JobDetail, MatchResult, MatchSignals, MatchStatus};
use crate::resolver::{read_all_texts, read_first_text};

/// Scrape the detail page. Every field is optional on the page; a
/// missed selector leaves the field empty instead of failing the job.
pub async fn read_detail(
    browser: &dyn Browser,
    book: &SelectorBook,
) -> Result<JobDetail, BrowserError> {
    let stats = read_all_texts(browser, &book.detail_stats).await?;
    Ok(JobDetail {
        title: read_first_text(browser, &book.detail_title).await?.unwrap_or_default(),
        company: read_first_text(browser, &book.detail_company).await?.unwrap_or_default(),
        experience_required: read_first_text(browser, &book.detail_experience)
            .await?
            .unwrap_or_default(),
        salary: read_first_text(browser, &book.detail_salary).await?.unwrap_or_default(),
        location: read_first_text(browser, &book.detail_location).await?.unwrap_or_default(),
        posted: stat_value(&stats, "posted"),
        openings: stat_value(&stats, "openings"),
        applicants: stat_value(&stats, "applicants"),
        key_skills: read_all_texts(browser, &book.detail_skills).await?,
        role_info: read_all_texts(browser, &book.detail_role_info).await?,
    })
}

/// Pull "Label: value" out of the stat lines, case-insensitively.
fn stat_value(stats: &[String], label: &str) -> String {
    for line in stats {
        let lower = line.to_lowercase();
        if !lower.starts_with(label) {
            continue;
        }
        let rest = &line[label.len()..];
        return rest.trim_start_matches(':').trim().to_string();
    }
    String::new()
}

/// Read the compatibility widget. A page without the widget (or with
/// an empty one) reads as no signals at all.
pub async fn read_signals(
    browser: &dyn Browser,
    book: &SelectorBook,
) -> Result<MatchSignals, BrowserError> {
    let items = read_all_texts(browser, &book.match_signal_items).await?;
    let lowered: Vec<String> = items.iter().map(|i| i.to_lowercase()).collect();
    let has = |label: &str| {
        let label = label.to_lowercase();
        lowered.iter().any(|item| item.contains(&label))
    };
    let labels = &book.signal_labels;
    Ok(MatchSignals {
        early_applicant: has(&labels.early_applicant),
        skills: has(&labels.skills),
        location: has(&labels.location),
        experience: has(&labels.experience),
    })
}

/// Score is the count of true signals. Only a full house clears the
/// apply gate; anything less is recorded and skipped.
pub fn evaluate(signals: MatchSignals) -> MatchResult {
    let score = [
        signals.early_applicant,
        signals.skills,
        signals.location,
        signals.experience,
    ]
    .iter()
    .filter(|on| **on)
    .count() as u8;
    let status = if score == MatchSignals::COUNT {
        MatchStatus::GoodMatch
    } else {
        MatchStatus::PoorMatch
    };
    MatchResult {
        signals,
        score,
        status,
    }
}
