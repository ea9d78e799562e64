use std::time::Duration;

use crate::browser::{Browser, BrowserError, SCROLL_BOTTOM_SCRIPT, SCROLL_TOP_SCRIPT};
use crate::config::Pacing;
use crate::locator::{Locator, SelectorBook};
use crate::pacing::{Backoff, Sleeper};
use crate::progress::Reporter;
use crate::resolver::resolve_present;

const SCROLL_PAUSE_MS: u64 = 400;

/// Navigate with retries and a settle pause. `expect` holds marker
/// cascades the loaded page must show at least one of (results or
/// no-results markers on listing pages); pass an empty slice to accept
/// any successful navigation. Returns false when every attempt failed;
/// the caller decides whether that skips a page or ends the run. Only
/// a lost session is propagated as an error.
pub async fn safe_load(
    browser: &dyn Browser,
    url: &str,
    expect: &[&[Locator]],
    pacing: &Pacing,
    sleeper: &dyn Sleeper,
    reporter: &Reporter<'_>,
) -> Result<bool, BrowserError> {
    let backoff = Backoff::from_millis(&pacing.load_retry_ms);
    for attempt in 0..backoff.attempts() {
        match attempt_load(browser, url, expect, pacing, sleeper).await {
            Ok(true) => return Ok(true),
            Ok(false) => reporter.warning(format!(
                "Page loaded without its markers (attempt {}/{}): {url}",
                attempt + 1,
                backoff.attempts()
            )),
            Err(BrowserError::Session(msg)) => return Err(BrowserError::Session(msg)),
            Err(e) => reporter.warning(format!(
                "Page load failed (attempt {}/{}): {}",
                attempt + 1,
                backoff.attempts(),
                e
            )),
        }
        if let Some(delay) = backoff.delay_after(attempt) {
            sleeper.sleep(delay).await;
        }
    }
    reporter.warning(format!("Giving up on {url} after {} attempts", backoff.attempts()));
    Ok(false)
}

/// One navigation attempt. An ambiguous page (up, but no expected
/// marker) gets a single scroll pass to flush lazy content before the
/// verdict.
async fn attempt_load(
    browser: &dyn Browser,
    url: &str,
    expect: &[&[Locator]],
    pacing: &Pacing,
    sleeper: &dyn Sleeper,
) -> Result<bool, BrowserError> {
    browser.goto(url).await?;
    sleeper.sleep(Duration::from_millis(pacing.settle_ms)).await;
    if expect.is_empty() || any_marker_present(browser, expect).await? {
        scroll_and_return(browser, sleeper).await;
        return Ok(true);
    }
    scroll_and_return(browser, sleeper).await;
    any_marker_present(browser, expect).await
}

async fn any_marker_present(
    browser: &dyn Browser,
    expect: &[&[Locator]],
) -> Result<bool, BrowserError> {
    for cascade in expect {
        if resolve_present(browser, cascade).await?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Scroll to the bottom and back to coax lazy content onto the page.
/// Script failures are ignored.
async fn scroll_and_return(browser: &dyn Browser, sleeper: &dyn Sleeper) {
    if browser.run_script(SCROLL_BOTTOM_SCRIPT).await.is_ok() {
        sleeper.sleep(Duration::from_millis(SCROLL_PAUSE_MS)).await;
        let _ = browser.run_script(SCROLL_TOP_SCRIPT).await;
    }
}

/// Close whatever transient popups the portal threw up. One pass over
/// the dismiss cascade; click failures are ignored.
pub async fn dismiss_overlays(
    browser: &dyn Browser,
    book: &SelectorBook,
) -> Result<u32, BrowserError> {
    let mut dismissed = 0;
    for locator in &book.overlay_dismiss {
        match browser.visible_count(locator).await {
            Ok(n) if n > 0 => {
                if browser.click(locator).await.is_ok() {
                    dismissed += 1;
                }
            }
            Ok(_) => {}
            Err(BrowserError::Session(msg)) => return Err(BrowserError::Session(msg)),
            Err(_) => {}
        }
    }
    Ok(dismissed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeBrowser, FakeElement, FakePage};
    use crate::pacing::testing::RecordingSleeper;
    use crate::progress::{NullSink, Reporter};
    use crate::locator::Locator;

    #[tokio::test]
    async fn test_safe_load_retries_with_backoff() {
        let browser = FakeBrowser::new();
        browser.add_page("https://jobs.example", FakePage::new().failing_loads(2));
        let sleeper = RecordingSleeper::default();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);
        let pacing = Pacing::default();

        let loaded = safe_load(&browser, "https://jobs.example", &[], &pacing, &sleeper, &reporter)
            .await
            .unwrap();

        assert!(loaded);
        assert_eq!(browser.goto_count("https://jobs.example"), 3);
        let slept = sleeper.slept.lock().unwrap();
        assert_eq!(slept[0], Duration::from_millis(2000));
        assert_eq!(slept[1], Duration::from_millis(3000));
        // settle pause after the successful attempt
        assert!(slept.contains(&Duration::from_millis(pacing.settle_ms)));
    }

    #[tokio::test]
    async fn test_safe_load_gives_up_after_schedule() {
        let browser = FakeBrowser::new();
        browser.add_page("https://jobs.example", FakePage::new().failing_loads(99));
        let sleeper = RecordingSleeper::default();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);
        let pacing = Pacing::default();

        let loaded = safe_load(&browser, "https://jobs.example", &[], &pacing, &sleeper, &reporter)
            .await
            .unwrap();

        assert!(!loaded);
        assert_eq!(browser.goto_count("https://jobs.example"), 4);
        let slept = sleeper.slept.lock().unwrap();
        assert_eq!(
            slept.as_slice(),
            &[
                Duration::from_millis(2000),
                Duration::from_millis(3000),
                Duration::from_millis(3000),
            ]
        );
    }

    #[tokio::test]
    async fn test_safe_load_retries_when_markers_never_show() {
        let book = SelectorBook::default();
        let browser = FakeBrowser::new();
        // The page comes up but shows neither a results nor a
        // no-results marker.
        browser.add_page("https://jobs.example/search", FakePage::new());
        let sleeper = RecordingSleeper::default();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);
        let pacing = Pacing::default();
        let expect: [&[Locator]; 2] = [&book.results_markers, &book.no_results_markers];

        let loaded = safe_load(
            &browser,
            "https://jobs.example/search",
            &expect,
            &pacing,
            &sleeper,
            &reporter,
        )
        .await
        .unwrap();
        assert!(!loaded);
        assert_eq!(browser.goto_count("https://jobs.example/search"), 4);
    }

    #[tokio::test]
    async fn test_safe_load_accepts_either_marker() {
        let book = SelectorBook::default();
        let browser = FakeBrowser::new();
        browser.add_page(
            "https://jobs.example/full",
            FakePage::new().with(FakeElement::new(book.results_markers[0].clone())),
        );
        browser.add_page(
            "https://jobs.example/empty",
            FakePage::new().with(FakeElement::new(book.no_results_markers[0].clone())),
        );
        let sleeper = RecordingSleeper::default();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);
        let pacing = Pacing::default();
        let expect: [&[Locator]; 2] = [&book.results_markers, &book.no_results_markers];

        for url in ["https://jobs.example/full", "https://jobs.example/empty"] {
            let loaded = safe_load(&browser, url, &expect, &pacing, &sleeper, &reporter)
                .await
                .unwrap();
            assert!(loaded, "{url} should verify");
            assert_eq!(browser.goto_count(url), 1);
        }
    }

    #[tokio::test]
    async fn test_dismiss_overlays_clicks_present_ones() {
        let book = SelectorBook::default();
        let cross = book.overlay_dismiss[0].clone();
        let browser = FakeBrowser::new();
        browser.add_page(
            "https://jobs.example",
            FakePage::new().with(FakeElement::new(cross.clone())),
        );
        browser.goto("https://jobs.example").await.unwrap();

        let dismissed = dismiss_overlays(&browser, &book).await.unwrap();
        assert_eq!(dismissed, 1);

        // Second pass finds nothing new to close.
        let browser2 = FakeBrowser::new();
        browser2.goto("about:blank").await.unwrap();
        assert_eq!(dismiss_overlays(&browser2, &book).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overlay_locator_is_unique_enough() {
        // Clicking a multi-match dismisser is fine; it is not resolved
        // through the unique path.
        let book = SelectorBook::default();
        let cross = book.overlay_dismiss[1].clone();
        let browser = FakeBrowser::new();
        browser.add_page(
            "https://jobs.example",
            FakePage::new().with(FakeElement::new(cross).count(2)),
        );
        browser.goto("https://jobs.example").await.unwrap();
        assert_eq!(dismiss_overlays(&browser, &book).await.unwrap(), 1);
    }
}
