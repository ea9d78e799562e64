use crate::browser::{Browser, BrowserError};
use crate::locator::Locator;

/// Walks a fallback cascade in order and keeps the first locator that
/// matches exactly one visible element. Zero matches and ambiguous
/// (2+) matches both fall through to the next candidate. Only a lost
/// session aborts the walk; per-locator driver noise counts as a miss.
pub async fn resolve_unique(
    browser: &dyn Browser,
    cascade: &[Locator],
) -> Result<Option<Locator>, BrowserError> {
    for locator in cascade {
        match browser.visible_count(locator).await {
            Ok(1) => return Ok(Some(locator.clone())),
            Ok(_) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(_) => {}
        }
    }
    Ok(None)
}

/// Like `resolve_unique` but accepts any positive match count. For
/// markers and item lists where several hits are expected.
pub async fn resolve_present(
    browser: &dyn Browser,
    cascade: &[Locator],
) -> Result<Option<Locator>, BrowserError> {
    for locator in cascade {
        match browser.visible_count(locator).await {
            Ok(n) if n > 0 => return Ok(Some(locator.clone())),
            Ok(_) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(_) => {}
        }
    }
    Ok(None)
}

/// Text of the first present candidate, or None when the whole cascade
/// misses. Scrapers treat None as "page does not expose this field".
pub async fn read_first_text(
    browser: &dyn Browser,
    cascade: &[Locator],
) -> Result<Option<String>, BrowserError> {
    match resolve_present(browser, cascade).await? {
        Some(locator) => match browser.read_text(&locator).await {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(e) if is_fatal(&e) => Err(e),
            Err(_) => Ok(None),
        },
        None => Ok(None),
    }
}

/// Texts of every visible match of the first candidate that yields any.
pub async fn read_all_texts(
    browser: &dyn Browser,
    cascade: &[Locator],
) -> Result<Vec<String>, BrowserError> {
    for locator in cascade {
        match browser.read_texts(locator).await {
            Ok(texts) if !texts.is_empty() => {
                return Ok(texts
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect());
            }
            Ok(_) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(_) => {}
        }
    }
    Ok(Vec::new())
}

/// Attribute values of every visible match of the first candidate that
/// yields any.
pub async fn read_all_attrs(
    browser: &dyn Browser,
    cascade: &[Locator],
    attr: &str,
) -> Result<Vec<String>, BrowserError> {
    for locator in cascade {
        match browser.read_attrs(locator, attr).await {
            Ok(values) if !values.is_empty() => return Ok(values),
            Ok(_) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(_) => {}
        }
    }
    Ok(Vec::new())
}

/// Resolve and click. Returns false when the cascade misses entirely;
/// the click itself failing is reported as an error.
pub async fn click_first(
    browser: &dyn Browser,
    cascade: &[Locator],
) -> Result<bool, BrowserError> {
    match resolve_unique(browser, cascade).await? {
        Some(locator) => {
            browser.click(&locator).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn is_fatal(err: &BrowserError) -> bool {
    matches!(err, BrowserError::Session(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeBrowser, FakeElement, FakePage};

    fn browser_with(elements: Vec<FakeElement>) -> FakeBrowser {
        let browser = FakeBrowser::new();
        let mut page = FakePage::new();
        for element in elements {
            page = page.with(element);
        }
        browser.add_page("https://jobs.example", page);
        browser
    }

    #[tokio::test]
    async fn test_first_unique_match_wins() {
        let primary = Locator::id("apply-button");
        let fallback = Locator::attr_contains("class", "apply-button");
        let browser = browser_with(vec![
            FakeElement::new(primary.clone()),
            FakeElement::new(fallback.clone()),
        ]);
        browser.goto("https://jobs.example").await.unwrap();

        let hit = resolve_unique(&browser, &[primary.clone(), fallback]).await.unwrap();
        assert_eq!(hit, Some(primary));
    }

    #[tokio::test]
    async fn test_ambiguous_match_falls_through() {
        let primary = Locator::css("a.title");
        let fallback = Locator::id("the-one");
        let browser = browser_with(vec![
            FakeElement::new(primary.clone()).count(3),
            FakeElement::new(fallback.clone()),
        ]);
        browser.goto("https://jobs.example").await.unwrap();

        let hit = resolve_unique(&browser, &[primary.clone(), fallback.clone()])
            .await
            .unwrap();
        assert_eq!(hit, Some(fallback));

        // The counting path is happy with the ambiguous one.
        let hit = resolve_present(&browser, &[primary.clone()]).await.unwrap();
        assert_eq!(hit, Some(primary));
    }

    #[tokio::test]
    async fn test_exhausted_cascade_is_a_miss() {
        let browser = browser_with(vec![]);
        browser.goto("https://jobs.example").await.unwrap();

        let cascade = [Locator::id("ghost"), Locator::css("div.ghost")];
        assert_eq!(resolve_unique(&browser, &cascade).await.unwrap(), None);
        assert!(!click_first(&browser, &cascade).await.unwrap());
        assert_eq!(read_first_text(&browser, &cascade).await.unwrap(), None);
        assert!(read_all_texts(&browser, &cascade).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_all_texts_trims_and_drops_blanks() {
        let skills = Locator::css("div.key-skill a");
        let browser = browser_with(vec![
            FakeElement::new(skills.clone()).texts(&[" Python ", "", "Django"]),
        ]);
        browser.goto("https://jobs.example").await.unwrap();

        let texts = read_all_texts(&browser, &[skills]).await.unwrap();
        assert_eq!(texts, vec!["Python".to_string(), "Django".to_string()]);
    }
}
