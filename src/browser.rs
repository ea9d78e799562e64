use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thirtyfour::prelude::*;

use crate::config::BrowserOptions;
use crate::locator::{Locator, Query};

/// Driver-boundary failures, classified so callers can tell a missing
/// element from a dead session.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("no visible element matches {0}")]
    NotFound(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser session lost: {0}")]
    Session(String),
    #[error("script failed: {0}")]
    Script(String),
    #[error("screenshot failed: {0}")]
    Screenshot(String),
    #[error("driver error: {0}")]
    Driver(String),
}

fn classify(err: thirtyfour::error::WebDriverError) -> BrowserError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        BrowserError::Timeout(msg)
    } else if lower.contains("invalid session")
        || lower.contains("session not created")
        || lower.contains("no such window")
        || lower.contains("disconnected")
    {
        BrowserError::Session(msg)
    } else {
        BrowserError::Driver(msg)
    }
}

/// Everything the engine asks of a page. Operations take locators, not
/// element handles; the implementation re-finds on every call so stale
/// references never leak upward.
///
/// Read contract: `read_text` fails with `NotFound` when nothing
/// matches, while `read_texts` / `read_attrs` return an empty list.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    /// Number of *visible* elements matching the locator.
    async fn visible_count(&self, locator: &Locator) -> Result<usize, BrowserError>;
    async fn click(&self, locator: &Locator) -> Result<(), BrowserError>;
    /// Click the nth (0-based) visible match.
    async fn click_nth(&self, locator: &Locator, index: usize) -> Result<(), BrowserError>;
    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError>;
    async fn press_enter(&self, locator: &Locator) -> Result<(), BrowserError>;
    async fn read_text(&self, locator: &Locator) -> Result<String, BrowserError>;
    async fn read_texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError>;
    async fn read_attrs(&self, locator: &Locator, attr: &str) -> Result<Vec<String>, BrowserError>;
    async fn run_script(&self, script: &str) -> Result<(), BrowserError>;
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;
    /// Tear down the underlying session. Callers must invoke this
    /// exactly once per session, on every exit path.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Hands out browser sessions. Kept behind a trait so the run loop can
/// be driven against a scripted fake.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Browser>>;
}

/// Best-effort masking of the usual automation tells.
pub const STEALTH_SCRIPT: &str = r"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    window.chrome = window.chrome || { runtime: {} };
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
";

pub const SCROLL_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";
pub const SCROLL_TOP_SCRIPT: &str = "window.scrollTo(0, 0);";

/// Checks the WebDriver /status endpoint before we pay for a session
/// attempt, so a missing chromedriver fails with a usable message.
pub async fn probe_webdriver(url: &str) -> Result<()> {
    let status_url = format!("{}/status", url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let resp = client.get(&status_url).send().await.with_context(|| {
        format!("No WebDriver answering at {url}. Start chromedriver (or selenium) first.")
    })?;
    if !resp.status().is_success() {
        return Err(anyhow!(
            "WebDriver at {url} returned HTTP {} from /status",
            resp.status()
        ));
    }
    let body: serde_json::Value = resp
        .json()
        .await
        .context("WebDriver /status returned invalid JSON")?;
    let ready = body
        .pointer("/value/ready")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if !ready {
        return Err(anyhow!("WebDriver at {url} reports ready=false"));
    }
    Ok(())
}

pub struct WebDriverBrowser {
    driver: WebDriver,
}

impl WebDriverBrowser {
    pub async fn launch(options: &BrowserOptions) -> Result<Self, BrowserError> {
        let mut caps = DesiredCapabilities::chrome();
        let args = [
            "--disable-blink-features=AutomationControlled",
            "--window-size=1440,900",
            "--disable-notifications",
            "--no-first-run",
        ];
        for arg in args {
            caps.add_arg(arg).map_err(classify)?;
        }
        if options.headless {
            caps.add_arg("--headless=new").map_err(classify)?;
        }
        let driver = WebDriver::new(options.webdriver_url.as_str(), caps)
            .await
            .map_err(classify)?;
        Ok(Self { driver })
    }

    async fn find_visible(&self, locator: &Locator) -> Result<Vec<WebElement>, BrowserError> {
        let by = match locator.query() {
            Query::Css(css) => By::Css(css),
            Query::XPath(xpath) => By::XPath(xpath),
        };
        let elems = self.driver.find_all(by).await.map_err(classify)?;
        let mut visible = Vec::with_capacity(elems.len());
        for elem in elems {
            if elem.is_displayed().await.unwrap_or(false) {
                visible.push(elem);
            }
        }
        Ok(visible)
    }

    async fn first_visible(&self, locator: &Locator) -> Result<WebElement, BrowserError> {
        self.find_visible(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::NotFound(locator.to_string()))
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.driver.goto(url).await.map_err(|e| match classify(e) {
            BrowserError::Driver(msg) => BrowserError::Navigation(msg),
            other => other,
        })
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.driver.current_url().await.map_err(classify)?.to_string())
    }

    async fn visible_count(&self, locator: &Locator) -> Result<usize, BrowserError> {
        Ok(self.find_visible(locator).await?.len())
    }

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        let elem = self.first_visible(locator).await?;
        elem.click().await.map_err(classify)
    }

    async fn click_nth(&self, locator: &Locator, index: usize) -> Result<(), BrowserError> {
        let elems = self.find_visible(locator).await?;
        let elem = elems
            .get(index)
            .ok_or_else(|| BrowserError::NotFound(format!("{locator}[{index}]")))?;
        elem.click().await.map_err(classify)
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        let elem = self.first_visible(locator).await?;
        // Focus first; contenteditable widgets drop keys without it.
        let _ = elem.click().await;
        let _ = elem.clear().await;
        elem.send_keys(text).await.map_err(classify)
    }

    async fn press_enter(&self, locator: &Locator) -> Result<(), BrowserError> {
        let elem = self.first_visible(locator).await?;
        elem.send_keys("" + Key::Enter).await.map_err(classify)
    }

    async fn read_text(&self, locator: &Locator) -> Result<String, BrowserError> {
        let elem = self.first_visible(locator).await?;
        elem.text().await.map_err(classify)
    }

    async fn read_texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let elems = self.find_visible(locator).await?;
        let mut texts = Vec::with_capacity(elems.len());
        for elem in elems {
            texts.push(elem.text().await.map_err(classify)?);
        }
        Ok(texts)
    }

    async fn read_attrs(&self, locator: &Locator, attr: &str) -> Result<Vec<String>, BrowserError> {
        let elems = self.find_visible(locator).await?;
        let mut values = Vec::with_capacity(elems.len());
        for elem in elems {
            if let Some(value) = elem.attr(attr).await.map_err(classify)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    async fn run_script(&self, script: &str) -> Result<(), BrowserError> {
        self.driver
            .execute(script, Vec::new())
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.driver
            .screenshot(path)
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.driver.clone().quit().await.map_err(classify)
    }
}

pub struct WebDriverProvider {
    options: BrowserOptions,
}

impl WebDriverProvider {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BrowserProvider for WebDriverProvider {
    async fn open(&self) -> Result<Box<dyn Browser>> {
        probe_webdriver(&self.options.webdriver_url).await?;
        let browser = WebDriverBrowser::launch(&self.options)
            .await
            .context("Failed to start WebDriver session")?;
        Ok(Box::new(browser))
    }
}


#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;
    use crate::locator::Locator;

    #[tokio::test]
    async fn test_fake_click_effects_mutate_page() {
        let button = Locator::id("apply-button");
        let chat = Locator::id("chat");
        let browser = FakeBrowser::new();
        browser.add_page(
            "https://jobs.example/job/1",
            FakePage::new().with(
                FakeElement::new(button.clone())
                    .on_click(ClickEffect::Add(vec![FakeElement::new(chat.clone())]))
                    .on_click(ClickEffect::Remove(button.clone())),
            ),
        );

        browser.goto("https://jobs.example/job/1").await.unwrap();
        assert_eq!(browser.visible_count(&chat).await.unwrap(), 0);
        browser.click(&button).await.unwrap();
        assert_eq!(browser.visible_count(&chat).await.unwrap(), 1);
        assert_eq!(browser.visible_count(&button).await.unwrap(), 0);
        assert!(browser.click(&button).await.is_err());
    }

    #[tokio::test]
    async fn test_fake_seeded_load_failures() {
        let browser = FakeBrowser::new();
        browser.add_page("https://jobs.example", FakePage::new().failing_loads(2));

        assert!(browser.goto("https://jobs.example").await.is_err());
        assert!(browser.goto("https://jobs.example").await.is_err());
        browser.goto("https://jobs.example").await.unwrap();
        assert_eq!(browser.goto_count("https://jobs.example"), 3);
        browser.close().await.unwrap();
        assert_eq!(browser.close_count(), 1);
    }

    #[tokio::test]
    #[ignore] // Needs a running chromedriver
    async fn test_launch_against_local_webdriver() {
        let options = BrowserOptions::default();
        probe_webdriver(&options.webdriver_url).await.unwrap();
        let browser = WebDriverBrowser::launch(&options).await.unwrap();
        browser.goto("https://example.com").await.unwrap();
        let url = browser.current_url().await.unwrap();
        assert!(url.contains("example.com"));
        browser.close().await.unwrap();
    }
}
