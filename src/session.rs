use anyhow::{Result, anyhow};
use std::time::Duration;

use crate::browser::{Browser, STEALTH_SCRIPT};
use crate::config::{Credentials, Pacing};
use crate::locator::SelectorBook;
use crate::nav::{dismiss_overlays, safe_load};
use crate::pacing::Sleeper;
use crate::progress::Reporter;
use crate::resolver::{read_first_text, resolve_unique};

/// Log in to the portal. Any failure here is fatal for the run: there
/// is no point crawling listings behind a login wall we never passed.
pub async fn login(
    browser: &dyn Browser,
    book: &SelectorBook,
    credentials: &Credentials,
    pacing: &Pacing,
    sleeper: &dyn Sleeper,
    reporter: &Reporter<'_>,
) -> Result<()> {
    reporter.info(format!("Logging in as {}", credentials.username));

    let loaded = safe_load(browser, &book.login_url, &[], pacing, sleeper, reporter).await?;
    if !loaded {
        return Err(anyhow!("Login page failed to load"));
    }
    let _ = browser.run_script(STEALTH_SCRIPT).await;
    dismiss_overlays(browser, book).await?;

    let username_field = resolve_unique(browser, &book.login_username)
        .await?
        .ok_or_else(|| anyhow!("Could not find the username field on the login page"))?;
    browser.type_text(&username_field, &credentials.username).await?;

    let password_field = resolve_unique(browser, &book.login_password)
        .await?
        .ok_or_else(|| anyhow!("Could not find the password field on the login page"))?;
    browser.type_text(&password_field, &credentials.password).await?;

    match resolve_unique(browser, &book.login_submit).await? {
        Some(submit) => browser.click(&submit).await?,
        None => {
            // No recognizable submit button; Enter in the password
            // field submits on every portal we have seen.
            reporter.warning("No login button found, submitting with Enter");
            browser.press_enter(&password_field).await?;
        }
    }

    sleeper
        .sleep(Duration::from_millis(pacing.login_settle_ms))
        .await;
    dismiss_overlays(browser, book).await?;

    verify_logged_in(browser, book).await?;
    reporter.success("Logged in");
    Ok(())
}

/// Logged in means we left the login URL, or a signed-in marker is
/// visible. Otherwise surface the portal's inline error if present.
async fn verify_logged_in(browser: &dyn Browser, book: &SelectorBook) -> Result<()> {
    let url = browser.current_url().await?;
    let still_on_login = book
        .login_url_markers
        .iter()
        .any(|marker| url.contains(marker.as_str()));
    if !still_on_login {
        return Ok(());
    }
    if resolve_unique(browser, &book.logged_in_markers).await?.is_some() {
        return Ok(());
    }
    match read_first_text(browser, &book.login_error).await? {
        Some(msg) if !msg.is_empty() => Err(anyhow!("Login failed: {msg}")),
        _ => Err(anyhow!("Login failed: still on the login page")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{ClickEffect, FakeBrowser, FakeElement, FakePage};
    use crate::pacing::testing::RecordingSleeper;
    use crate::progress::NullSink;

    const HOME: &str = "https://www.naukri.com/mnjuser/homepage";

    fn creds() -> Credentials {
        Credentials {
            username: "me@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    fn login_page(book: &SelectorBook, submit_effect: Option<ClickEffect>) -> FakePage {
        let mut submit = FakeElement::new(book.login_submit[0].clone());
        if let Some(effect) = submit_effect {
            submit = submit.on_click(effect);
        }
        FakePage::new()
            .with(FakeElement::new(book.login_username[0].clone()))
            .with(FakeElement::new(book.login_password[0].clone()))
            .with(submit)
    }

    #[tokio::test]
    async fn test_login_types_credentials_and_verifies_url() {
        let book = SelectorBook::default();
        let browser = FakeBrowser::new();
        browser.add_page(
            &book.login_url,
            login_page(&book, Some(ClickEffect::Navigate(HOME.to_string()))),
        );
        let sleeper = RecordingSleeper::default();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        login(&browser, &book, &creds(), &Pacing::default(), &sleeper, &reporter)
            .await
            .unwrap();

        assert_eq!(
            browser.typed_into(&book.login_username[0]),
            vec!["me@example.com".to_string()]
        );
        assert_eq!(
            browser.typed_into(&book.login_password[0]),
            vec!["hunter2".to_string()]
        );
        assert_eq!(browser.current_url().await.unwrap(), HOME);
    }

    #[tokio::test]
    async fn test_login_surfaces_inline_error() {
        let book = SelectorBook::default();
        let browser = FakeBrowser::new();
        // Submit goes nowhere and an error label shows up.
        let page = login_page(
            &book,
            Some(ClickEffect::Add(vec![
                FakeElement::new(book.login_error[0].clone()).text("Invalid Email ID or Password"),
            ])),
        );
        browser.add_page(&book.login_url, page);
        let sleeper = RecordingSleeper::default();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        let err = login(&browser, &book, &creds(), &Pacing::default(), &sleeper, &reporter)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid Email ID or Password"));
    }

    #[tokio::test]
    async fn test_login_fails_when_username_field_missing() {
        let book = SelectorBook::default();
        let browser = FakeBrowser::new();
        browser.add_page(&book.login_url, FakePage::new());
        let sleeper = RecordingSleeper::default();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        let err = login(&browser, &book, &creds(), &Pacing::default(), &sleeper, &reporter)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("username field"));
    }

    #[tokio::test]
    async fn test_login_falls_back_to_enter_when_no_button() {
        let book = SelectorBook::default();
        let browser = FakeBrowser::new();
        let page = FakePage::new()
            .with(FakeElement::new(book.login_username[0].clone()))
            .with(
                FakeElement::new(book.login_password[0].clone())
                    .on_click(ClickEffect::Navigate(HOME.to_string())),
            );
        browser.add_page(&book.login_url, page);
        let sleeper = RecordingSleeper::default();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        login(&browser, &book, &creds(), &Pacing::default(), &sleeper, &reporter)
            .await
            .unwrap();
        assert_eq!(browser.current_url().await.unwrap(), HOME);
    }
}
