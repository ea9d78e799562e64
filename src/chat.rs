use std::collections::HashSet;
use std::time::Duration;

use crate::answers;
use crate::browser::{Browser, BrowserError};
use crate::config::{Pacing, Profile, Skill};
use crate::locator::{Locator, SelectorBook};
use crate::pacing::Sleeper;
use crate::progress::Reporter;
use crate::resolver::{click_first, resolve_present, resolve_unique};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatOutcome {
    pub answered: u32,
    pub skipped: u32,
}

/// Drive the apply chat until it closes or the poll budget runs out.
/// Every bot message is keyed by normalized text in an answered-set so
/// a question redisplayed on the next poll is never answered twice.
/// A job whose apply flow has no chat at all returns a zero outcome.
pub async fn fill_chat(
    browser: &dyn Browser,
    book: &SelectorBook,
    profile: &Profile,
    skills: &[Skill],
    pacing: &Pacing,
    sleeper: &dyn Sleeper,
    reporter: &Reporter<'_>,
) -> Result<ChatOutcome, BrowserError> {
    let mut outcome = ChatOutcome::default();
    let poll = Duration::from_millis(pacing.chat_poll_ms.max(1));

    if !wait_for_chat(browser, book, pacing, sleeper).await? {
        return Ok(outcome);
    }
    reporter.info("Apply chat opened, answering questions");

    let mut answered: HashSet<String> = HashSet::new();
    for _ in 0..pacing.chat_max_polls {
        if resolve_present(browser, &book.chat_container).await?.is_none() {
            reporter.info("Apply chat closed");
            break;
        }

        let questions = match first_yielding(browser, &book.chat_question).await? {
            Some((_, texts)) => texts,
            None => Vec::new(),
        };

        for question in questions {
            let key = answers::normalize(&question);
            if key.is_empty() || !answered.insert(key) {
                continue;
            }
            answer_one(browser, book, profile, skills, &question, &mut outcome, reporter).await?;
        }

        sleeper.sleep(poll).await;
    }

    Ok(outcome)
}

/// Bounded wait for the chat widget; the apply may simply not have one.
async fn wait_for_chat(
    browser: &dyn Browser,
    book: &SelectorBook,
    pacing: &Pacing,
    sleeper: &dyn Sleeper,
) -> Result<bool, BrowserError> {
    let poll_ms = pacing.chat_poll_ms.max(1);
    let polls = (pacing.chat_open_wait_ms / poll_ms).max(1);
    for _ in 0..polls {
        if resolve_present(browser, &book.chat_container).await?.is_some() {
            return Ok(true);
        }
        sleeper.sleep(Duration::from_millis(poll_ms)).await;
    }
    Ok(false)
}

async fn answer_one(
    browser: &dyn Browser,
    book: &SelectorBook,
    profile: &Profile,
    skills: &[Skill],
    question: &str,
    outcome: &mut ChatOutcome,
    reporter: &Reporter<'_>,
) -> Result<(), BrowserError> {
    // Single-choice widgets first; they cannot take free text.
    if let Some((locator, options)) = first_yielding(browser, &book.chat_options).await? {
        let index = answers::pick_option(question, &options, profile, skills);
        match browser.click_nth(&locator, index).await {
            Ok(()) => {
                let _ = click_first(browser, &book.chat_option_save).await;
                outcome.answered += 1;
                reporter.info(format!(
                    "Chose '{}' for: {}",
                    options.get(index).map(String::as_str).unwrap_or(""),
                    brief(question)
                ));
            }
            Err(BrowserError::Session(msg)) => return Err(BrowserError::Session(msg)),
            Err(e) => {
                outcome.skipped += 1;
                reporter.warning(format!("Could not pick an option ({e}), skipping question"));
            }
        }
        return Ok(());
    }

    let Some(answer) = answers::resolve(question, profile, skills) else {
        return Ok(());
    };

    let Some(input) = resolve_unique(browser, &book.chat_input).await? else {
        outcome.skipped += 1;
        reporter.warning(format!("No input field for: {}", brief(question)));
        return Ok(());
    };
    match browser.type_text(&input, &answer).await {
        Ok(()) => {}
        Err(BrowserError::Session(msg)) => return Err(BrowserError::Session(msg)),
        Err(e) => {
            outcome.skipped += 1;
            reporter.warning(format!("Could not type answer ({e}), skipping question"));
            return Ok(());
        }
    }
    if !click_first(browser, &book.chat_send).await? {
        match browser.press_enter(&input).await {
            Ok(()) => {}
            Err(BrowserError::Session(msg)) => return Err(BrowserError::Session(msg)),
            Err(e) => {
                outcome.skipped += 1;
                reporter.warning(format!("Could not submit answer ({e}), skipping question"));
                return Ok(());
            }
        }
    }
    outcome.answered += 1;
    reporter.info(format!("Answered '{}' for: {}", answer, brief(question)));
    Ok(())
}

/// First cascade entry whose visible matches have any text, together
/// with the locator so the caller can click into the same set.
async fn first_yielding(
    browser: &dyn Browser,
    cascade: &[Locator],
) -> Result<Option<(Locator, Vec<String>)>, BrowserError> {
    for locator in cascade {
        match browser.read_texts(locator).await {
            Ok(texts) => {
                let texts: Vec<String> = texts
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                if !texts.is_empty() {
                    return Ok(Some((locator.clone(), texts)));
                }
            }
            Err(BrowserError::Session(msg)) => return Err(BrowserError::Session(msg)),
            Err(_) => {}
        }
    }
    Ok(None)
}

fn brief(text: &str) -> String {
    const LIMIT: usize = 70;
    if text.chars().count() <= LIMIT {
        return text.to_string();
    }
    let cut: String = text.chars().take(LIMIT).collect();
    format!("{cut}...")
}
