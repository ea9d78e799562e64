use std::collections::HashSet;

use crate::browser::{Browser, BrowserError};
use crate::locator::SelectorBook;
use crate::models::JobListing;
use crate::resolver::{read_all_attrs, resolve_present};

/// What a freshly loaded listing page looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingState {
    HasResults,
    /// The portal's explicit "no jobs found" state.
    Empty,
    /// Neither marker resolved; harvest anyway and let the link count
    /// decide.
    Unknown,
}

pub async fn listing_state(
    browser: &dyn Browser,
    book: &SelectorBook,
) -> Result<ListingState, BrowserError> {
    if resolve_present(browser, &book.no_results_markers).await?.is_some() {
        return Ok(ListingState::Empty);
    }
    if resolve_present(browser, &book.results_markers).await?.is_some() {
        return Ok(ListingState::HasResults);
    }
    Ok(ListingState::Unknown)
}

/// Pull every job link off the current listing page. `seen` carries
/// exact URLs across the whole crawl so a job repeated on a later page
/// is not processed twice.
pub async fn harvest_links(
    browser: &dyn Browser,
    book: &SelectorBook,
    page: u32,
    seen: &mut HashSet<String>,
) -> Result<Vec<JobListing>, BrowserError> {
    let hrefs = read_all_attrs(browser, &book.listing_links, "href").await?;
    let mut listings = Vec::new();
    for href in hrefs {
        let Some(url) = absolutize(&book.base_url, &href) else {
            continue;
        };
        if seen.insert(url.clone()) {
            listings.push(JobListing { url, page });
        }
    }
    Ok(listings)
}

fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if href.starts_with('/') {
        return Some(format!("{}{}", base.trim_end_matches('/'), href));
    }
    None
}
