use serde::{Deserialize, Serialize};
use std::fmt;

/// A rendered element query, ready for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Css(String),
    XPath(String),
}

/// One way of finding an element, independent of any driver. Site
/// tables hold ordered lists of these so markup drift only costs a
/// fallback, not a code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Id(String),
    Css(String),
    Placeholder(String),
    InputType(String),
    AttrContains { attr: String, value: String },
    TextContains { tag: String, text: String },
}

impl Locator {
    pub fn id(v: &str) -> Self {
        Locator::Id(v.to_string())
    }

    pub fn css(v: &str) -> Self {
        Locator::Css(v.to_string())
    }

    pub fn placeholder(v: &str) -> Self {
        Locator::Placeholder(v.to_string())
    }

    pub fn input_type(v: &str) -> Self {
        Locator::InputType(v.to_string())
    }

    pub fn attr_contains(attr: &str, value: &str) -> Self {
        Locator::AttrContains {
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }

    pub fn text_contains(tag: &str, text: &str) -> Self {
        Locator::TextContains {
            tag: tag.to_string(),
            text: text.to_string(),
        }
    }

    pub fn query(&self) -> Query {
        match self {
            Locator::Id(v) => Query::Css(format!("[id='{}']", css_escape(v))),
            Locator::Css(v) => Query::Css(v.clone()),
            Locator::Placeholder(v) => {
                Query::Css(format!("[placeholder*='{}']", css_escape(v)))
            }
            Locator::InputType(v) => Query::Css(format!("input[type='{}']", css_escape(v))),
            Locator::AttrContains { attr, value } => {
                Query::Css(format!("[{}*='{}']", attr, css_escape(value)))
            }
            Locator::TextContains { tag, text } => Query::XPath(format!(
                "//{}[contains(normalize-space(.), {})]",
                tag,
                xpath_literal(text)
            )),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(v) => write!(f, "id={v}"),
            Locator::Css(v) => write!(f, "css={v}"),
            Locator::Placeholder(v) => write!(f, "placeholder~{v}"),
            Locator::InputType(v) => write!(f, "type={v}"),
            Locator::AttrContains { attr, value } => write!(f, "{attr}*='{value}'"),
            Locator::TextContains { tag, text } => write!(f, "{tag}~'{text}'"),
        }
    }
}

fn css_escape(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\'', "\\'")
}

/// XPath 1.0 has no escape for quotes inside string literals, so values
/// holding both kinds need concat().
fn xpath_literal(v: &str) -> String {
    if !v.contains('\'') {
        format!("'{v}'")
    } else if !v.contains('"') {
        format!("\"{v}\"")
    } else {
        let parts: Vec<String> = v
            .split('\'')
            .map(|p| format!("'{p}'"))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// How a listing URL advances to the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageRule {
    /// Append "-N" to the path: /python-jobs-in-pune -> /python-jobs-in-pune-2
    SuffixSegment,
    /// Append a query parameter: ?pageNo=2
    QueryParam { name: String },
}

/// Page 1 is always the base URL unchanged.
pub fn page_url(base: &str, rule: &PageRule, page: u32) -> String {
    if page <= 1 {
        return base.to_string();
    }
    match rule {
        PageRule::SuffixSegment => {
            let (path, query) = match base.split_once('?') {
                Some((p, q)) => (p, Some(q)),
                None => (base, None),
            };
            let path = path.trim_end_matches('/');
            match query {
                Some(q) => format!("{path}-{page}?{q}"),
                None => format!("{path}-{page}"),
            }
        }
        PageRule::QueryParam { name } => {
            if base.contains('?') {
                format!("{base}&{name}={page}")
            } else {
                format!("{base}?{name}={page}")
            }
        }
    }
}

pub fn slugify(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    let mut last_dash = true;
    for c in v.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Visible labels of the four compatibility signals, matched by
/// case-insensitive containment against the widget items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalLabels {
    pub early_applicant: String,
    pub skills: String,
    pub location: String,
    pub experience: String,
}

impl Default for SignalLabels {
    fn default() -> Self {
        Self {
            early_applicant: "Early applicant".to_string(),
            skills: "Keyskills".to_string(),
            location: "Location".to_string(),
            experience: "Work experience".to_string(),
        }
    }
}

/// Every selector the engine touches for one portal, in fallback order.
/// Partial custom books inherit the built-in entries for any field they
/// leave out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorBook {
    pub base_url: String,
    pub login_url: String,
    /// `{keywords}` and `{location}` are replaced with slugs.
    pub search_template: String,
    pub page_rule: PageRule,

    pub login_username: Vec<Locator>,
    pub login_password: Vec<Locator>,
    pub login_submit: Vec<Locator>,
    pub login_error: Vec<Locator>,
    /// URL substrings that mean we are still on a login page.
    pub login_url_markers: Vec<String>,
    pub logged_in_markers: Vec<Locator>,

    pub overlay_dismiss: Vec<Locator>,

    pub results_markers: Vec<Locator>,
    pub no_results_markers: Vec<Locator>,
    pub listing_links: Vec<Locator>,

    pub detail_title: Vec<Locator>,
    pub detail_company: Vec<Locator>,
    pub detail_experience: Vec<Locator>,
    pub detail_salary: Vec<Locator>,
    pub detail_location: Vec<Locator>,
    /// Labelled stat lines ("Posted: 3 days ago", "Openings: 2", ...).
    pub detail_stats: Vec<Locator>,
    pub detail_skills: Vec<Locator>,
    pub detail_role_info: Vec<Locator>,

    pub match_signal_items: Vec<Locator>,
    pub signal_labels: SignalLabels,

    pub apply_button: Vec<Locator>,
    pub external_apply_markers: Vec<Locator>,
    pub already_applied_markers: Vec<Locator>,

    pub chat_container: Vec<Locator>,
    pub chat_question: Vec<Locator>,
    pub chat_input: Vec<Locator>,
    pub chat_send: Vec<Locator>,
    pub chat_options: Vec<Locator>,
    pub chat_option_save: Vec<Locator>,
}

impl SelectorBook {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read selector book {}", path.display()))?;
        let book = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse selector book {}", path.display()))?;
        Ok(book)
    }

    /// Listing URL for the configured search: explicit URL when given,
    /// otherwise the keyword template.
    pub fn search_url(&self, search: &crate::config::Search) -> String {
        if let Some(url) = &search.listing_url {
            return url.clone();
        }
        self.search_template
            .replace("{keywords}", &slugify(&search.keywords))
            .replace("{location}", &slugify(&search.location))
    }
}

impl Default for SelectorBook {
    fn default() -> Self {
        Self {
            base_url: "https://www.naukri.com".to_string(),
            login_url: "https://www.naukri.com/nlogin/login".to_string(),
            search_template: "https://www.naukri.com/{keywords}-jobs-in-{location}".to_string(),
            page_rule: PageRule::SuffixSegment,

            login_username: vec![
                Locator::id("usernameField"),
                Locator::placeholder("Enter Email ID / Username"),
                Locator::css("form input[type='text']"),
            ],
            login_password: vec![
                Locator::id("passwordField"),
                Locator::placeholder("Enter Password"),
                Locator::input_type("password"),
            ],
            login_submit: vec![
                Locator::css("button[type='submit']"),
                Locator::text_contains("button", "Login"),
            ],
            login_error: vec![
                Locator::attr_contains("class", "commonErrorMsg"),
                Locator::attr_contains("class", "erLbl"),
            ],
            login_url_markers: vec!["nlogin".to_string(), "login".to_string()],
            logged_in_markers: vec![
                Locator::attr_contains("class", "nI-gNb-drawer"),
                Locator::css("div.view-profile-wrapper"),
            ],

            overlay_dismiss: vec![
                Locator::attr_contains("class", "crossIcon"),
                Locator::css("span.styles_ppCloseIcon"),
                Locator::attr_contains("class", "chatbot_MinimizeChatIcon"),
            ],

            results_markers: vec![
                Locator::attr_contains("class", "srp-jobtuple-wrapper"),
                Locator::attr_contains("class", "jobTuple"),
            ],
            no_results_markers: vec![
                Locator::attr_contains("class", "styles_no-result"),
                Locator::text_contains("h1", "No jobs found"),
            ],
            listing_links: vec![
                Locator::css("div.srp-jobtuple-wrapper a.title"),
                Locator::css("article.jobTuple a.title"),
                Locator::css("a.title"),
            ],

            detail_title: vec![
                Locator::css("h1.styles_jd-header-title__rZwM1"),
                Locator::attr_contains("class", "jd-header-title"),
                Locator::css("section h1"),
            ],
            detail_company: vec![
                Locator::attr_contains("class", "jd-header-comp-name"),
                Locator::attr_contains("class", "comp-name"),
            ],
            detail_experience: vec![
                Locator::attr_contains("class", "styles_jhc__exp"),
                Locator::css("div.exp span"),
            ],
            detail_salary: vec![
                Locator::attr_contains("class", "styles_jhc__salary"),
                Locator::css("div.salary span"),
            ],
            detail_location: vec![
                Locator::attr_contains("class", "styles_jhc__location"),
                Locator::css("span.location"),
            ],
            detail_stats: vec![
                Locator::attr_contains("class", "styles_jhc__stat"),
                Locator::css("div.jd-stats span"),
            ],
            detail_skills: vec![
                Locator::attr_contains("class", "styles_key-skill"),
                Locator::css("div.key-skill a"),
            ],
            detail_role_info: vec![
                Locator::attr_contains("class", "styles_other-details"),
                Locator::css("div.other-details div.details"),
            ],

            match_signal_items: vec![
                Locator::attr_contains("class", "styles_MatchScoreCTA__tag"),
                Locator::css("div.match-score span.tag"),
            ],
            signal_labels: SignalLabels::default(),

            apply_button: vec![
                Locator::id("apply-button"),
                Locator::attr_contains("class", "apply-button"),
                Locator::text_contains("button", "Apply"),
            ],
            external_apply_markers: vec![
                Locator::id("company-site-button"),
                Locator::attr_contains("class", "company-site-button"),
                Locator::text_contains("button", "Apply on company site"),
            ],
            already_applied_markers: vec![
                Locator::attr_contains("class", "already-applied"),
                Locator::text_contains("span", "Applied"),
            ],

            chat_container: vec![
                Locator::attr_contains("class", "chatbot_DrawerContentWrapper"),
                Locator::id("chatbot_chatcontainer"),
            ],
            chat_question: vec![
                Locator::css("div.chatbot_ListItem div.botMsg span"),
                Locator::attr_contains("class", "botMsg"),
            ],
            chat_input: vec![
                Locator::css("div.textArea[contenteditable='true']"),
                Locator::attr_contains("class", "chatbot_InputBox"),
                Locator::input_type("text"),
            ],
            chat_send: vec![
                Locator::css("div.sendMsg"),
                Locator::attr_contains("class", "send-msg"),
            ],
            chat_options: vec![
                Locator::css("div.chatbot_Chip"),
                Locator::attr_contains("class", "chipsContainer"),
                Locator::css("label.radio-btn-container"),
            ],
            chat_option_save: vec![
                Locator::css("div.sendMsg"),
                Locator::text_contains("button", "Save"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rendering() {
        assert_eq!(
            Locator::id("usernameField").query(),
            Query::Css("[id='usernameField']".to_string())
        );
        assert_eq!(
            Locator::placeholder("Enter Email").query(),
            Query::Css("[placeholder*='Enter Email']".to_string())
        );
        assert_eq!(
            Locator::attr_contains("class", "apply-button").query(),
            Query::Css("[class*='apply-button']".to_string())
        );
        assert_eq!(
            Locator::input_type("password").query(),
            Query::Css("input[type='password']".to_string())
        );
        assert_eq!(
            Locator::text_contains("button", "Login").query(),
            Query::XPath("//button[contains(normalize-space(.), 'Login')]".to_string())
        );
    }

    #[test]
    fn test_query_escapes_quotes() {
        assert_eq!(
            Locator::placeholder("What's your name").query(),
            Query::Css("[placeholder*='What\\'s your name']".to_string())
        );
        assert_eq!(
            Locator::text_contains("span", "What's next").query(),
            Query::XPath("//span[contains(normalize-space(.), \"What's next\")]".to_string())
        );
        assert_eq!(
            xpath_literal(r#"a'b"c"#),
            r#"concat('a', "'", 'b"c')"#.to_string()
        );
    }

    #[test]
    fn test_page_url_suffix_segment() {
        let rule = PageRule::SuffixSegment;
        let base = "https://www.naukri.com/python-jobs-in-pune";
        assert_eq!(page_url(base, &rule, 1), base);
        assert_eq!(
            page_url(base, &rule, 2),
            "https://www.naukri.com/python-jobs-in-pune-2"
        );
        assert_eq!(
            page_url("https://www.naukri.com/python-jobs-in-pune?k=python", &rule, 3),
            "https://www.naukri.com/python-jobs-in-pune-3?k=python"
        );
    }

    #[test]
    fn test_page_url_query_param() {
        let rule = PageRule::QueryParam {
            name: "pageNo".to_string(),
        };
        assert_eq!(page_url("https://jobs.example/search", &rule, 1), "https://jobs.example/search");
        assert_eq!(
            page_url("https://jobs.example/search", &rule, 2),
            "https://jobs.example/search?pageNo=2"
        );
        assert_eq!(
            page_url("https://jobs.example/search?q=rust", &rule, 4),
            "https://jobs.example/search?q=rust&pageNo=4"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Python Developer"), "python-developer");
        assert_eq!(slugify("  C++ / Rust  "), "c-rust");
        assert_eq!(slugify("pune"), "pune");
    }

    #[test]
    fn test_search_url_prefers_explicit_listing() {
        let book = SelectorBook::default();
        let mut search = crate::config::Search {
            keywords: "python developer".to_string(),
            location: "pune".to_string(),
            listing_url: None,
            pages: 1,
        };
        assert_eq!(
            book.search_url(&search),
            "https://www.naukri.com/python-developer-jobs-in-pune"
        );
        search.listing_url = Some("https://www.naukri.com/remote-rust-jobs".to_string());
        assert_eq!(book.search_url(&search), "https://www.naukri.com/remote-rust-jobs");
    }

    #[test]
    fn test_partial_book_inherits_defaults() {
        let raw = r#"{ "login_url": "https://other.example/signin" }"#;
        let book: SelectorBook = serde_json::from_str(raw).unwrap();
        assert_eq!(book.login_url, "https://other.example/signin");
        assert_eq!(book.base_url, SelectorBook::default().base_url);
        assert!(!book.listing_links.is_empty());
    }
}
