use regex::Regex;
use std::sync::OnceLock;

use crate::config::{Profile, Skill};

pub const FALLBACK_ANSWER: &str = "Yes, I'm interested.";
pub const DEFAULT_EXPERIENCE: &str = "3 years";
pub const DEFAULT_RATING: &str = "7/10";

const OPTION_SIMILARITY_FLOOR: f64 = 0.85;

/// Phrases that mark a bot message as chatter rather than a question.
const GREETINGS: &[&str] = &[
    "hello",
    "thank",
    "welcome",
    "congratulation",
    "good luck",
    "all the best",
    "best wishes",
    "greetings",
    "successfully applied",
];

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn contains_phrase(haystack_norm: &str, phrase: &str) -> bool {
    let needle = normalize(phrase);
    if needle.is_empty() {
        return false;
    }
    format!(" {haystack_norm} ").contains(&format!(" {needle} "))
}

/// A bot message deserves an answer only if it ends in a question mark
/// and is not a greeting or status line.
fn is_question(text: &str) -> bool {
    let trimmed = text.trim();
    if !trimmed.ends_with('?') {
        return false;
    }
    let norm = normalize(trimmed);
    !GREETINGS.iter().any(|g| norm.contains(g))
}

/// Resolve a free-text answer for a bot question. None means the text
/// is not a question and should be left alone. The priority order is
/// skills, then residency, then the keyword dictionary, then the
/// generic fallback, so a question is always answered with the most
/// specific knowledge available.
pub fn resolve(question: &str, profile: &Profile, skills: &[Skill]) -> Option<String> {
    if !is_question(question) {
        return None;
    }
    let norm = normalize(question);
    if let Some(answer) = skill_answer(&norm, skills) {
        return Some(answer);
    }
    if let Some(answer) = residency_answer(question, profile) {
        return Some(answer);
    }
    if let Some(answer) = keyword_answer(&norm, profile) {
        return Some(answer);
    }
    Some(FALLBACK_ANSWER.to_string())
}

#[derive(Debug, PartialEq)]
enum SkillQuestion {
    Experience,
    Rating,
    Generic,
}

fn classify_skill_question(norm: &str) -> SkillQuestion {
    if ["rate", "rating", "out of", "scale"]
        .iter()
        .any(|k| contains_phrase(norm, k))
    {
        return SkillQuestion::Rating;
    }
    if ["experience", "years", "yrs", "exp"]
        .iter()
        .any(|k| contains_phrase(norm, k))
    {
        return SkillQuestion::Experience;
    }
    SkillQuestion::Generic
}

/// First configured skill mentioned in the question wins.
fn skill_answer(norm: &str, skills: &[Skill]) -> Option<String> {
    let skill = skills.iter().find(|s| {
        contains_phrase(norm, &s.name) || s.aliases.iter().any(|a| contains_phrase(norm, a))
    })?;
    let answer = match classify_skill_question(norm) {
        SkillQuestion::Experience => skill
            .experience
            .clone()
            .unwrap_or_else(|| DEFAULT_EXPERIENCE.to_string()),
        SkillQuestion::Rating => match &skill.rating {
            Some(r) if r.contains('/') => r.clone(),
            Some(r) => format!("{r}/10"),
            None => DEFAULT_RATING.to_string(),
        },
        SkillQuestion::Generic => skill
            .experience
            .clone()
            .unwrap_or_else(|| "Yes".to_string()),
    };
    Some(answer)
}

fn residency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:resid\w*|liv\w*|located|based|staying)\s+(?:in|at|near)\s+([A-Za-z][A-Za-z .,-]*)")
            .expect("residency pattern is valid")
    })
}

/// "Are you residing in Pune?" style questions get a Yes/No against
/// the profile location, compared by containment in either direction
/// so "Pune" matches "Pune, Maharashtra".
fn residency_answer(question: &str, profile: &Profile) -> Option<String> {
    if profile.location.trim().is_empty() {
        return None;
    }
    let caps = residency_re().captures(question)?;
    let place = normalize(caps.get(1)?.as_str());
    let home = normalize(&profile.location);
    if place.is_empty() {
        return None;
    }
    let answer = if place.contains(&home) || home.contains(&place) {
        "Yes"
    } else {
        "No"
    };
    Some(answer.to_string())
}

/// Keyword dictionary over the profile, most specific entries first.
/// The first match backed by a non-empty field wins. User-configured
/// custom answers outrank the built-ins.
fn keyword_answer(norm: &str, profile: &Profile) -> Option<String> {
    for (key, answer) in &profile.custom_answers {
        if !answer.trim().is_empty() && contains_phrase(norm, key) {
            return Some(answer.clone());
        }
    }
    let entries: [(&[&str], &str); 10] = [
        (
            &["expected salary", "expected ctc", "salary expectation"],
            profile.expected_ctc.as_str(),
        ),
        (
            &["current salary", "current ctc"],
            profile.current_ctc.as_str(),
        ),
        (&["ctc", "salary", "compensation"], profile.current_ctc.as_str()),
        (&["notice period", "notice"], profile.notice_period.as_str()),
        (
            &["total experience", "experience", "years"],
            profile.total_experience.as_str(),
        ),
        (
            &["current location", "location", "city"],
            profile.location.as_str(),
        ),
        (
            &["when can you join", "availability", "available", "join"],
            profile.availability.as_str(),
        ),
        (&["full name", "your name"], profile.full_name.as_str()),
        (
            &["phone", "mobile", "contact number"],
            profile.phone.as_str(),
        ),
        (
            &["about yourself", "describe yourself", "cover letter", "resume"],
            profile.resume_text.as_str(),
        ),
    ];
    for (keywords, value) in entries {
        if value.trim().is_empty() {
            continue;
        }
        if keywords.iter().any(|k| contains_phrase(norm, k)) {
            return Some(value.to_string());
        }
    }
    None
}

/// Choose among single-choice options: an option matching the resolved
/// answer, else an affirmative, else a skip, else the first.
pub fn pick_option(question: &str, options: &[String], profile: &Profile, skills: &[Skill]) -> usize {
    if options.is_empty() {
        return 0;
    }
    let normalized: Vec<String> = options.iter().map(|o| normalize(o)).collect();

    if let Some(expected) = resolve(question, profile, skills) {
        let expected_norm = normalize(&expected);
        if !expected_norm.is_empty() {
            for (i, option) in normalized.iter().enumerate() {
                if *option == expected_norm
                    || option.contains(&expected_norm)
                    || expected_norm.contains(option.as_str())
                {
                    return i;
                }
            }
            let mut best = (0usize, 0.0f64);
            for (i, option) in normalized.iter().enumerate() {
                let score = strsim::jaro_winkler(option, &expected_norm);
                if score > best.1 {
                    best = (i, score);
                }
            }
            if best.1 >= OPTION_SIMILARITY_FLOOR {
                return best.0;
            }
        }
    }

    if let Some(i) = normalized.iter().position(|o| contains_phrase(o, "yes")) {
        return i;
    }
    if let Some(i) = normalized.iter().position(|o| contains_phrase(o, "skip")) {
        return i;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn profile() -> Profile {
        Profile {
            full_name: "Asha Rao".to_string(),
            total_experience: "4 years".to_string(),
            location: "Pune, Maharashtra".to_string(),
            notice_period: "30 days".to_string(),
            current_ctc: "12 LPA".to_string(),
            expected_ctc: "18 LPA".to_string(),
            availability: "Available immediately".to_string(),
            phone: "9999999999".to_string(),
            resume_text: "Backend developer, 4 years of Python.".to_string(),
            custom_answers: BTreeMap::new(),
        }
    }

    fn skills() -> Vec<Skill> {
        vec![
            Skill {
                name: "Python".to_string(),
                aliases: vec!["python3".to_string()],
                experience: Some("5 years".to_string()),
                rating: Some("8".to_string()),
            },
            Skill {
                name: "Kafka".to_string(),
                aliases: Vec::new(),
                experience: None,
                rating: None,
            },
        ]
    }

    #[test]
    fn test_greetings_and_status_lines_are_not_questions() {
        let p = profile();
        let s = skills();
        assert_eq!(resolve("Hello! How are you today?", &p, &s), None);
        assert_eq!(resolve("Thank you for applying!", &p, &s), None);
        assert_eq!(resolve("You have successfully applied.", &p, &s), None);
        assert_eq!(resolve("We will get back to you", &p, &s), None);
        assert_eq!(resolve("Good luck?", &p, &s), None);
    }

    #[test]
    fn test_skill_experience_answer() {
        let answer = resolve("What is your experience with Python?", &profile(), &skills());
        assert_eq!(answer.as_deref(), Some("5 years"));
    }

    #[test]
    fn test_skill_defaults_when_unconfigured() {
        let p = profile();
        let s = skills();
        assert_eq!(
            resolve("How many years of experience do you have in Kafka?", &p, &s).as_deref(),
            Some(DEFAULT_EXPERIENCE)
        );
        assert_eq!(
            resolve("How would you rate yourself in Kafka?", &p, &s).as_deref(),
            Some(DEFAULT_RATING)
        );
    }

    #[test]
    fn test_skill_rating_answer_gets_scale() {
        let answer = resolve("Rate your Python skills out of 10?", &profile(), &skills());
        assert_eq!(answer.as_deref(), Some("8/10"));
    }

    #[test]
    fn test_skill_alias_matches() {
        let answer = resolve("Do you know python3?", &profile(), &skills());
        assert_eq!(answer.as_deref(), Some("5 years"));
    }

    #[test]
    fn test_residency_yes_and_no() {
        let p = profile();
        let s = skills();
        assert_eq!(
            resolve("Are you currently residing in Pune?", &p, &s).as_deref(),
            Some("Yes")
        );
        assert_eq!(
            resolve("Are you based in Bangalore?", &p, &s).as_deref(),
            Some("No")
        );
        assert_eq!(
            resolve("Are you comfortable living near Pune?", &p, &s).as_deref(),
            Some("Yes")
        );
    }

    #[test]
    fn test_keyword_dictionary_prefers_specific_entries() {
        let p = profile();
        let s = Vec::new();
        assert_eq!(
            resolve("What is your expected CTC?", &p, &s).as_deref(),
            Some("18 LPA")
        );
        assert_eq!(
            resolve("What is your current CTC?", &p, &s).as_deref(),
            Some("12 LPA")
        );
        assert_eq!(
            resolve("What is your notice period?", &p, &s).as_deref(),
            Some("30 days")
        );
        assert_eq!(
            resolve("What is your total experience?", &p, &s).as_deref(),
            Some("4 years")
        );
    }

    #[test]
    fn test_empty_profile_field_falls_through() {
        let mut p = profile();
        p.notice_period.clear();
        let answer = resolve("What is your notice period?", &p, &Vec::new());
        assert_eq!(answer.as_deref(), Some(FALLBACK_ANSWER));
    }

    #[test]
    fn test_about_yourself_uses_resume_text() {
        let answer = resolve("Could you tell us about yourself?", &profile(), &Vec::new());
        assert_eq!(answer.as_deref(), Some("Backend developer, 4 years of Python."));

        let mut p = profile();
        p.resume_text.clear();
        let answer = resolve("Could you tell us about yourself?", &p, &Vec::new());
        assert_eq!(answer.as_deref(), Some(FALLBACK_ANSWER));
    }

    #[test]
    fn test_custom_answers_outrank_builtins() {
        let mut p = profile();
        p.custom_answers
            .insert("visa".to_string(), "No sponsorship needed".to_string());
        let answer = resolve("Do you require visa sponsorship?", &p, &Vec::new());
        assert_eq!(answer.as_deref(), Some("No sponsorship needed"));
    }

    #[test]
    fn test_unmatched_question_gets_fallback() {
        let answer = resolve("Why do you want to work here?", &profile(), &skills());
        assert_eq!(answer.as_deref(), Some(FALLBACK_ANSWER));
    }

    #[test]
    fn test_pick_option_matches_resolved_answer() {
        let options = vec!["2 years".to_string(), "5 years".to_string(), "10+ years".to_string()];
        let idx = pick_option(
            "What is your experience with Python?",
            &options,
            &profile(),
            &skills(),
        );
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_pick_option_residency() {
        let options = vec!["No".to_string(), "Yes".to_string()];
        let idx = pick_option(
            "Are you currently residing in Pune?",
            &options,
            &profile(),
            &skills(),
        );
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_pick_option_prefers_yes_then_skip() {
        let p = profile();
        let s = skills();
        let options = vec!["Not sure".to_string(), "Yes, definitely".to_string()];
        assert_eq!(pick_option("Random question?", &options, &p, &s), 1);

        let options = vec!["Option A".to_string(), "Skip this question".to_string()];
        assert_eq!(pick_option("Random question?", &options, &p, &s), 1);

        let options = vec!["Option A".to_string(), "Option B".to_string()];
        assert_eq!(pick_option("Random question?", &options, &p, &s), 0);
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("  What's your  CTC?! "), "what s your ctc");
        assert_eq!(normalize("Python, Django & Rust"), "python django rust");
    }
}
