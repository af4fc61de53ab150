//! Name standardization for scraped program/university strings.
//!
//! The model behind `LlmStandardizer` lives in a separate service; when it is
//! unreachable or returns something that is not JSON, a deterministic
//! splitting heuristic takes over. Either way the raw names then go through
//! abbreviation expansion, a small typo-fix table, and a fuzzy match against
//! the canonical lists. This step never fails.

use lazy_regex::{regex, regex_is_match};
use lazy_static::lazy_static;
use tracing::{debug, info};

use crate::gradcafe::AdmissionRecord;

static CANON_UNIVERSITIES_RAW: &str = include_str!("../data/canon_universities.txt");
static CANON_PROGRAMS_RAW: &str = include_str!("../data/canon_programs.txt");

lazy_static! {
    static ref CANON_UNIVERSITIES: Vec<&'static str> = CANON_UNIVERSITIES_RAW
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    static ref CANON_PROGRAMS: Vec<&'static str> = CANON_PROGRAMS_RAW
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
}

const UNIVERSITY_CUTOFF: f64 = 0.86;
const PROGRAM_CUTOFF: f64 = 0.84;

const UNIVERSITY_FIXES: [(&str, &str); 3] = [
    ("McGiill University", "McGill University"),
    ("Mcgill University", "McGill University"),
    ("University Of British Columbia", "University of British Columbia"),
];

const PROGRAM_FIXES: [(&str, &str); 2] = [
    ("Mathematic", "Mathematics"),
    ("Info Studies", "Information Studies"),
];

/// Standardized program/university pair produced by augmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standardized {
    pub program: String,
    pub university: String,
}

/// Client for the external standardization service.
///
/// With no endpoint configured it degrades to the pure heuristic path.
pub struct LlmStandardizer {
    endpoint: Option<String>,
    client: reqwest::Client,
}

impl LlmStandardizer {
    pub fn new(endpoint: Option<String>) -> Self {
        LlmStandardizer {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    /// Standardize a free-text "`<program>, <school>`" string. Never fails.
    pub async fn standardize(&self, free_text: &str) -> Standardized {
        let (program, university) = match self.ask_model(free_text).await {
            Some(pair) => pair,
            None => split_fallback(free_text),
        };

        Standardized {
            program: normalize_program(&program),
            university: normalize_university(&university),
        }
    }

    /// Returns None whenever the model cannot be asked or did not answer with
    /// a usable JSON object, at which point the caller falls back to the
    /// splitting heuristic.
    async fn ask_model(&self, free_text: &str) -> Option<(String, String)> {
        let endpoint = self.endpoint.as_ref()?;

        let body = serde_json::json!({ "program": free_text });
        let text = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .ok()?
            .text()
            .await
            .ok()?;

        // Chatty models wrap the object in prose; keep the first {...} only.
        let object = regex!(r"(?s)\{.*?\}")
            .find(&text)
            .map(|m| m.as_str())
            .unwrap_or(&text);
        let value: serde_json::Value = serde_json::from_str(object).ok()?;

        let program = value.get("standardized_program")?.as_str()?.trim();
        let university = value.get("standardized_university")?.as_str()?.trim();
        debug!("Model answered: {program:?} / {university:?}");
        Some((program.to_string(), university.to_string()))
    }
}

/// Run the standardizer over the record's "`<program>, <school>`" string and
/// fill in the generated name fields.
pub async fn augment_record(record: &mut AdmissionRecord, standardizer: &LlmStandardizer) {
    let program_and_school = format!(
        "{}, {}",
        record.program_name.as_deref().unwrap_or(""),
        record.school
    );

    info!("Standardizing entry {}: {program_and_school}", record.id);
    let standardized = standardizer.standardize(&program_and_school).await;
    record.apply_augmentation(standardized);
}

/// Deterministic split of a raw "`<program>, <school>`" string, used whenever
/// the model path yields nothing.
pub fn split_fallback(text: &str) -> (String, String) {
    let collapsed = regex!(r"\s+").replace_all(text, " ");
    let collapsed = collapsed.trim().trim_matches(',').trim();

    let mut parts = regex!(r",| at | @ ")
        .split(collapsed)
        .map(str::trim)
        .filter(|part| !part.is_empty());
    let program = parts.next().unwrap_or_default().to_string();
    let university = parts.next().unwrap_or_default().to_string();

    let program = title_case(&program);

    let (mut university, expanded) = expand_abbreviation(&university);
    if university.is_empty() {
        return (program, "Unknown".to_string());
    }
    if !expanded {
        university = title_case(&university);
    }
    university = apply_fixes(university, &UNIVERSITY_FIXES);
    let university = regex!(r"\bOf\b").replace_all(&university, "of").into_owned();

    (program, university)
}

fn expand_abbreviation(name: &str) -> (String, bool) {
    if regex_is_match!(r"(?i)^mcg(\.|ill)?$", name) {
        ("McGill University".to_string(), true)
    } else if regex_is_match!(r"(?i)^(ubc|u\.?b\.?c\.?)$", name) {
        ("University of British Columbia".to_string(), true)
    } else if regex_is_match!(r"(?i)^uoft$", name) {
        ("University of Toronto".to_string(), true)
    } else {
        (name.to_string(), false)
    }
}

fn apply_fixes(name: String, fixes: &[(&str, &str)]) -> String {
    for (from, to) in fixes {
        if name == *from {
            return (*to).to_string();
        }
    }
    name
}

/// Capitalize the first letter of each alphabetic run, lowercasing the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(c);
            boundary = true;
        }
    }
    out
}

fn best_match<'a>(name: &str, candidates: &[&'a str], cutoff: f64) -> Option<&'a str> {
    if name.is_empty() {
        return None;
    }
    candidates
        .iter()
        .map(|candidate| (*candidate, strsim::normalized_levenshtein(name, candidate)))
        .filter(|(_, score)| *score >= cutoff)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

/// Normalize a university name: expand abbreviations, fix casing and common
/// typos, then snap to the canonical list. Falls back to "Unknown" when
/// nothing at all was identified.
pub fn normalize_university(name: &str) -> String {
    let (mut university, expanded) = expand_abbreviation(name.trim());
    if university.is_empty() {
        return "Unknown".to_string();
    }
    if !expanded {
        university = title_case(&university);
    }
    university = apply_fixes(university, &UNIVERSITY_FIXES);
    let university = regex!(r"\bOf\b").replace_all(&university, "of").into_owned();

    if CANON_UNIVERSITIES.contains(&university.as_str()) {
        return university;
    }
    match best_match(&university, &CANON_UNIVERSITIES, UNIVERSITY_CUTOFF) {
        Some(canonical) => canonical.to_string(),
        None => university,
    }
}

/// Normalize a program name against the canonical list. Unlike universities
/// there is no "Unknown" fallback; the cleaned-up input is kept as-is.
pub fn normalize_program(name: &str) -> String {
    let program = apply_fixes(title_case(name.trim()), &PROGRAM_FIXES);

    if CANON_PROGRAMS.contains(&program.as_str()) {
        return program;
    }
    match best_match(&program, &CANON_PROGRAMS, PROGRAM_CUTOFF) {
        Some(canonical) => canonical.to_string(),
        None => program,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn title_case_matches_expectations() {
        assert_eq!(title_case("info studies"), "Info Studies");
        assert_eq!(
            title_case("university of british columbia"),
            "University Of British Columbia"
        );
        assert_eq!(title_case("mcgill"), "Mcgill");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn abbreviations_expand() {
        assert_eq!(expand_abbreviation("McG").0, "McGill University");
        assert_eq!(expand_abbreviation("mcg.").0, "McGill University");
        assert_eq!(expand_abbreviation("UBC").0, "University of British Columbia");
        assert_eq!(expand_abbreviation("u.b.c").0, "University of British Columbia");
        assert_eq!(expand_abbreviation("UofT").0, "University of Toronto");
        assert!(!expand_abbreviation("Somewhere Else").1);
    }

    #[test]
    fn split_fallback_handles_separators() {
        assert_eq!(
            split_fallback("Info, McG"),
            ("Info".to_string(), "McGill University".to_string())
        );
        assert_eq!(
            split_fallback("Mathematics at UBC"),
            (
                "Mathematics".to_string(),
                "University of British Columbia".to_string()
            )
        );
        assert_eq!(
            split_fallback("CS @ mcgill"),
            ("Cs".to_string(), "McGill University".to_string())
        );
    }

    #[test]
    fn split_fallback_without_university() {
        assert_eq!(
            split_fallback("Computer Science"),
            ("Computer Science".to_string(), "Unknown".to_string())
        );
        assert_eq!(split_fallback(""), ("".to_string(), "Unknown".to_string()));
    }

    #[test]
    fn normalize_university_snaps_to_canonical() {
        assert_eq!(normalize_university("McG"), "McGill University");
        assert_eq!(normalize_university("Mcgill University"), "McGill University");
        assert_eq!(
            normalize_university("university of british columbia"),
            "University of British Columbia"
        );
        assert_eq!(normalize_university(""), "Unknown");
        // Close-but-misspelled names fuzzy match into the canonical list.
        assert_eq!(
            normalize_university("Stanford Universty"),
            "Stanford University"
        );
    }

    #[test]
    fn normalize_program_applies_fixes() {
        assert_eq!(normalize_program("mathematic"), "Mathematics");
        assert_eq!(normalize_program("info studies"), "Information Studies");
        assert_eq!(normalize_program("Basket Weaving"), "Basket Weaving");
    }

    // The abbreviation table works even when the model never answers.
    #[tokio::test]
    async fn fuzzy_fallback_without_model() {
        let standardizer = LlmStandardizer::new(None);
        let out = standardizer.standardize("Info, McG").await;
        assert_eq!(out.university, "McGill University");
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        let standardizer = LlmStandardizer::new(Some("http://localhost:0/".to_string()));
        let out = standardizer.standardize("Mathematics, UBC").await;
        assert_eq!(out.university, "University of British Columbia");
        assert_eq!(out.program, "Mathematics");
    }
}
