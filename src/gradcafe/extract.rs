//! Turns one grouped set of table rows into an [`AdmissionRecord`].
//!
//! A listing entry spans one to three `<tr>` elements: the primary row with
//! the school/program/date/decision cells, an optional row of tag chips, and
//! an optional comments row. Everything here is a pure function of the rows
//! plus an injected "now" used for decision-year inference.

use super::{AdmissionRecord, ApplicantRegion, DecisionStatus, DegreeType, Season};
use crate::error::MalformedEntry;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use lazy_regex::{regex, regex_captures};
use lazy_static::lazy_static;
use scraper::{ElementRef, Selector};
use std::collections::BTreeSet;
use tracing::warn;

const E: &str = "Invalid selector";
lazy_static! {
    static ref TD: Selector = Selector::parse("td").expect(E);
    static ref TAG_CHIP: Selector = Selector::parse(".tw-inline-flex").expect(E);
    static ref RESULT_ANCHOR: Selector = Selector::parse(r#"a[href^="/result"]"#).expect(E);
}

/// One decoded tag chip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagValue {
    Region(ApplicantRegion),
    Term { season: Option<Season>, year: i32 },
    Score(TestScore),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestScore {
    Gpa(f64),
    GreGeneral(i32),
    GreVerbal(i32),
    GreAnalyticalWriting(f64),
}

/// Structured fields accumulated from an entry's tag chips.
#[derive(Debug, Default, PartialEq)]
pub struct TagSet {
    pub season: Option<Season>,
    pub year: Option<i32>,
    pub applicant_region: ApplicantRegion,
    pub gre_general: Option<i32>,
    pub gre_verbal: Option<i32>,
    pub gre_analytical_writing: Option<f64>,
    pub gpa: Option<f64>,
}

/// Classify a single chip, case-insensitively. Rules are tried in fixed
/// precedence order and the first match wins: region, term, test score.
pub fn classify_tag(chip: &str) -> Option<TagValue> {
    let chip = chip.to_lowercase();
    let chip = chip.trim();

    if let Some(region) = ApplicantRegion::parse(chip) {
        return Some(TagValue::Region(region));
    }

    if let Some((_, prefix, raw_year)) = regex_captures!(r"^([a-z]+)\s*(\d{4}|\d{2})$", chip) {
        // Two-digit years get a literal "20" prefix and we keep the last four
        // characters, so "23" becomes 2023 but "99" becomes 2099.
        let padded = format!("20{raw_year}");
        let year = padded[padded.len() - 4..].parse::<i32>().ok()?;
        return Some(TagValue::Term {
            season: Season::from_prefix(prefix),
            year,
        });
    }

    if let Some((_, test, score)) = regex_captures!(r"^(gpa|gre(?:\s+v|\s+aw)?)\s+([\d.]+)$", chip)
    {
        let score = match test {
            "gpa" => TestScore::Gpa(score.parse().ok()?),
            "gre" => TestScore::GreGeneral(score.parse().ok()?),
            t if t.ends_with('v') => TestScore::GreVerbal(score.parse().ok()?),
            _ => TestScore::GreAnalyticalWriting(score.parse().ok()?),
        };
        return Some(TagValue::Score(score));
    }

    None
}

/// Fold a set of chips into a [`TagSet`]. Chips matching no rule are
/// silently discarded.
pub fn decode_tags<I, S>(chips: I) -> TagSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = TagSet::default();
    for chip in chips {
        match classify_tag(chip.as_ref()) {
            Some(TagValue::Region(region)) => tags.applicant_region = region,
            Some(TagValue::Term { season, year }) => {
                // A term chip whose letters match no season still carries
                // a usable year.
                if season.is_some() {
                    tags.season = season;
                }
                tags.year = Some(year);
            }
            Some(TagValue::Score(TestScore::Gpa(v))) => tags.gpa = Some(v),
            Some(TagValue::Score(TestScore::GreGeneral(v))) => tags.gre_general = Some(v),
            Some(TagValue::Score(TestScore::GreVerbal(v))) => tags.gre_verbal = Some(v),
            Some(TagValue::Score(TestScore::GreAnalyticalWriting(v))) => {
                tags.gre_analytical_writing = Some(v)
            }
            None => {}
        }
    }
    tags
}

/// Parse a decision cell like "Accepted on 10 Feb" or
/// "Wait listed on 2 Jan, 2023".
///
/// Decision dates usually omit the year. The reference year comes from the
/// entry itself (publish date, then term tag, then "now"); when the resolved
/// date would land strictly in the future the reference year is decremented
/// once and the parse re-applied, which handles decisions posted across a
/// year boundary.
pub fn parse_decision(
    decision: &str,
    reference_year: i32,
    now: NaiveDateTime,
) -> (Option<DecisionStatus>, Option<NaiveDate>) {
    let Some((_, status_text, day, month, year)) = regex_captures!(
        r"^([A-Za-z ]+?)\s+on\s+(\d{1,2})\s+([A-Za-z]+)(?:,\s*(\d{4}))?$",
        decision.trim()
    ) else {
        warn!("Failed to parse decision: {decision:?}");
        return (None, None);
    };

    let normalized = status_text.to_lowercase().replace(' ', "_");
    let Some(status) = DecisionStatus::parse(&normalized) else {
        warn!("Unrecognized decision status: {status_text:?}");
        return (None, None);
    };

    // An explicit year in the source text is used verbatim.
    if let Ok(explicit) = year.parse::<i32>() {
        let date = parse_day_month(day, month, explicit);
        if date.is_none() {
            warn!("Failed to parse date string: {day} {month}, {year}");
        }
        return (Some(status), date);
    }

    let date = match parse_day_month(day, month, reference_year) {
        Some(candidate) if candidate.and_time(NaiveTime::MIN) > now => {
            parse_day_month(day, month, reference_year - 1)
        }
        Some(candidate) => Some(candidate),
        None => {
            warn!("Failed to parse date string: {day} {month}");
            None
        }
    };

    (Some(status), date)
}

fn parse_day_month(day: &str, month: &str, year: i32) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{day} {month} {year}"), "%d %b %Y").ok()
}

/// Split the combined program cell into a program name and a degree type.
///
/// The two are separated by an inline icon in the source markup, which
/// surfaces as a run of blank lines once the cell is flattened to text.
pub fn split_program(program: &str) -> (Option<String>, Option<DegreeType>) {
    let mut segments = regex!(r"\n{2,}").splitn(program, 3).map(str::trim);

    let program_name = segments
        .next()
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    let degree_type = segments.next().filter(|s| !s.is_empty()).and_then(|raw| {
        let parsed = DegreeType::parse(&raw.to_lowercase());
        if parsed.is_none() {
            warn!("Failed to process degree type: {raw:?}");
        }
        parsed
    });

    (program_name, degree_type)
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Extract one [`AdmissionRecord`] from a grouped set of rows.
///
/// The only hard requirement is the anchor to the entry's detail page; its
/// trailing digits are the record id. Everything else degrades to None (or
/// an empty string for comments) when missing or unparseable.
pub fn extract_record(
    rows: &[ElementRef<'_>],
    now: NaiveDateTime,
) -> Result<AdmissionRecord, MalformedEntry> {
    let first = rows.first().ok_or(MalformedEntry::MissingResultAnchor)?;

    let anchor = first
        .select(&RESULT_ANCHOR)
        .next()
        .ok_or(MalformedEntry::MissingResultAnchor)?;
    let full_info_url = anchor
        .value()
        .attr("href")
        .ok_or(MalformedEntry::MissingResultAnchor)?
        .to_string();

    // Hrefs should always be in the form `/result/{id}`.
    let id = regex_captures!(r".+/(\d+)$", &full_info_url)
        .and_then(|(_, digits)| digits.parse::<i64>().ok())
        .ok_or_else(|| MalformedEntry::UnrecognizedResultHref(full_info_url.clone()))?;

    let mut cells = first.select(&TD).map(cell_text);
    let school = cells.next().unwrap_or_default();
    let program = cells.next().unwrap_or_default();
    let added_on_text = cells.next().unwrap_or_default();
    let decision_text = cells.next().unwrap_or_default();

    let added_on = if added_on_text.is_empty() {
        None
    } else {
        let parsed = NaiveDate::parse_from_str(&added_on_text, "%B %d, %Y").ok();
        if parsed.is_none() {
            warn!("Failed to parse added-on date: {added_on_text:?}");
        }
        parsed
    };

    let chips: BTreeSet<String> = rows
        .get(1)
        .map(|row| row.select(&TAG_CHIP).map(cell_text).collect())
        .unwrap_or_default();
    let tags = decode_tags(&chips);

    let comments = rows.get(2).map(|row| cell_text(*row)).unwrap_or_default();

    let reference_year = added_on
        .map(|d| d.year())
        .or(tags.year)
        .unwrap_or_else(|| now.date().year());
    let (decision_status, decision_date) = parse_decision(&decision_text, reference_year, now);

    let (program_name, degree_type) = split_program(&program);

    Ok(AdmissionRecord {
        id,
        school,
        program_name,
        degree_type,
        added_on,
        decision_status,
        decision_date,
        season: tags.season,
        year: tags.year,
        applicant_region: tags.applicant_region,
        gre_general: tags.gre_general,
        gre_verbal: tags.gre_verbal,
        gre_analytical_writing: tags.gre_analytical_writing,
        gpa: tags.gpa,
        comments,
        full_info_url,
        llm_generated_program: None,
        llm_generated_university: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scraper::Html;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn classify_region_chips() {
        assert_eq!(
            classify_tag("International"),
            Some(TagValue::Region(ApplicantRegion::International))
        );
        assert_eq!(
            classify_tag("american"),
            Some(TagValue::Region(ApplicantRegion::American))
        );
    }

    #[test]
    fn classify_term_chips() {
        assert_eq!(
            classify_tag("Fall 2024"),
            Some(TagValue::Term {
                season: Some(Season::Fall),
                year: 2024
            })
        );
        assert_eq!(
            classify_tag("F23"),
            Some(TagValue::Term {
                season: Some(Season::Fall),
                year: 2023
            })
        );
        // Letters that name no season still produce a year.
        assert_eq!(
            classify_tag("xx 23"),
            Some(TagValue::Term {
                season: None,
                year: 2023
            })
        );
    }

    // Pins the current year normalization, mangle included: the "20" prefix
    // plus last-four truncation leaves "1999" alone but turns "99" into 2099.
    #[test]
    fn term_year_normalization_is_preserved() {
        let year_of = |chip: &str| match classify_tag(chip) {
            Some(TagValue::Term { year, .. }) => year,
            other => panic!("expected a term, got {other:?}"),
        };
        assert_eq!(year_of("fall 23"), 2023);
        assert_eq!(year_of("fall 1999"), 1999);
        assert_eq!(year_of("fall 99"), 2099);
    }

    #[test]
    fn classify_score_chips() {
        assert_eq!(
            classify_tag("GPA 3.8"),
            Some(TagValue::Score(TestScore::Gpa(3.8)))
        );
        // Three digits fail the term rule's 2-or-4-digit suffix, so "GRE 325"
        // falls through to the score rule instead of becoming year 2032.
        assert_eq!(
            classify_tag("GRE 325"),
            Some(TagValue::Score(TestScore::GreGeneral(325)))
        );
        assert_eq!(
            classify_tag("GRE V 160"),
            Some(TagValue::Score(TestScore::GreVerbal(160)))
        );
        assert_eq!(
            classify_tag("GRE AW 4.5"),
            Some(TagValue::Score(TestScore::GreAnalyticalWriting(4.5)))
        );
    }

    #[test]
    fn unknown_chips_are_discarded() {
        assert_eq!(classify_tag("Funded"), None);
        assert_eq!(classify_tag(""), None);

        let tags = decode_tags(["Funded", "Fall 2024", "Other Notes"]);
        assert_eq!(tags.season, Some(Season::Fall));
        assert_eq!(tags.year, Some(2024));
        assert_eq!(tags.applicant_region, ApplicantRegion::Unknown);
    }

    #[test]
    fn absent_region_stays_unknown() {
        let without = decode_tags(["Fall 2024", "GPA 3.8"]);
        assert_eq!(without.applicant_region, ApplicantRegion::Unknown);

        let with = decode_tags(["Fall 2024", "American"]);
        assert_eq!(with.applicant_region, ApplicantRegion::American);
    }

    #[test]
    fn decision_same_year() {
        let (status, date) = parse_decision("Accepted on 10 Feb", 2024, at(2024, 2, 20));
        assert_eq!(status, Some(DecisionStatus::Accepted));
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 2, 10));
    }

    #[test]
    fn decision_rolls_back_a_year_when_future() {
        // A December decision on an entry added in January belongs to the
        // prior year.
        let (status, date) = parse_decision("Rejected on 20 Dec", 2024, at(2024, 1, 5));
        assert_eq!(status, Some(DecisionStatus::Rejected));
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 12, 20));
    }

    #[test]
    fn decision_today_is_not_future() {
        let (_, date) = parse_decision("Accepted on 20 Feb", 2024, at(2024, 2, 20));
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 2, 20));
    }

    #[test]
    fn decision_with_explicit_year() {
        let (status, date) = parse_decision("Wait listed on 2 Jan, 2023", 2025, at(2025, 6, 1));
        assert_eq!(status, Some(DecisionStatus::WaitListed));
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 1, 2));
    }

    #[test]
    fn decision_unrecognized_status_degrades_to_none() {
        let (status, date) = parse_decision("Ghosted on 10 Feb", 2024, at(2024, 3, 1));
        assert_eq!(status, None);
        assert_eq!(date, None);
    }

    #[test]
    fn decision_garbage_degrades_to_none() {
        assert_eq!(parse_decision("", 2024, at(2024, 3, 1)), (None, None));
        assert_eq!(
            parse_decision("Accepted", 2024, at(2024, 3, 1)),
            (None, None)
        );
    }

    #[test]
    fn program_split_on_blank_lines() {
        let (name, degree) = split_program("Computer Science\n\n\nMasters");
        assert_eq!(name.as_deref(), Some("Computer Science"));
        assert_eq!(degree, Some(DegreeType::Masters));
    }

    #[test]
    fn program_without_degree_suffix() {
        let (name, degree) = split_program("History");
        assert_eq!(name.as_deref(), Some("History"));
        assert_eq!(degree, None);
    }

    #[test]
    fn program_with_unrecognized_degree() {
        let (name, degree) = split_program("Linguistics\n\nDiploma");
        assert_eq!(name.as_deref(), Some("Linguistics"));
        assert_eq!(degree, None);
    }

    #[test]
    fn empty_program_cell() {
        assert_eq!(split_program(""), (None, None));
    }

    const ENTRY_HTML: &str = r#"
        <table><tbody>
          <tr>
            <td>SUNY Stony Brook</td>
            <td><div><span>Computer Science</span>

                <span>Masters</span></div></td>
            <td>January 15, 2024</td>
            <td>Accepted on 10 Feb</td>
            <td><a href="/result/55512">See more</a></td>
          </tr>
          <tr>
            <td colspan="100%">
              <span class="tw-inline-flex">Fall 2024</span>
              <span class="tw-inline-flex">GPA 3.8</span>
              <span class="tw-inline-flex">GRE 325</span>
            </td>
          </tr>
          <tr>
            <td colspan="100%"><p>Great program!</p></td>
          </tr>
        </tbody></table>
    "#;

    #[test]
    fn extracts_full_entry() {
        let doc = Html::parse_document(ENTRY_HTML);
        let tr = Selector::parse("tr").unwrap();
        let rows: Vec<ElementRef> = doc.select(&tr).collect();

        let record = extract_record(&rows, at(2024, 3, 1)).unwrap();

        assert_eq!(record.id, 55512);
        assert_eq!(record.school, "SUNY Stony Brook");
        assert_eq!(record.program_name.as_deref(), Some("Computer Science"));
        assert_eq!(record.degree_type, Some(DegreeType::Masters));
        assert_eq!(record.added_on, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(record.decision_status, Some(DecisionStatus::Accepted));
        assert_eq!(record.decision_date, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(record.season, Some(Season::Fall));
        assert_eq!(record.year, Some(2024));
        assert_eq!(record.applicant_region, ApplicantRegion::Unknown);
        assert_eq!(record.gpa, Some(3.8));
        assert_eq!(record.gre_general, Some(325));
        assert_eq!(record.gre_verbal, None);
        assert_eq!(record.gre_analytical_writing, None);
        assert_eq!(record.comments, "Great program!");
        assert_eq!(record.full_info_url, "/result/55512");
        assert_eq!(record.llm_generated_program, None);
        assert_eq!(record.llm_generated_university, None);
    }

    #[test]
    fn extraction_is_deterministic() {
        let doc = Html::parse_document(ENTRY_HTML);
        let tr = Selector::parse("tr").unwrap();
        let rows: Vec<ElementRef> = doc.select(&tr).collect();

        let a = extract_record(&rows, at(2024, 3, 1)).unwrap();
        let b = extract_record(&rows, at(2024, 3, 1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_anchor_is_malformed() {
        let html = r#"
            <table><tbody><tr>
              <td>Some School</td><td>Math</td>
              <td>May 2, 2024</td><td>Accepted on 1 May</td>
            </tr></tbody></table>
        "#;
        let doc = Html::parse_document(html);
        let tr = Selector::parse("tr").unwrap();
        let rows: Vec<ElementRef> = doc.select(&tr).collect();

        assert_eq!(
            extract_record(&rows, at(2024, 6, 1)).unwrap_err(),
            MalformedEntry::MissingResultAnchor
        );
    }

    #[test]
    fn anchor_without_id_is_malformed() {
        let html = r#"
            <table><tbody><tr>
              <td>Some School</td><td>Math</td>
              <td>May 2, 2024</td><td>Accepted on 1 May</td>
              <td><a href="/result/latest">See more</a></td>
            </tr></tbody></table>
        "#;
        let doc = Html::parse_document(html);
        let tr = Selector::parse("tr").unwrap();
        let rows: Vec<ElementRef> = doc.select(&tr).collect();

        assert_eq!(
            extract_record(&rows, at(2024, 6, 1)).unwrap_err(),
            MalformedEntry::UnrecognizedResultHref("/result/latest".to_string())
        );
    }
}
