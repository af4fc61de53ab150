mod crawler;
mod extract;

pub use crawler::GradCafeCrawler;
pub use extract::{classify_tag, decode_tags, extract_record, TagSet, TagValue, TestScore};

use crate::error::CrawlerError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Type of degree an applicant is seeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegreeType {
    Masters,
    Phd,
    Edd,
    Psyd,
    Mfa,
    Mba,
    Jd,
    Other,
}

impl DegreeType {
    pub fn parse(s: &str) -> Option<DegreeType> {
        match s {
            "masters" => Some(DegreeType::Masters),
            "phd" => Some(DegreeType::Phd),
            "edd" => Some(DegreeType::Edd),
            "psyd" => Some(DegreeType::Psyd),
            "mfa" => Some(DegreeType::Mfa),
            "mba" => Some(DegreeType::Mba),
            "jd" => Some(DegreeType::Jd),
            "other" => Some(DegreeType::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DegreeType::Masters => "masters",
            DegreeType::Phd => "phd",
            DegreeType::Edd => "edd",
            DegreeType::Psyd => "psyd",
            DegreeType::Mfa => "mfa",
            DegreeType::Mba => "mba",
            DegreeType::Jd => "jd",
            DegreeType::Other => "other",
        }
    }
}

/// Status of an application decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Accepted,
    Interview,
    WaitListed,
    Rejected, // :'(
    Other,
}

impl DecisionStatus {
    pub fn parse(s: &str) -> Option<DecisionStatus> {
        match s {
            "accepted" => Some(DecisionStatus::Accepted),
            "interview" => Some(DecisionStatus::Interview),
            "wait_listed" => Some(DecisionStatus::WaitListed),
            "rejected" => Some(DecisionStatus::Rejected),
            "other" => Some(DecisionStatus::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Accepted => "accepted",
            DecisionStatus::Interview => "interview",
            DecisionStatus::WaitListed => "wait_listed",
            DecisionStatus::Rejected => "rejected",
            DecisionStatus::Other => "other",
        }
    }
}

/// Term season. Tag chips usually abbreviate these ("F23", "Fall 2024"),
/// so lookups go through `from_prefix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Fall,
    Winter,
    Spring,
    Summer,
}

impl Season {
    const ALL: [Season; 4] = [Season::Fall, Season::Winter, Season::Spring, Season::Summer];

    /// First season whose name starts with the given lowercase prefix.
    pub fn from_prefix(prefix: &str) -> Option<Season> {
        if prefix.is_empty() {
            return None;
        }
        Season::ALL
            .into_iter()
            .find(|season| season.as_str().starts_with(prefix))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Fall => "fall",
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
        }
    }
}

/// Geographical region of an applicant.
///
/// `Unknown` means the entry carried no region tag at all. It is a distinct
/// state, not a default for a failed parse, and it persists as SQL NULL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantRegion {
    #[default]
    Unknown,
    International,
    American,
}

impl ApplicantRegion {
    pub fn parse(s: &str) -> Option<ApplicantRegion> {
        match s {
            "international" => Some(ApplicantRegion::International),
            "american" => Some(ApplicantRegion::American),
            _ => None,
        }
    }

    /// Database representation; `Unknown` maps to NULL.
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            ApplicantRegion::Unknown => None,
            ApplicantRegion::International => Some("international"),
            ApplicantRegion::American => Some("american"),
        }
    }
}

/// A single admissions-result entry from TheGradCafe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionRecord {
    pub id: i64,
    pub school: String,
    pub program_name: Option<String>,
    pub degree_type: Option<DegreeType>,
    pub added_on: Option<NaiveDate>,
    pub decision_status: Option<DecisionStatus>,
    pub decision_date: Option<NaiveDate>,
    pub season: Option<Season>,
    pub year: Option<i32>,
    #[serde(default)]
    pub applicant_region: ApplicantRegion,
    pub gre_general: Option<i32>,
    pub gre_verbal: Option<i32>,
    pub gre_analytical_writing: Option<f64>,
    pub gpa: Option<f64>,
    pub comments: String,
    pub full_info_url: String,
    pub llm_generated_program: Option<String>,
    pub llm_generated_university: Option<String>,
}

impl AdmissionRecord {
    /// Apply standardized names produced by the augmentation step. This is
    /// the only mutation a record sees after extraction.
    pub fn apply_augmentation(&mut self, standardized: crate::augment::Standardized) {
        self.llm_generated_program = Some(standardized.program);
        self.llm_generated_university = Some(standardized.university);
    }
}

impl fmt::Display for AdmissionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Id              : {}", self.id)?;
        writeln!(f, "School          : {}", self.school)?;
        writeln!(
            f,
            "Program         : {}",
            self.program_name.as_deref().unwrap_or("None")
        )?;
        writeln!(
            f,
            "Degree          : {}",
            self.degree_type.map_or("None", |d| d.as_str())
        )?;
        if let Some(d) = self.added_on.as_ref() {
            writeln!(f, "Added On        : {}", d)?;
        } else {
            writeln!(f, "Added On        : None")?;
        };
        writeln!(
            f,
            "Decision        : {}",
            self.decision_status.map_or("None", |s| s.as_str())
        )?;
        if let Some(d) = self.decision_date.as_ref() {
            writeln!(f, "Decision Date   : {}", d)?;
        } else {
            writeln!(f, "Decision Date   : None")?;
        };
        writeln!(
            f,
            "Term            : {} {}",
            self.season.map_or("None", |s| s.as_str()),
            self.year.map_or("None".to_string(), |y| y.to_string())
        )?;
        writeln!(
            f,
            "Region          : {}",
            self.applicant_region.as_sql().unwrap_or("unknown")
        )?;
        writeln!(f, "Url             : {}", self.full_info_url)?;
        if !self.comments.is_empty() {
            writeln!(f, "Comments        : {}", self.comments.replace('\n', " "))?;
        }
        Ok(())
    }
}

/// Save scraped records as a pretty-printed JSON array.
pub fn save_results(records: &[AdmissionRecord], path: &Path) -> Result<(), CrawlerError> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}

/// Load records previously written by `save_results`.
pub fn load_results(path: &Path) -> Result<Vec<AdmissionRecord>, CrawlerError> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}
