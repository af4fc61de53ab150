//! Sqlite-backed storage for scraped admission records.
//!
//! The upsert is keyed on the record id, so re-running a crawl over
//! overlapping pages never produces duplicate rows.

use crate::error::CrawlerError;
use crate::gradcafe::{AdmissionRecord, ApplicantRegion, DecisionStatus, DegreeType, Season};
use crate::utils;
use chrono::NaiveDate;
use futures::TryStreamExt;
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqliteRow, Row, SqlitePool};
use tracing::debug;

/// Storage seam for finished records. Implementations must make `upsert`
/// idempotent on the record id.
#[async_trait::async_trait]
pub trait RecordStore {
    async fn upsert(&self, record: &AdmissionRecord) -> Result<(), CrawlerError>;
    async fn latest_id(&self) -> Result<Option<i64>, CrawlerError>;
    async fn count(&self) -> Result<u32, CrawlerError>;
}

pub struct Persistent {
    pub name: String,
    table: String,
    pool: SqlitePool,
}

impl Persistent {
    pub async fn new(name: &str) -> Result<Persistent, CrawlerError> {
        let opt = SqliteConnectOptions::new()
            .filename(format!("{name}.db"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;

        let p = Persistent {
            name: name.to_string(),
            table: format!("{name}_admissions"),
            pool,
        };

        if !utils::is_table_exists(&p.pool, &p.table).await? {
            p.create_table().await?;
        } else {
            debug!("Use table {}", p.table);
        }

        Ok(p)
    }

    async fn create_table(&self) -> Result<(), CrawlerError> {
        let query = format!(
            r#"
                CREATE TABLE {} (
                    p_id INTEGER PRIMARY KEY,
                    school TEXT,
                    program_name TEXT,
                    comments TEXT,
                    date_added DATE,
                    url TEXT,
                    status TEXT,
                    decision_date DATE,
                    season TEXT,
                    year INTEGER,
                    us_or_international TEXT,
                    gpa REAL,
                    gre INTEGER,
                    gre_v INTEGER,
                    gre_aw REAL,
                    degree TEXT,
                    llm_generated_program TEXT,
                    llm_generated_university TEXT,
                    created_at DATETIME
                )
            "#,
            self.table
        );
        sqlx::query(query.as_str()).execute(&self.pool).await?;
        debug!("Created {}", self.table);
        Ok(())
    }

    /// Insert or fully replace the row with the record's id.
    pub async fn upsert(&self, record: &AdmissionRecord) -> Result<(), CrawlerError> {
        let query = format!(
            r#"INSERT INTO {} (
                p_id,
                school,
                program_name,
                comments,
                date_added,
                url,
                status,
                decision_date,
                season,
                year,
                us_or_international,
                gpa,
                gre,
                gre_v,
                gre_aw,
                degree,
                llm_generated_program,
                llm_generated_university,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (p_id) DO UPDATE SET
                school = excluded.school,
                program_name = excluded.program_name,
                comments = excluded.comments,
                date_added = excluded.date_added,
                url = excluded.url,
                status = excluded.status,
                decision_date = excluded.decision_date,
                season = excluded.season,
                year = excluded.year,
                us_or_international = excluded.us_or_international,
                gpa = excluded.gpa,
                gre = excluded.gre,
                gre_v = excluded.gre_v,
                gre_aw = excluded.gre_aw,
                degree = excluded.degree,
                llm_generated_program = excluded.llm_generated_program,
                llm_generated_university = excluded.llm_generated_university"#,
            self.table
        );

        sqlx::query(&query)
            .bind(record.id)
            .bind(&record.school)
            .bind(&record.program_name)
            .bind(&record.comments)
            .bind(record.added_on)
            .bind(&record.full_info_url)
            .bind(record.decision_status.map(|s| s.as_str()))
            .bind(record.decision_date)
            .bind(record.season.map(|s| s.as_str()))
            .bind(record.year)
            .bind(record.applicant_region.as_sql())
            .bind(record.gpa)
            .bind(record.gre_general)
            .bind(record.gre_verbal)
            .bind(record.gre_analytical_writing)
            .bind(record.degree_type.map(|d| d.as_str()))
            .bind(&record.llm_generated_program)
            .bind(&record.llm_generated_university)
            .bind(utils::get_now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Highest stored id, the watermark for incremental crawls.
    pub async fn latest_id(&self) -> Result<Option<i64>, CrawlerError> {
        let query = format!("SELECT MAX(p_id) FROM {}", self.table);
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.try_get(0)?)
    }

    pub async fn count(&self) -> Result<u32, CrawlerError> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table);
        Ok(sqlx::query(&query)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?)
    }

    pub async fn get(&self, id: i64) -> Result<Option<AdmissionRecord>, CrawlerError> {
        let query = format!("SELECT * FROM {} WHERE p_id = ?", self.table);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| record_from_row(&r)).transpose()
    }

    pub async fn all(&self) -> Result<Vec<AdmissionRecord>, CrawlerError> {
        let mut records = Vec::new();
        let query = format!("SELECT * FROM {} ORDER BY p_id", self.table);
        let mut rows = sqlx::query(&query).fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            records.push(record_from_row(&row)?);
        }
        Ok(records)
    }
}

fn record_from_row(row: &SqliteRow) -> Result<AdmissionRecord, CrawlerError> {
    let status: Option<String> = row.try_get("status")?;
    let season: Option<String> = row.try_get("season")?;
    let region: Option<String> = row.try_get("us_or_international")?;
    let degree: Option<String> = row.try_get("degree")?;
    let date_added: Option<NaiveDate> = row.try_get("date_added")?;
    let decision_date: Option<NaiveDate> = row.try_get("decision_date")?;
    let comments: Option<String> = row.try_get("comments")?;

    Ok(AdmissionRecord {
        id: row.try_get("p_id")?,
        school: row.try_get("school")?,
        program_name: row.try_get("program_name")?,
        degree_type: degree.as_deref().and_then(DegreeType::parse),
        added_on: date_added,
        decision_status: status.as_deref().and_then(DecisionStatus::parse),
        decision_date,
        season: season.as_deref().and_then(Season::from_prefix),
        year: row.try_get("year")?,
        applicant_region: region
            .as_deref()
            .and_then(ApplicantRegion::parse)
            .unwrap_or_default(),
        gre_general: row.try_get("gre")?,
        gre_verbal: row.try_get("gre_v")?,
        gre_analytical_writing: row.try_get("gre_aw")?,
        gpa: row.try_get("gpa")?,
        comments: comments.unwrap_or_default(),
        full_info_url: row.try_get("url")?,
        llm_generated_program: row.try_get("llm_generated_program")?,
        llm_generated_university: row.try_get("llm_generated_university")?,
    })
}

#[async_trait::async_trait]
impl RecordStore for Persistent {
    async fn upsert(&self, record: &AdmissionRecord) -> Result<(), CrawlerError> {
        Persistent::upsert(self, record).await
    }

    async fn latest_id(&self) -> Result<Option<i64>, CrawlerError> {
        Persistent::latest_id(self).await
    }

    async fn count(&self) -> Result<u32, CrawlerError> {
        Persistent::count(self).await
    }
}
