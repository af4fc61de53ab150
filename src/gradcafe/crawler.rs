//! Incremental crawler for the paginated admissions listing.

use super::{extract_record, AdmissionRecord};
use crate::error::CrawlerError;
use crate::utils;
use chrono::NaiveDateTime;
use itertools::Itertools;
use lazy_regex::regex_captures;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use texting_robots::Robot;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

const BASE_URL: &str = "https://www.thegradcafe.com";
const USER_AGENT: &str = "gradcafe-crawler/0.1";
const REQUEST_DELAY: Duration = Duration::from_millis(200);

const E: &str = "Invalid selector";
lazy_static! {
    static ref TD_COLSPAN: Selector = Selector::parse("td[colspan]").expect(E);
    static ref A: Selector = Selector::parse("a").expect(E);
}

/// Crawls successive `/survey/?page=<n>` listing pages, extracting a record
/// per row-group, until pagination runs out, a limit is reached, or a known
/// watermark id shows up.
///
/// Crawling is strictly sequential. Callers that trigger crawls from a
/// request path are expected to run at most one at a time (see
/// [`crate::gate::CrawlGate`]).
pub struct GradCafeCrawler {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    request_delay: Duration,
    robots: Option<Robot>,
    last_request: Option<Instant>,
    now: fn() -> NaiveDateTime,
}

impl Default for GradCafeCrawler {
    fn default() -> Self {
        Self::new()
    }
}

impl GradCafeCrawler {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        GradCafeCrawler {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            user_agent: USER_AGENT.to_string(),
            request_delay: REQUEST_DELAY,
            robots: None,
            last_request: None,
            now: utils::now_local,
        }
    }

    /// Courtesy delay between page fetches. Zero disables pacing.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Swap the wall clock used for decision-date inference.
    pub fn with_clock(mut self, now: fn() -> NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    /// Fetch robots.txt once, then verify the target URL is allowed before
    /// every page fetch. A disallowed URL fails the whole crawl.
    async fn ensure_permitted(&mut self, url: &str) -> Result<(), CrawlerError> {
        if self.robots.is_none() {
            let robots_url = format!("{}/robots.txt", self.base_url);
            debug!("Fetching {robots_url}");
            let body = self
                .client
                .get(&robots_url)
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .send()
                .await?
                .bytes()
                .await?;
            let robot = Robot::new(&self.user_agent, &body)
                .map_err(|e| CrawlerError::Robots(e.to_string()))?;
            self.robots = Some(robot);
        }

        if let Some(robot) = &self.robots {
            if !robot.allowed(url) {
                return Err(CrawlerError::PermissionDenied {
                    url: url.to_string(),
                    user_agent: self.user_agent.clone(),
                });
            }
        }

        Ok(())
    }

    async fn pace(&mut self) {
        if let Some(last_request) = self.last_request {
            let elapsed = last_request.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Scrape a single listing page. Returns the extracted records and
    /// whether pagination points past this page.
    pub async fn scrape_page(
        &mut self,
        page: u32,
    ) -> Result<(Vec<AdmissionRecord>, bool), CrawlerError> {
        debug_assert!(page > 0);

        let url = format!("{}/survey/?page={}", self.base_url, page);

        // Permission comes first, before any content fetch.
        self.ensure_permitted(&url).await?;

        self.pace().await;
        debug!("Visit {url}");
        let html = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let doc = Html::parse_document(&html);
        self.parse_listing(&doc, page)
    }

    /// Parse an already-fetched listing document. Split out from
    /// `scrape_page` so tests can run it against fixture HTML.
    pub fn parse_listing(
        &self,
        doc: &Html,
        page: u32,
    ) -> Result<(Vec<AdmissionRecord>, bool), CrawlerError> {
        let now = (self.now)();

        let mut records = Vec::new();
        for group in result_row_groups(doc, page)? {
            match extract_record(&group, now) {
                Ok(record) => records.push(record),
                // One bad entry does not lose the rest of the page.
                Err(e) => warn!("Skipping entry on page {page}: {e}"),
            }
        }

        Ok((records, has_more_pages(doc, page)))
    }

    /// Crawl starting at `start_page`, accumulating records until pagination
    /// runs out, `limit` records have been collected, or `stop_at_id` is seen.
    ///
    /// Best effort by design: any page-level failure ends the crawl and
    /// whatever was accumulated so far is returned. A short result list may
    /// therefore be an incomplete one.
    pub async fn crawl(
        &mut self,
        start_page: u32,
        limit: Option<usize>,
        stop_at_id: Option<i64>,
    ) -> Vec<AdmissionRecord> {
        let mut records: Vec<AdmissionRecord> = Vec::new();
        let mut page = start_page;
        let mut more_pages = true;

        while more_pages && limit.map_or(true, |n| records.len() < n) {
            info!("Scraping page #{page}");

            let (mut page_results, more) = match self.scrape_page(page).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Error during scrape of page {page}: {e}");
                    break;
                }
            };
            more_pages = more;

            info!("Success... found {} items", page_results.len());

            if truncate_at_watermark(&mut page_results, stop_at_id) {
                info!("Found id {stop_at_id:?} in results, stopping");
                more_pages = false;
            }

            records.extend(page_results);
            page += 1;
        }

        info!("Got {} results", records.len());
        records
    }
}

/// If the watermark id appears in this page's results, drop everything at or
/// below it and report that the crawl should stop. The listing is
/// newest-first, so any id at or below the watermark means all later pages
/// are already known.
fn truncate_at_watermark(page_results: &mut Vec<AdmissionRecord>, stop_at_id: Option<i64>) -> bool {
    let Some(stop) = stop_at_id else {
        return false;
    };
    if !page_results.iter().any(|r| r.id == stop) {
        return false;
    }
    page_results.retain(|r| r.id > stop);
    true
}

/// The results table is the first `<tbody>` following the first `<h1>` in
/// document order.
fn results_tbody(doc: &Html) -> Option<ElementRef<'_>> {
    let mut seen_heading = false;
    for node in doc.tree.root().descendants() {
        if let Some(el) = ElementRef::wrap(node) {
            match el.value().name() {
                "h1" => seen_heading = true,
                "tbody" if seen_heading => return Some(el),
                _ => {}
            }
        }
    }
    None
}

/// Partition the table body's rows into per-entry groups.
///
/// A row opens a new group when it has no column-spanning cell; the
/// supplementary rows (tag chips, comments) each span the full row. Groups
/// are adjacent pairs over the opening-row indices, so the trailing
/// unterminated run is dropped rather than emitted as a partial group.
fn result_row_groups<'a>(
    doc: &'a Html,
    page: u32,
) -> Result<Vec<Vec<ElementRef<'a>>>, CrawlerError> {
    let tbody = results_tbody(doc).ok_or(CrawlerError::MissingResultsTable(page))?;

    let rows: Vec<ElementRef> = tbody.children().filter_map(ElementRef::wrap).collect();

    let groups = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.select(&TD_COLSPAN).next().is_none())
        .map(|(index, _)| index)
        .tuple_windows()
        .map(|(start, end)| rows[start..end].to_vec())
        .collect();

    Ok(groups)
}

/// More pages exist when any same-page anchor points at a higher page number.
fn has_more_pages(doc: &Html, page: u32) -> bool {
    doc.select(&A)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| regex_captures!(r"\?page=(\d+)$", href))
        .filter_map(|(_, digits)| digits.parse::<u32>().ok())
        .max()
        .map_or(false, |highest| highest > page)
}
