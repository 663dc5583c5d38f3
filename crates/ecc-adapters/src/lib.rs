//! Results-page adapters plus the fragment-level extraction stack.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ecc_core::Competition;
use ecc_storage::{FetchError, HttpFetcher};
use scraper::{ElementRef, Html, Selector};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub mod dates;
pub mod extract;
pub mod fragment;
mod patterns;
pub mod phases;
pub mod teams;

pub use dates::{parse_date, parse_date_at};
pub use extract::{
    extract_fragment, CarriedState, DateSource, ExtractionContext, FragmentOutcome, MatchCandidate,
};
pub use fragment::{Fragment, FragmentElement, FragmentNode, LabelKind};
pub use phases::{infer_phase_from_date, normalize_phase, CalendarBook};
pub use teams::is_club;

pub const CRATE_NAME: &str = "ecc-adapters";

/// Selectors tried in order when locating match rows on a results page.
pub const MATCH_ROW_SELECTORS: &[&str] = &[
    "div.event__match",
    "div[class*='event__match']",
    "div.event__match--twoLine",
    "div[data-testid='match-row']",
];

/// A selector must yield more rows than this to be accepted outright.
pub const MIN_SELECTOR_MATCHES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Fixture,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    /// Pre-flattened rows; when present they replace markup parsing.
    #[serde(default)]
    pub text_fragments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[async_trait]
pub trait ResultsAdapter: Send + Sync {
    fn competition(&self) -> Competition;
    fn mode(&self) -> SourceMode;

    async fn fetch_page(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<FetchedPage, AdapterError>;

    fn locate_fragments(&self, page: &FetchedPage) -> Result<Vec<Fragment>, AdapterError> {
        fragments_from_page(page)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub fixture_id: String,
    pub competition: Competition,
    pub captured_from_url: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub raw_page: Option<FixtureRawPage>,
    #[serde(default)]
    pub text_fragments: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRawPage {
    pub content_type: String,
    pub path: Option<String>,
    pub inline_text: Option<String>,
}

pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle> {
    let path = path.as_ref();
    let mut bundle: FixtureBundle = read_json_file(path)?;
    hydrate_inline_raw_page(path, &mut bundle)?;
    Ok(bundle)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn hydrate_inline_raw_page(bundle_path: &Path, bundle: &mut FixtureBundle) -> Result<()> {
    let Some(raw_page) = bundle.raw_page.as_mut() else {
        return Ok(());
    };
    if raw_page.inline_text.is_some() {
        return Ok(());
    }
    let Some(rel_path) = &raw_page.path else {
        return Ok(());
    };
    let raw_path = bundle_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(rel_path);
    let raw = fs::read_to_string(&raw_path)
        .with_context(|| format!("reading fixture raw page {}", raw_path.display()))?;
    raw_page.inline_text = Some(raw);
    Ok(())
}

/// Fragments for a fetched page: text rows when present, else located markup rows.
pub fn fragments_from_page(page: &FetchedPage) -> Result<Vec<Fragment>, AdapterError> {
    if !page.text_fragments.is_empty() {
        return Ok(page
            .text_fragments
            .iter()
            .enumerate()
            .map(|(position, text)| Fragment::from_text(position, text))
            .collect());
    }
    let html = std::str::from_utf8(&page.body)
        .map_err(|e| AdapterError::Message(format!("page {} is not utf-8: {e}", page.url)))?;
    locate_match_fragments(html)
}

fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Message(e.to_string()))
}

/// Match rows in document order, using the first selector that yields enough
/// rows, then the first non-empty one, then innermost score-bearing divs.
pub fn locate_match_fragments(html: &str) -> Result<Vec<Fragment>, AdapterError> {
    let document = Html::parse_document(html);

    let mut first_non_empty: Option<(&str, Vec<ElementRef<'_>>)> = None;
    for &selector in MATCH_ROW_SELECTORS {
        let parsed = parse_selector(selector)?;
        let rows: Vec<_> = document.select(&parsed).collect();
        if rows.len() > MIN_SELECTOR_MATCHES {
            debug!(selector, rows = rows.len(), "match row selector accepted");
            return Ok(to_fragments(rows));
        }
        if first_non_empty.is_none() && !rows.is_empty() {
            first_non_empty = Some((selector, rows));
        }
    }
    if let Some((selector, rows)) = first_non_empty {
        debug!(selector, rows = rows.len(), "using sparse match row selector");
        return Ok(to_fragments(rows));
    }

    let divs = parse_selector("div")?;
    let has_score = |el: &ElementRef<'_>| {
        let text = el.text().collect::<Vec<_>>().join(" ");
        patterns::SCORE_IN_TEXT.is_match(&text)
    };
    let rows: Vec<_> = document
        .select(&divs)
        .filter(|el| has_score(el) && !el.select(&divs).any(|inner| has_score(&inner)))
        .collect();
    debug!(rows = rows.len(), "falling back to score-bearing divs");
    Ok(to_fragments(rows))
}

fn to_fragments(rows: Vec<ElementRef<'_>>) -> Vec<Fragment> {
    rows.into_iter()
        .enumerate()
        .map(|(position, el)| Fragment::from_element(position, el))
        .collect()
}

pub fn default_results_url(competition: Competition) -> &'static str {
    match competition {
        Competition::Ucl => "https://www.flashscore.com/football/europe/champions-league/results/",
        Competition::Uel => "https://www.flashscore.com/football/europe/europa-league/results/",
        Competition::Uecl => {
            "https://www.flashscore.com/football/europe/europa-conference-league/results/"
        }
    }
}

#[derive(Debug, Clone)]
struct FlashScoreAdapter {
    competition: Competition,
    results_url: String,
}

#[derive(Debug, Clone)]
struct FixtureAdapter {
    competition: Competition,
    bundle_path: PathBuf,
}

#[async_trait]
impl ResultsAdapter for FlashScoreAdapter {
    fn competition(&self) -> Competition {
        self.competition
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Http
    }

    async fn fetch_page(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<FetchedPage, AdapterError> {
        let response = http
            .fetch_page(ctx.run_id, self.competition, &self.results_url)
            .await?;
        Ok(FetchedPage {
            url: response.final_url,
            content_type: "text/html".to_string(),
            body: response.body,
            fetched_at: response.fetched_at,
            text_fragments: Vec::new(),
        })
    }
}

#[async_trait]
impl ResultsAdapter for FixtureAdapter {
    fn competition(&self) -> Competition {
        self.competition
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Fixture
    }

    async fn fetch_page(
        &self,
        _http: &HttpFetcher,
        _ctx: &AdapterContext,
    ) -> Result<FetchedPage, AdapterError> {
        let bundle = load_fixture_bundle(&self.bundle_path)?;
        if bundle.competition != self.competition {
            return Err(AdapterError::Message(format!(
                "bundle competition={} does not match adapter competition={}",
                bundle.competition, self.competition
            )));
        }
        let (content_type, body) = match bundle.raw_page {
            Some(raw) => (raw.content_type, raw.inline_text.unwrap_or_default().into_bytes()),
            None => ("text/plain".to_string(), Vec::new()),
        };
        if body.is_empty() && bundle.text_fragments.is_empty() {
            return Err(AdapterError::Message(format!(
                "fixture {} has neither a raw page nor text fragments",
                bundle.fixture_id
            )));
        }
        Ok(FetchedPage {
            url: bundle.captured_from_url,
            content_type,
            body,
            fetched_at: bundle.fetched_at,
            text_fragments: bundle.text_fragments,
        })
    }
}

pub fn flashscore_adapter(competition: Competition, results_url: impl Into<String>) -> impl ResultsAdapter {
    FlashScoreAdapter {
        competition,
        results_url: results_url.into(),
    }
}

pub fn fixture_adapter(competition: Competition, bundle_path: impl Into<PathBuf>) -> impl ResultsAdapter {
    FixtureAdapter {
        competition,
        bundle_path: bundle_path.into(),
    }
}

/// Adapter for a registry entry; `None` when fixture mode has no bundle path.
pub fn adapter_for_competition(
    competition: Competition,
    mode: SourceMode,
    results_url: Option<&str>,
    fixture_path: Option<&Path>,
) -> Option<Box<dyn ResultsAdapter>> {
    match mode {
        SourceMode::Http => {
            let url = results_url.unwrap_or_else(|| default_results_url(competition));
            Some(Box::new(flashscore_adapter(competition, url.to_string())))
        }
        SourceMode::Fixture => fixture_path.map(|path| {
            Box::new(fixture_adapter(competition, path.to_path_buf())) as Box<dyn ResultsAdapter>
        }),
    }
}
