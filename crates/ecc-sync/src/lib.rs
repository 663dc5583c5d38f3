//! Run orchestration: registry and params loading, per-competition extraction,
//! hand-off files, reports and Parquet snapshots.

pub mod export;
pub mod pipeline;
pub mod review;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use ecc_adapters::{
    adapter_for_competition, locate_match_fragments, AdapterContext, AdapterError, CalendarBook,
    FetchedPage, ResultsAdapter, SourceMode,
};
use ecc_core::{Competition, MatchRecord, PhaseCalendar, PhaseWindow, Season};
use ecc_storage::{HttpClientConfig, HttpFetcher, PageArchive};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub use export::{hand_off_file_name, ParquetManifest, ParquetManifestFile};
pub use pipeline::{
    is_match_in_league_phase, CompetitionOutcome, ExtractionPipeline, ExtractionStats,
    PipelineConfig, PipelineState,
};
pub use review::{TeamNameReview, TeamNameReviewItem};

pub const CRATE_NAME: &str = "ecc-sync";

const BRIEF_MATCHES_PER_COMPETITION: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct CompetitionRegistry {
    pub competitions: Vec<CompetitionSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompetitionSource {
    pub code: Competition,
    pub display_name: String,
    pub enabled: bool,
    pub mode: SourceMode,
    #[serde(default)]
    pub results_url: Option<String>,
    /// Fixture bundle, relative to the workspace root.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CompetitionRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &CompetitionSource> {
        self.competitions.iter().filter(|c| c.enabled)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub output_dir: PathBuf,
    pub params_path: PathBuf,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Clock used for year and phase inference; local date when unset.
    pub today: Option<NaiveDate>,
    /// Per-competition cap applied after ordering.
    pub limit: Option<usize>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("ECC_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("artifacts")),
            output_dir: std::env::var("ECC_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("files")),
            params_path: std::env::var("ECC_PARAMS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("params").join("scraper_params.json")),
            scheduler_enabled: std::env::var("ECC_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: std::env::var("SYNC_CRON").unwrap_or_else(|_| "0 0 6 * * *".to_string()),
            user_agent: std::env::var("ECC_USER_AGENT")
                .unwrap_or_else(|_| "ecc-results-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("ECC_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            today: std::env::var("ECC_TODAY")
                .ok()
                .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok()),
            limit: None,
            workspace_root,
        }
    }

    /// Workspace-local config at `root` with every directory under it.
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let workspace_root = root.into();
        Self {
            artifacts_dir: workspace_root.join("artifacts"),
            output_dir: workspace_root.join("files"),
            params_path: workspace_root.join("params").join("scraper_params.json"),
            scheduler_enabled: false,
            sync_cron: "0 0 6 * * *".to_string(),
            user_agent: "ecc-results-bot/0.1".to_string(),
            http_timeout_secs: 20,
            today: None,
            limit: None,
            workspace_root,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}

/// Flat key/value params file: `SEASON` plus per-competition league-phase bounds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ScraperParams(BTreeMap<String, String>);

impl ScraperParams {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "params file missing; no season and no date filtering");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn season(&self) -> Result<Option<Season>> {
        self.0
            .get("SEASON")
            .map(|raw| raw.parse::<Season>())
            .transpose()
            .context("invalid SEASON in params")
    }

    /// `None` when either bound is missing; malformed or inverted bounds are errors.
    pub fn league_window(&self, competition: Competition) -> Result<Option<PhaseWindow>> {
        let start_key = format!("{}_LEAGUE_PHASE_INITIAL_DATE", competition.code());
        let end_key = format!("{}_LEAGUE_PHASE_END_DATE", competition.code());
        let (Some(start), Some(end)) = (self.0.get(&start_key), self.0.get(&end_key)) else {
            return Ok(None);
        };
        let parse = |key: &str, raw: &str| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("invalid {key}: {raw:?}"))
        };
        let window = PhaseWindow::new(parse(&start_key, start)?, parse(&end_key, end)?);
        if window.start > window.end {
            bail!("{start_key} is after {end_key}");
        }
        Ok(Some(window))
    }
}

#[derive(Debug, Default, Deserialize)]
struct CalendarsFile {
    #[serde(default)]
    calendars: Vec<PhaseCalendar>,
}

/// Built-in calendars plus any overrides from `calendars.yaml`.
pub fn load_calendar_book(workspace_root: &Path) -> Result<CalendarBook> {
    let path = workspace_root.join("calendars.yaml");
    if !path.exists() {
        return Ok(CalendarBook::new());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: CalendarsFile =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(CalendarBook::with_overrides(file.calendars))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionSummary {
    pub competition: Competition,
    pub state: PipelineState,
    pub stats: ExtractionStats,
    pub error: Option<String>,
    pub hand_off_file: Option<String>,
    pub archived_page: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub season: Option<Season>,
    pub today: NaiveDate,
    pub competitions: Vec<CompetitionSummary>,
    pub total_matches: usize,
    pub team_name_reviews: usize,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

struct CompetitionTask {
    run_id: Uuid,
    source: CompetitionSource,
    pipeline: PipelineConfig,
    workspace_root: PathBuf,
    archive: PageArchive,
    http: Arc<HttpFetcher>,
}

struct CompetitionResult {
    outcome: CompetitionOutcome,
    archived_page: Option<String>,
}

pub struct SyncPipeline {
    config: SyncConfig,
    archive: PageArchive,
    http: Arc<HttpFetcher>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let archive = PageArchive::new(config.artifacts_dir.clone());
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        Ok(Self {
            config,
            archive,
            http: Arc::new(http),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let root = &self.config.workspace_root;

        let registry = CompetitionRegistry::load(&root.join("competitions.yaml"))?;
        let params = ScraperParams::load(&self.config.params_path)?;
        let season = params.season()?;
        let calendars = load_calendar_book(root)?;
        let today = self.config.today();
        info!(%run_id, season = ?season, %today, "sync run started");

        let sources: Vec<CompetitionSource> = registry.enabled().cloned().collect();
        let mut slots: Vec<Option<CompetitionResult>> = Vec::with_capacity(sources.len());
        let mut handles = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            slots.push(None);
            let league_window = match params.league_window(source.code) {
                Ok(window) => window,
                Err(err) => {
                    warn!(competition = source.code.code(), error = %err, "invalid league window");
                    slots[index] = Some(CompetitionResult {
                        outcome: CompetitionOutcome::failed(
                            source.code,
                            ExtractionStats::default(),
                            format!("{err:#}"),
                        ),
                        archived_page: None,
                    });
                    continue;
                }
            };
            let task = CompetitionTask {
                run_id,
                source: source.clone(),
                pipeline: PipelineConfig {
                    competition: source.code,
                    season,
                    league_window,
                    today,
                    calendars: calendars.clone(),
                },
                workspace_root: root.clone(),
                archive: self.archive.clone(),
                http: Arc::clone(&self.http),
            };
            let span = info_span!("competition", %run_id, competition = source.code.code());
            let handle = tokio::spawn(run_competition(task).instrument(span));
            handles.push((index, source.code, handle));
        }
        for (index, result) in join_competitions(handles).await {
            slots[index] = Some(result);
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        let mut archived = Vec::with_capacity(slots.len());
        for result in slots.into_iter().flatten() {
            let mut outcome = result.outcome;
            if let Some(limit) = self.config.limit {
                outcome.apply_limit(limit);
            }
            outcomes.push(outcome);
            archived.push(result.archived_page);
        }

        let mut competitions = Vec::with_capacity(outcomes.len());
        for (outcome, archived_page) in outcomes.iter().zip(archived) {
            let hand_off = export::write_hand_off_csv(
                &self.config.output_dir,
                outcome.competition,
                &outcome.records,
            )
            .await?;
            competitions.push(CompetitionSummary {
                competition: outcome.competition,
                state: outcome.state,
                stats: outcome.stats.clone(),
                error: outcome.error.clone(),
                hand_off_file: hand_off.map(|p| p.display().to_string()),
                archived_page,
            });
        }

        let accepted: Vec<MatchRecord> = outcomes
            .iter()
            .flat_map(|o| o.records.iter().cloned())
            .collect();
        let reviews = TeamNameReview::default().review(&accepted);

        let reports_dir = root.join("reports").join(run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;
        let manifest_path = export_parquet_snapshots(&reports_dir, &accepted, &outcomes).await?;

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            season,
            today,
            competitions,
            total_matches: accepted.len(),
            team_name_reviews: reviews.len(),
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        };
        write_reports(&reports_dir, &summary, &outcomes, &reviews).await?;
        info!(%run_id, total_matches = summary.total_matches, "sync run finished");
        Ok(summary)
    }

    pub async fn maybe_build_scheduler(&self) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = self.config.sync_cron.as_str();
        let config = self.config.clone();
        let job = Job::new_async(cron, move |_uuid, _l| {
            let config = config.clone();
            Box::pin(async move {
                let result = match SyncPipeline::new(config) {
                    Ok(pipeline) => pipeline.run_once().await,
                    Err(err) => Err(err),
                };
                match result {
                    Ok(summary) => info!(run_id = %summary.run_id, "scheduled sync finished"),
                    Err(err) => warn!(error = %format!("{err:#}"), "scheduled sync failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}

/// Waits for every competition; a task that panicked or was cancelled
/// becomes a FAILED outcome for its competition only.
async fn join_competitions(
    handles: Vec<(usize, Competition, JoinHandle<CompetitionResult>)>,
) -> Vec<(usize, CompetitionResult)> {
    let mut results = Vec::with_capacity(handles.len());
    for (index, competition, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(err) => {
                warn!(competition = competition.code(), error = %err, "competition task failed");
                CompetitionResult {
                    outcome: CompetitionOutcome::failed(
                        competition,
                        ExtractionStats::default(),
                        format!("competition task failed: {err}"),
                    ),
                    archived_page: None,
                }
            }
        };
        results.push((index, result));
    }
    results
}

fn default_fixture_path(root: &Path, competition: Competition) -> PathBuf {
    root.join("fixtures")
        .join(competition.code().to_lowercase())
        .join("sample")
        .join("bundle.json")
}

fn archive_extension(content_type: &str) -> &'static str {
    match content_type {
        "text/html" => "html",
        "application/json" => "json",
        "text/plain" => "txt",
        _ => "bin",
    }
}

fn archive_bytes(page: &FetchedPage) -> Vec<u8> {
    if page.body.is_empty() {
        page.text_fragments.join("\n").into_bytes()
    } else {
        page.body.clone()
    }
}

async fn run_competition(task: CompetitionTask) -> CompetitionResult {
    let competition = task.source.code;
    let failed = |message: String| {
        warn!(competition = competition.code(), error = %message, "competition failed");
        CompetitionResult {
            outcome: CompetitionOutcome::failed(competition, ExtractionStats::default(), message),
            archived_page: None,
        }
    };

    let fixture = match task.source.mode {
        SourceMode::Fixture => Some(
            task.source
                .fixture
                .as_ref()
                .map(|p| task.workspace_root.join(p))
                .unwrap_or_else(|| default_fixture_path(&task.workspace_root, competition)),
        ),
        SourceMode::Http => None,
    };
    let Some(adapter) = adapter_for_competition(
        competition,
        task.source.mode,
        task.source.results_url.as_deref(),
        fixture.as_deref(),
    ) else {
        return failed(format!("no adapter for {competition}"));
    };

    let ctx = AdapterContext {
        run_id: task.run_id,
        fetched_at: Utc::now(),
    };
    let page = match adapter.fetch_page(&task.http, &ctx).await {
        Ok(page) => page,
        Err(err) => return failed(format!("fetching results page: {err}")),
    };

    let archived_page = match task
        .archive
        .store_page(
            page.fetched_at,
            competition,
            archive_extension(&page.content_type),
            &archive_bytes(&page),
        )
        .await
    {
        Ok(stored) => Some(stored.relative_path.display().to_string()),
        Err(err) => {
            warn!(competition = competition.code(), error = %format!("{err:#}"), "page archival failed");
            None
        }
    };

    let pipeline = task.pipeline;
    let extracted = tokio::task::spawn_blocking(move || {
        let fragments = adapter.locate_fragments(&page)?;
        Ok::<_, AdapterError>(ExtractionPipeline::new(pipeline).run(fragments))
    })
    .await;
    match extracted {
        Ok(Ok(outcome)) => CompetitionResult {
            outcome,
            archived_page,
        },
        Ok(Err(err)) => CompetitionResult {
            archived_page,
            ..failed(format!("locating match fragments: {err}"))
        },
        Err(err) => failed(format!("extraction task failed: {err}")),
    }
}

async fn export_parquet_snapshots(
    reports_dir: &Path,
    accepted: &[MatchRecord],
    outcomes: &[CompetitionOutcome],
) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join("snapshots");
    fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let matches_path = snapshot_dir.join("matches.parquet");
    let stats_path = snapshot_dir.join("competition_stats.parquet");
    export::write_matches_parquet(&matches_path, accepted)?;
    export::write_competition_stats_parquet(&stats_path, outcomes)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![
            export::manifest_entry("matches", reports_dir, &matches_path)?,
            export::manifest_entry("competition_stats", reports_dir, &stats_path)?,
        ],
    };
    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

async fn write_reports(
    reports_dir: &Path,
    summary: &SyncRunSummary,
    outcomes: &[CompetitionOutcome],
    reviews: &[TeamNameReviewItem],
) -> Result<()> {
    let summary_json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(reports_dir.join("run_summary.json"), summary_json)
        .await
        .context("writing run_summary.json")?;

    fs::write(
        reports_dir.join("results_brief.md"),
        render_results_brief(summary, outcomes),
    )
    .await
    .context("writing results_brief.md")?;

    let review_json = serde_json::to_vec_pretty(reviews).context("serializing team name review")?;
    fs::write(reports_dir.join("team_name_review.json"), review_json)
        .await
        .context("writing team_name_review.json")?;
    Ok(())
}

pub fn render_results_brief(summary: &SyncRunSummary, outcomes: &[CompetitionOutcome]) -> String {
    let season = summary
        .season
        .map(|s| s.to_string())
        .unwrap_or_else(|| "derived from match dates".to_string());
    let mut lines = vec![
        "# European Club Competitions Results Brief".to_string(),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Started: {}", summary.started_at),
        format!("- Finished: {}", summary.finished_at),
        format!("- Season: {season}"),
        format!("- Total matches: {}", summary.total_matches),
        String::new(),
    ];
    for outcome in outcomes {
        let stats = &outcome.stats;
        lines.push(format!(
            "## {} {}",
            outcome.competition.code(),
            outcome.competition.display_name()
        ));
        lines.push(format!("- state: {}", outcome.state));
        if let Some(error) = &outcome.error {
            lines.push(format!("- error: {error}"));
        }
        lines.push(format!(
            "- fragments: {}, accepted: {}",
            stats.fragments_seen,
            outcome.records.len()
        ));
        lines.push(format!(
            "- rejected: no score {}, no teams {}, non-club {}, no date {}, outside league phase {}",
            stats.rejected_no_score,
            stats.rejected_no_teams,
            stats.rejected_non_club,
            stats.rejected_no_date,
            stats.rejected_out_of_window
        ));
        if stats.truncated_by_limit > 0 {
            lines.push(format!("- cut by limit: {}", stats.truncated_by_limit));
        }
        for record in outcome.records.iter().take(BRIEF_MATCHES_PER_COMPETITION) {
            lines.push(format!(
                "  - {} {} {}-{} {} ({})",
                record.match_date.format("%Y-%m-%d"),
                record.home_team,
                record.home_goals,
                record.away_goals,
                record.away_team,
                record.phase.as_str()
            ));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Extracts one page of markup with no league window, for ad hoc inspection.
pub fn extract_page_records(
    competition: Competition,
    html: &str,
    season: Option<Season>,
    today: NaiveDate,
    calendars: CalendarBook,
) -> Result<CompetitionOutcome> {
    let fragments = locate_match_fragments(html)
        .with_context(|| format!("locating {competition} match rows"))?;
    let pipeline = ExtractionPipeline::new(PipelineConfig {
        competition,
        season,
        league_window: None,
        today,
        calendars,
    });
    Ok(pipeline.run(fragments))
}

/// One sync over the environment's workspace, capping each competition at `limit`.
pub async fn run_sync_once_from_env(limit: Option<usize>) -> Result<SyncRunSummary> {
    let mut config = SyncConfig::from_env();
    config.limit = limit;
    let pipeline = SyncPipeline::new(config)?;
    pipeline.run_once().await
}

pub fn report_recent_runs(runs: usize, workspace_root: Option<PathBuf>) -> Result<String> {
    let root = workspace_root.unwrap_or_else(|| PathBuf::from("."));
    let reports_root = root.join("reports");
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();
    let dirs = dirs.into_iter().take(runs.max(1)).collect::<Vec<_>>();

    let mut lines = vec!["# Recent Extraction Runs".to_string(), String::new()];
    for dir in dirs {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let summary_path = dir.path().join("run_summary.json");
        let brief_path = dir.path().join("results_brief.md");
        let manifest_path = dir.path().join("snapshots").join("manifest.json");

        let summary: SyncRunSummary = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- finished: {}", summary.finished_at));
        lines.push(format!("- total matches: {}", summary.total_matches));
        for competition in &summary.competitions {
            lines.push(format!(
                "- {}: {} ({} accepted)",
                competition.competition.code(),
                competition.state,
                competition.stats.accepted
            ));
        }
        if summary.team_name_reviews > 0 {
            lines.push(format!("- team names to review: {}", summary.team_name_reviews));
        }
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        if brief_path.exists() {
            lines.push(format!("- results brief: `{}`", brief_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}
