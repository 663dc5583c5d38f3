//! Per-competition extraction state machine.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use ecc_adapters::{
    extract_fragment, is_club, CalendarBook, CarriedState, ExtractionContext, Fragment,
    FragmentOutcome, MatchCandidate,
};
use ecc_core::{
    is_placeholder_date, teams_distinct, Competition, MatchRecord, PhaseWindow, Season,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Init,
    LoadingElements,
    Extracting,
    Filtering,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Init => "INIT",
            PipelineState::LoadingElements => "LOADING_ELEMENTS",
            PipelineState::Extracting => "EXTRACTING",
            PipelineState::Filtering => "FILTERING",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Data-quality counters reported per competition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub fragments_seen: usize,
    pub candidates_extracted: usize,
    pub rejected_no_score: usize,
    pub rejected_no_teams: usize,
    pub rejected_non_club: usize,
    pub rejected_no_date: usize,
    pub rejected_out_of_window: usize,
    pub duplicates_collapsed: usize,
    /// Ordered records dropped by a per-competition limit.
    #[serde(default)]
    pub truncated_by_limit: usize,
    pub accepted: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub competition: Competition,
    pub season: Option<Season>,
    /// Inclusive league-phase window; `None` disables date filtering.
    pub league_window: Option<PhaseWindow>,
    pub today: NaiveDate,
    pub calendars: CalendarBook,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetitionOutcome {
    pub competition: Competition,
    pub state: PipelineState,
    pub stats: ExtractionStats,
    pub records: Vec<MatchRecord>,
    pub error: Option<String>,
}

impl CompetitionOutcome {
    pub fn failed(competition: Competition, stats: ExtractionStats, error: impl Into<String>) -> Self {
        Self {
            competition,
            state: PipelineState::Failed,
            stats,
            records: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Keeps the first `limit` records and keeps `accepted` equal to what is handed off.
    pub fn apply_limit(&mut self, limit: usize) {
        let before = self.records.len();
        self.records.truncate(limit);
        self.stats.truncated_by_limit += before - self.records.len();
        self.stats.accepted = self.records.len();
    }
}

/// Public entry point for one league-phase check, mirroring the filter step.
pub fn is_match_in_league_phase(date: NaiveDate, window: Option<&PhaseWindow>) -> bool {
    if is_placeholder_date(date) {
        return false;
    }
    window.map_or(true, |w| w.contains(date))
}

pub struct ExtractionPipeline {
    config: PipelineConfig,
    state: PipelineState,
    stats: ExtractionStats,
}

impl ExtractionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: PipelineState::Init,
            stats: ExtractionStats::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(
            competition = self.config.competition.code(),
            from = %self.state,
            to = %next,
            "pipeline transition"
        );
        self.state = next;
    }

    /// Runs the whole fragment sequence; the carried date/phase state lives
    /// only for the duration of this call.
    pub fn run(mut self, fragments: Vec<Fragment>) -> CompetitionOutcome {
        self.transition(PipelineState::LoadingElements);
        self.stats.fragments_seen = fragments.len();
        if self.config.league_window.is_none() {
            warn!(
                competition = self.config.competition.code(),
                "no league phase window configured; including all dated matches"
            );
        }

        self.transition(PipelineState::Extracting);
        let candidates = self.extract_all(&fragments);

        self.transition(PipelineState::Filtering);
        let records = self.filter(candidates);
        let records = self.deduplicate(records);
        let records = order_by_date_desc(records);
        self.stats.accepted = records.len();

        self.transition(PipelineState::Done);
        let competition = self.config.competition;
        if records.is_empty() {
            warn!(competition = competition.code(), stats = ?self.stats, "no matches accepted");
        } else {
            info!(competition = competition.code(), accepted = records.len(), "competition extracted");
        }
        CompetitionOutcome {
            competition,
            state: self.state,
            stats: self.stats,
            records,
            error: None,
        }
    }

    fn extract_all(&mut self, fragments: &[Fragment]) -> Vec<MatchCandidate> {
        let ctx = ExtractionContext {
            competition: self.config.competition,
            season: self.config.season,
            today: self.config.today,
            calendars: &self.config.calendars,
        };
        let mut carried = CarriedState::default();
        let mut candidates = Vec::new();
        for fragment in fragments {
            match extract_fragment(fragment, &ctx, &mut carried) {
                FragmentOutcome::Extracted(candidate) => {
                    self.stats.candidates_extracted += 1;
                    candidates.push(candidate);
                }
                FragmentOutcome::NoTeams => self.stats.rejected_no_teams += 1,
                FragmentOutcome::NoScore => self.stats.rejected_no_score += 1,
                FragmentOutcome::NotClub { .. } => self.stats.rejected_non_club += 1,
            }
        }
        candidates
    }

    fn filter(&mut self, candidates: Vec<MatchCandidate>) -> Vec<MatchRecord> {
        let mut records = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(date) = candidate.match_date.filter(|d| !is_placeholder_date(*d)) else {
                self.stats.rejected_no_date += 1;
                continue;
            };
            if !is_match_in_league_phase(date, self.config.league_window.as_ref()) {
                debug!(%date, home = %candidate.home_team, away = %candidate.away_team, "outside league phase window");
                self.stats.rejected_out_of_window += 1;
                continue;
            }
            if !is_club(&candidate.home_team)
                || !is_club(&candidate.away_team)
                || !teams_distinct(&candidate.home_team, &candidate.away_team)
            {
                self.stats.rejected_non_club += 1;
                continue;
            }
            let season = candidate
                .season
                .or(self.config.season)
                .unwrap_or_else(|| Season::containing(date));
            records.push(MatchRecord::new(
                candidate.competition,
                season,
                candidate.phase,
                date,
                candidate.home_team,
                candidate.away_team,
                candidate.home_goals,
                candidate.away_goals,
            ));
        }
        records
    }

    /// Identical ids collapse to the last-seen record, kept at the first position.
    fn deduplicate(&mut self, records: Vec<MatchRecord>) -> Vec<MatchRecord> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut out: Vec<MatchRecord> = Vec::with_capacity(records.len());
        for record in records {
            match index.get(&record.match_id).copied() {
                Some(pos) => {
                    self.stats.duplicates_collapsed += 1;
                    out[pos] = record;
                }
                None => {
                    index.insert(record.match_id.clone(), out.len());
                    out.push(record);
                }
            }
        }
        out
    }
}

/// Newest first; equal dates keep extraction order.
pub fn order_by_date_desc(mut records: Vec<MatchRecord>) -> Vec<MatchRecord> {
    records.sort_by(|a, b| b.match_date.cmp(&a.match_date));
    records
}
