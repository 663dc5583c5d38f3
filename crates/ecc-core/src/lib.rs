//! Core domain model and match identity for the European club cups loader.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const CRATE_NAME: &str = "ecc-core";

/// Column order of the flat hand-off file consumed by the warehouse loader.
pub const CSV_HEADER: [&str; 9] = [
    "MATCH_ID",
    "COMPETITION",
    "SEASON",
    "PHASE",
    "MATCH_DATE",
    "HOME_TEAM",
    "AWAY_TEAM",
    "HOME_GOALS",
    "AWAY_GOALS",
];

const MATCH_HASH_WIDTH: usize = 8;
const PHASE_TOKEN_WIDTH: usize = 20;
const PHASE_LABEL_WIDTH: usize = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown competition code: {0}")]
    UnknownCompetition(String),
    #[error("malformed season {0:?}, expected YYYY/YYYY with consecutive years")]
    MalformedSeason(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Competition {
    #[serde(rename = "UCL")]
    Ucl,
    #[serde(rename = "UEL")]
    Uel,
    #[serde(rename = "UECL")]
    Uecl,
}

impl Competition {
    pub const ALL: [Competition; 3] = [Competition::Ucl, Competition::Uel, Competition::Uecl];

    pub fn code(self) -> &'static str {
        match self {
            Competition::Ucl => "UCL",
            Competition::Uel => "UEL",
            Competition::Uecl => "UECL",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Competition::Ucl => "Champions League",
            Competition::Uel => "Europa League",
            Competition::Uecl => "Conference League",
        }
    }
}

impl fmt::Display for Competition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Competition {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UCL" => Ok(Competition::Ucl),
            "UEL" => Ok(Competition::Uel),
            "UECL" => Ok(Competition::Uecl),
            _ => Err(CoreError::UnknownCompetition(s.to_string())),
        }
    }
}

/// A football season spanning two calendar years, rendered `YYYY/YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Season {
    start_year: i32,
}

impl Season {
    pub fn starting(start_year: i32) -> Self {
        Self { start_year }
    }

    /// July or later belongs to the season starting that year.
    pub fn containing(date: NaiveDate) -> Self {
        if date.month() >= 7 {
            Self::starting(date.year())
        } else {
            Self::starting(date.year() - 1)
        }
    }

    pub fn start_year(self) -> i32 {
        self.start_year
    }

    pub fn end_year(self) -> i32 {
        self.start_year + 1
    }

    /// Season token used inside match ids (`2024_2025`).
    pub fn id_token(self) -> String {
        format!("{}_{}", self.start_year, self.end_year())
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start_year, self.end_year())
    }
}

impl FromStr for Season {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CoreError::MalformedSeason(s.to_string());
        let (first, second) = s.trim().split_once('/').ok_or_else(malformed)?;
        if first.len() != 4 || second.len() != 4 {
            return Err(malformed());
        }
        let first: i32 = first.parse().map_err(|_| malformed())?;
        let second: i32 = second.parse().map_err(|_| malformed())?;
        if second != first + 1 {
            return Err(malformed());
        }
        Ok(Self::starting(first))
    }
}

impl TryFrom<String> for Season {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Season> for String {
    fn from(value: Season) -> Self {
        value.to_string()
    }
}

/// Canonical competition phase. Unrecognised round labels survive as a
/// slug in [`Phase::Other`] instead of failing the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Phase {
    LeaguePhase,
    KnockoutPhase,
    RoundOf16,
    QuarterFinal,
    SemiFinal,
    Final,
    PlayOff,
    Qualifying,
    Preliminary,
    Unknown,
    Other(String),
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::LeaguePhase => "LEAGUE_PHASE",
            Phase::KnockoutPhase => "KNOCKOUT_PHASE",
            Phase::RoundOf16 => "ROUND_OF_16",
            Phase::QuarterFinal => "QUARTER_FINAL",
            Phase::SemiFinal => "SEMI_FINAL",
            Phase::Final => "FINAL",
            Phase::PlayOff => "PLAY_OFF",
            Phase::Qualifying => "QUALIFYING",
            Phase::Preliminary => "PRELIMINARY",
            Phase::Unknown => "UNKNOWN",
            Phase::Other(label) => label,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Phase::Unknown)
    }

    /// Parses a canonical phase code; anything else becomes a bounded slug.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "LEAGUE_PHASE" => Phase::LeaguePhase,
            "KNOCKOUT_PHASE" => Phase::KnockoutPhase,
            "ROUND_OF_16" => Phase::RoundOf16,
            "QUARTER_FINAL" => Phase::QuarterFinal,
            "SEMI_FINAL" => Phase::SemiFinal,
            "FINAL" => Phase::Final,
            "PLAY_OFF" => Phase::PlayOff,
            "QUALIFYING" => Phase::Qualifying,
            "PRELIMINARY" => Phase::Preliminary,
            "" | "UNKNOWN" => Phase::Unknown,
            other => Phase::Other(slug_upper(other, PHASE_LABEL_WIDTH)),
        }
    }

    /// Fallback label for free text that matched no known synonym.
    pub fn other_from_text(text: &str) -> Self {
        let slug = slug_upper(text.trim(), PHASE_LABEL_WIDTH);
        if slug.trim_matches('_').is_empty() {
            Phase::Unknown
        } else {
            Phase::Other(slug)
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Phase {
    fn from(value: String) -> Self {
        Phase::from_code(&value)
    }
}

impl From<Phase> for String {
    fn from(value: Phase) -> Self {
        value.as_str().to_string()
    }
}

/// Uppercases and replaces everything outside `[A-Z0-9_]` with `_`, capped at `max_chars`.
pub fn slug_upper(input: &str, max_chars: usize) -> String {
    input
        .to_uppercase()
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(max_chars)
        .collect()
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PhaseWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Per competition-and-season phase calendar used for phase inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCalendar {
    pub competition: Competition,
    pub season_start_year: i32,
    pub league_phase: PhaseWindow,
    pub knockout_phase: PhaseWindow,
    pub round_of_16: PhaseWindow,
    pub quarter_final: PhaseWindow,
    pub semi_final: PhaseWindow,
    pub final_date: NaiveDate,
}

impl PhaseCalendar {
    /// Built-in UEFA calendar for the season starting in `season_start_year`.
    pub fn builtin(competition: Competition, season_start_year: i32) -> Option<Self> {
        let y = season_start_year;
        let n = y + 1;
        let window = |sy: i32, sm: u32, sd: u32, ey: i32, em: u32, ed: u32| {
            Some(PhaseWindow::new(
                NaiveDate::from_ymd_opt(sy, sm, sd)?,
                NaiveDate::from_ymd_opt(ey, em, ed)?,
            ))
        };
        let league_phase = window(y, 9, 16, n, 1, 28)?;
        let calendar = match competition {
            Competition::Ucl => Self {
                competition,
                season_start_year,
                league_phase,
                knockout_phase: window(n, 2, 17, n, 2, 25)?,
                round_of_16: window(n, 3, 10, n, 3, 18)?,
                quarter_final: window(n, 4, 7, n, 4, 15)?,
                semi_final: window(n, 4, 28, n, 5, 6)?,
                final_date: NaiveDate::from_ymd_opt(n, 5, 30)?,
            },
            Competition::Uel | Competition::Uecl => Self {
                competition,
                season_start_year,
                league_phase,
                knockout_phase: window(n, 2, 19, n, 2, 25)?,
                round_of_16: window(n, 3, 12, n, 3, 19)?,
                quarter_final: window(n, 4, 9, n, 4, 16)?,
                semi_final: window(n, 4, 30, n, 5, 7)?,
                final_date: if competition == Competition::Uel {
                    NaiveDate::from_ymd_opt(n, 5, 20)?
                } else {
                    NaiveDate::from_ymd_opt(n, 5, 27)?
                },
            },
        };
        Some(calendar)
    }

    /// The final wins on its exact date; otherwise windows are tried in
    /// league, knockout, round of 16, quarter-final, semi-final order.
    pub fn phase_for(&self, date: NaiveDate) -> Phase {
        if date == self.final_date {
            return Phase::Final;
        }
        let ordered = [
            (&self.league_phase, Phase::LeaguePhase),
            (&self.knockout_phase, Phase::KnockoutPhase),
            (&self.round_of_16, Phase::RoundOf16),
            (&self.quarter_final, Phase::QuarterFinal),
            (&self.semi_final, Phase::SemiFinal),
        ];
        ordered
            .into_iter()
            .find(|(window, _)| window.contains(date))
            .map(|(_, phase)| phase)
            .unwrap_or(Phase::Unknown)
    }
}

/// Placeholder some scrapers historically wrote for "no date". Never a real match date here.
pub fn placeholder_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

pub fn is_placeholder_date(date: NaiveDate) -> bool {
    date == placeholder_date()
}

/// Case- and whitespace-insensitive team key.
pub fn normalize_team_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn teams_distinct(home: &str, away: &str) -> bool {
    normalize_team_key(home) != normalize_team_key(away)
}

/// Deterministic composite id: `{competition}_{season}_{phase}_{hash}`.
///
/// The hash covers the pipe-joined canonical fields, so home/away order matters.
pub fn generate_match_id(
    competition: Competition,
    season: Season,
    phase: &Phase,
    home_team: &str,
    away_team: &str,
    match_date: NaiveDate,
) -> String {
    let canonical = format!(
        "{}|{}|{}|{}|{}|{}",
        competition.code(),
        season,
        phase.as_str(),
        home_team,
        away_team,
        match_date.format("%Y-%m-%d")
    );
    let digest = Sha256::digest(canonical.as_bytes());
    let hash = hex::encode_upper(digest);
    format!(
        "{}_{}_{}_{}",
        competition.code(),
        season.id_token(),
        slug_upper(phase.as_str(), PHASE_TOKEN_WIDTH),
        &hash[..MATCH_HASH_WIDTH]
    )
}

/// Canonical, validated match row handed to persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub competition: Competition,
    pub season: Season,
    pub phase: Phase,
    pub match_date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u32,
    pub away_goals: u32,
}

impl MatchRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        competition: Competition,
        season: Season,
        phase: Phase,
        match_date: NaiveDate,
        home_team: impl Into<String>,
        away_team: impl Into<String>,
        home_goals: u32,
        away_goals: u32,
    ) -> Self {
        let home_team = home_team.into();
        let away_team = away_team.into();
        let match_id = generate_match_id(
            competition,
            season,
            &phase,
            &home_team,
            &away_team,
            match_date,
        );
        Self {
            match_id,
            competition,
            season,
            phase,
            match_date,
            home_team,
            away_team,
            home_goals,
            away_goals,
        }
    }

    pub fn csv_fields(&self) -> [String; 9] {
        [
            self.match_id.clone(),
            self.competition.code().to_string(),
            self.season.to_string(),
            self.phase.as_str().to_string(),
            self.match_date.format("%Y-%m-%d").to_string(),
            self.home_team.clone(),
            self.away_team.clone(),
            self.home_goals.to_string(),
            self.away_goals.to_string(),
        ]
    }
}

#[derive(Debug, Error)]
pub enum CsvRenderError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("finishing csv buffer: {0}")]
    Buffer(String),
}

/// Header plus one line per record; fields are quoted only when they need it.
pub fn render_matches_csv(records: &[MatchRecord]) -> Result<String, CsvRenderError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.write_record(record.csv_fields())?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CsvRenderError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CsvRenderError::Buffer(e.to_string()))
}
