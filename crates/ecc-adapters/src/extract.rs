//! Element extractor: turns one fragment into a match candidate.
//!
//! Every field is recovered by an ordered list of strategies; the first one
//! that yields a usable value wins. Date and explicitly labeled phase carry
//! forward to later fragments through [`CarriedState`].

use chrono::NaiveDate;
use ecc_core::{teams_distinct, Competition, Phase, Season};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dates::{date_with_year, find_day_month, find_full_date, infer_year, parse_date_at};
use crate::fragment::{Fragment, LabelKind};
use crate::patterns::{
    CLOCK_TIME, COLON_SCORE, DATE_CLASS, DATE_PREFIX, LABELED_SCORE, ORDINAL_PREFIX,
    PARTICIPANT_CLASS, PIPE_SCORE, ROUND_CLASS, SCORE_CLASS, SCORE_SHAPED, SEGMENT_DATE,
};
use crate::phases::{normalize_phase, CalendarBook};
use crate::teams::is_club;

const MIN_TEAM_CHARS: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub competition: Competition,
    /// Explicit season; otherwise derived from each match date.
    pub season: Option<Season>,
    pub today: NaiveDate,
    pub calendars: &'a CalendarBook,
}

/// Values inherited by fragments that do not carry their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarriedState {
    pub last_date: Option<NaiveDate>,
    pub last_labeled_phase: Option<Phase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    Fragment,
    Carried,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub position: usize,
    pub competition: Competition,
    pub season: Option<Season>,
    pub phase: Phase,
    pub match_date: Option<NaiveDate>,
    pub date_source: DateSource,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u32,
    pub away_goals: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    Extracted(MatchCandidate),
    NoTeams,
    NoScore,
    NotClub { home_team: String, away_team: String },
}

struct FragmentView<'a> {
    fragment: &'a Fragment,
    flattened: String,
    parts: Vec<String>,
    today: NaiveDate,
}

impl<'a> FragmentView<'a> {
    fn new(fragment: &'a Fragment, today: NaiveDate) -> Self {
        let flattened = fragment.flattened_text();
        let parts = flattened
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect();
        Self {
            fragment,
            flattened,
            parts,
            today,
        }
    }
}

type Strategy<T> = fn(&FragmentView<'_>) -> Option<T>;

const TEAM_STRATEGIES: &[Strategy<(String, String)>] = &[
    teams_from_participants,
    teams_from_delimited_text,
    teams_from_text_nodes,
];

const SCORE_STRATEGIES: &[Strategy<(u32, u32)>] = &[
    score_from_colon,
    score_from_adjacent_numbers,
    score_from_pipe,
    score_from_labeled_elements,
];

const DATE_STRATEGIES: &[Strategy<NaiveDate>] = &[
    date_from_segments,
    date_from_labeled_elements,
    date_from_full_pattern,
    date_from_day_month,
];

fn first_success<T>(strategies: &[Strategy<T>], view: &FragmentView<'_>) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(view))
}

/// Extracts one fragment, updating `carried` with any date or labeled phase found.
pub fn extract_fragment(
    fragment: &Fragment,
    ctx: &ExtractionContext<'_>,
    carried: &mut CarriedState,
) -> FragmentOutcome {
    let view = FragmentView::new(fragment, ctx.today);

    let Some((home_team, away_team)) = resolve_teams(&view) else {
        debug!(position = fragment.position, excerpt = %fragment.excerpt(), "no teams in fragment");
        return FragmentOutcome::NoTeams;
    };

    let Some((home_goals, away_goals)) = first_success(SCORE_STRATEGIES, &view) else {
        debug!(position = fragment.position, excerpt = %fragment.excerpt(), "no score in fragment");
        return FragmentOutcome::NoScore;
    };

    let (match_date, date_source) = match first_success(DATE_STRATEGIES, &view) {
        Some(date) => {
            carried.last_date = Some(date);
            (Some(date), DateSource::Fragment)
        }
        None => match carried.last_date {
            Some(date) => (Some(date), DateSource::Carried),
            None => (None, DateSource::Missing),
        },
    };

    let phase = match labeled_phase(fragment) {
        Some(phase) => {
            carried.last_labeled_phase = Some(phase.clone());
            phase
        }
        None => match (&carried.last_labeled_phase, match_date) {
            (Some(phase), _) => phase.clone(),
            (None, Some(date)) => ctx.calendars.infer_phase(ctx.competition, date, ctx.season),
            (None, None) => Phase::Unknown,
        },
    };

    if !is_club(&home_team) || !is_club(&away_team) {
        debug!(%home_team, %away_team, "skipping non-club fixture");
        return FragmentOutcome::NotClub {
            home_team,
            away_team,
        };
    }

    let season = ctx.season.or_else(|| match_date.map(Season::containing));
    FragmentOutcome::Extracted(MatchCandidate {
        position: fragment.position,
        competition: ctx.competition,
        season,
        phase,
        match_date,
        date_source,
        home_team,
        away_team,
        home_goals,
        away_goals,
    })
}

fn resolve_teams(view: &FragmentView<'_>) -> Option<(String, String)> {
    let (home, away) = first_success(TEAM_STRATEGIES, view)?;
    let (mut home, mut away) = (clean_team_name(&home), clean_team_name(&away));
    if !teams_distinct(&home, &away) {
        (home, away) = pick_pair(delimited_candidates(view).map(|c| clean_team_name(&c)))?;
    }
    let long_enough = |name: &str| name.chars().count() >= MIN_TEAM_CHARS;
    (long_enough(&home) && long_enough(&away)).then_some((home, away))
}

pub fn clean_team_name(raw: &str) -> String {
    let stripped = ORDINAL_PREFIX.replace(raw.trim(), "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_non_team_token(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_digit())
        || DATE_PREFIX.is_match(text)
        || SCORE_SHAPED.is_match(text)
}

/// First candidate plus the next one that names a different team.
fn pick_pair(mut candidates: impl Iterator<Item = String>) -> Option<(String, String)> {
    let home = candidates.next()?;
    let away = candidates.find(|candidate| teams_distinct(&home, candidate))?;
    Some((home, away))
}

fn teams_from_participants(view: &FragmentView<'_>) -> Option<(String, String)> {
    let names = view
        .fragment
        .root
        .find_by_class(&["span", "div", "a"], &PARTICIPANT_CLASS)
        .into_iter()
        .map(|el| el.text().trim().to_string())
        .filter(|name| !name.is_empty());
    pick_pair(names)
}

fn delimited_candidates<'v>(view: &'v FragmentView<'_>) -> impl Iterator<Item = String> + 'v {
    view.parts
        .iter()
        .filter(|part| part.chars().count() > 2 && !is_non_team_token(part))
        .cloned()
}

fn teams_from_delimited_text(view: &FragmentView<'_>) -> Option<(String, String)> {
    pick_pair(delimited_candidates(view))
}

fn teams_from_text_nodes(view: &FragmentView<'_>) -> Option<(String, String)> {
    let root = &view.fragment.root;
    let texts = std::iter::once(root)
        .chain(root.descendants())
        .map(|el| el.own_text())
        .filter(|text| text.chars().count() > 3 && !is_non_team_token(text));
    pick_pair(texts)
}

fn parse_goals(home: &str, away: &str) -> Option<(u32, u32)> {
    Some((home.parse().ok()?, away.parse().ok()?))
}

fn score_from_colon(view: &FragmentView<'_>) -> Option<(u32, u32)> {
    view.parts
        .iter()
        .filter(|part| !SEGMENT_DATE.is_match(part) && !CLOCK_TIME.is_match(part))
        .find_map(|part| {
            let caps = COLON_SCORE.captures(part)?;
            parse_goals(&caps[1], &caps[2])
        })
}

fn score_from_adjacent_numbers(view: &FragmentView<'_>) -> Option<(u32, u32)> {
    let is_number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    view.parts
        .windows(2)
        .find(|pair| is_number(&pair[0]) && is_number(&pair[1]))
        .and_then(|pair| parse_goals(&pair[0], &pair[1]))
}

fn score_from_pipe(view: &FragmentView<'_>) -> Option<(u32, u32)> {
    let without_dates = view
        .parts
        .iter()
        .filter(|part| !SEGMENT_DATE.is_match(part))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" | ");
    let caps = PIPE_SCORE.captures(&without_dates)?;
    parse_goals(&caps[1], &caps[2])
}

fn score_from_labeled_elements(view: &FragmentView<'_>) -> Option<(u32, u32)> {
    let texts: Vec<String> = view
        .fragment
        .root
        .find_by_class(&["span", "div"], &SCORE_CLASS)
        .into_iter()
        .map(|el| el.text().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    let combined = texts.iter().find_map(|text| {
        let caps = LABELED_SCORE.captures(text)?;
        parse_goals(&caps[1], &caps[2])
    });
    if combined.is_some() {
        return combined;
    }

    // home and away goals in separate score elements
    let mut digits = texts
        .iter()
        .filter(|text| text.chars().all(|c| c.is_ascii_digit()));
    let home = digits.next()?;
    let away = digits.next()?;
    parse_goals(home, away)
}

fn date_from_segments(view: &FragmentView<'_>) -> Option<NaiveDate> {
    view.parts.iter().find_map(|part| {
        let caps = SEGMENT_DATE.captures(part)?;
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        match caps.get(3) {
            Some(year) => date_with_year(day, month, year.as_str()),
            None => infer_year(day, month, view.today),
        }
    })
}

fn date_from_labeled_elements(view: &FragmentView<'_>) -> Option<NaiveDate> {
    let fragment = view.fragment;
    let own = fragment
        .root
        .find_by_class(&["span", "div"], &DATE_CLASS)
        .into_iter()
        .map(|el| el.text())
        .find(|text| !text.trim().is_empty());
    match own {
        Some(text) => parse_date_at(&text, view.today),
        None => parse_date_at(fragment.parent_label(LabelKind::Date)?, view.today),
    }
}

fn date_from_full_pattern(view: &FragmentView<'_>) -> Option<NaiveDate> {
    find_full_date(&view.flattened)
}

fn date_from_day_month(view: &FragmentView<'_>) -> Option<NaiveDate> {
    find_day_month(&view.flattened, view.today)
}

/// Phase from a round/stage label in the fragment, else in its container.
fn labeled_phase(fragment: &Fragment) -> Option<Phase> {
    let own = fragment
        .root
        .find_by_class(&["span", "div"], &ROUND_CLASS)
        .into_iter()
        .map(|el| el.text())
        .find(|text| !text.trim().is_empty());
    let label = match own {
        Some(text) => text,
        None => fragment.parent_label(LabelKind::Round)?.to_string(),
    };
    Some(normalize_phase(&label)).filter(|phase| !phase.is_unknown())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentElement;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ctx(book: &CalendarBook, today: NaiveDate) -> ExtractionContext<'_> {
        ExtractionContext {
            competition: Competition::Ucl,
            season: Some(Season::starting(2024)),
            today,
            calendars: book,
        }
    }

    fn extracted(outcome: FragmentOutcome) -> MatchCandidate {
        match outcome {
            FragmentOutcome::Extracted(candidate) => candidate,
            other => panic!("expected a candidate, got {other:?}"),
        }
    }

    fn flashscore_row(home: &str, away: &str, home_goals: &str, away_goals: &str, time: &str) -> Fragment {
        let root = FragmentElement::new("div", &["event__match", "event__match--static"])
            .with_child(FragmentElement::new("div", &["event__time"]).with_text(time))
            .with_child(
                FragmentElement::new("div", &["event__participant", "event__participant--home"])
                    .with_text(home),
            )
            .with_child(
                FragmentElement::new("div", &["event__participant", "event__participant--away"])
                    .with_text(away),
            )
            .with_child(FragmentElement::new("span", &["event__score", "event__score--home"]).with_text(home_goals))
            .with_child(FragmentElement::new("span", &["event__score", "event__score--away"]).with_text(away_goals));
        Fragment::from_tree(0, root)
    }

    #[test]
    fn extracts_flattened_text_row() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let fragment = Fragment::from_text(0, "Ath Bilbao | PSG | 0 | 0 | 10.12");
        let candidate = extracted(extract_fragment(&fragment, &ctx(&book, d(2024, 12, 15)), &mut carried));

        assert_eq!(candidate.home_team, "Ath Bilbao");
        assert_eq!(candidate.away_team, "PSG");
        assert_eq!((candidate.home_goals, candidate.away_goals), (0, 0));
        assert_eq!(candidate.match_date, Some(d(2024, 12, 10)));
        assert_eq!(candidate.date_source, DateSource::Fragment);
        assert_eq!(candidate.phase, Phase::LeaguePhase);
        assert_eq!(candidate.season, Some(Season::starting(2024)));
        assert_eq!(carried.last_date, Some(d(2024, 12, 10)));
        assert_eq!(carried.last_labeled_phase, None);
    }

    #[test]
    fn extracts_structured_row_with_split_score_elements() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let fragment = flashscore_row("Bayern Munich", "Real Madrid", "2", "1", "10.12. 21:00");
        let candidate = extracted(extract_fragment(&fragment, &ctx(&book, d(2024, 12, 15)), &mut carried));

        assert_eq!(candidate.home_team, "Bayern Munich");
        assert_eq!(candidate.away_team, "Real Madrid");
        assert_eq!((candidate.home_goals, candidate.away_goals), (2, 1));
        assert_eq!(candidate.match_date, Some(d(2024, 12, 10)));
    }

    #[test]
    fn colon_score_wins_over_adjacent_numbers() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let fragment = Fragment::from_text(0, "Celtic | Young Boys | 1 : 2 | 3 | 4 | 22.01.2025");
        let candidate = extracted(extract_fragment(&fragment, &ctx(&book, d(2025, 3, 1)), &mut carried));
        assert_eq!((candidate.home_goals, candidate.away_goals), (1, 2));
        assert_eq!(candidate.match_date, Some(d(2025, 1, 22)));
    }

    #[test]
    fn reports_missing_teams_and_scores() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let context = ctx(&book, d(2024, 12, 15));

        let no_teams = Fragment::from_text(0, "0 | 0 | 10.12");
        assert_eq!(extract_fragment(&no_teams, &context, &mut carried), FragmentOutcome::NoTeams);

        let no_score = Fragment::from_text(1, "Ath Bilbao | PSG | 10.12");
        assert_eq!(extract_fragment(&no_score, &context, &mut carried), FragmentOutcome::NoScore);

        let same_team = Fragment::from_text(2, "PSG | PSG | 1 | 0");
        assert_eq!(extract_fragment(&same_team, &context, &mut carried), FragmentOutcome::NoTeams);
        assert_eq!(carried, CarriedState::default());
    }

    #[test]
    fn national_teams_are_rejected() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let fragment = Fragment::from_text(0, "England | Croatia | 1 | 0 | 10.12");
        let outcome = extract_fragment(&fragment, &ctx(&book, d(2024, 12, 15)), &mut carried);
        assert_eq!(
            outcome,
            FragmentOutcome::NotClub {
                home_team: "England".to_string(),
                away_team: "Croatia".to_string(),
            }
        );
        assert_eq!(carried.last_date, Some(d(2024, 12, 10)));
    }

    #[test]
    fn date_carries_forward_to_undated_fragments() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let context = ctx(&book, d(2024, 12, 15));

        let dated = Fragment::from_text(0, "Ath Bilbao | PSG | 0 | 0 | 10.12");
        extracted(extract_fragment(&dated, &context, &mut carried));

        let undated = Fragment::from_text(1, "Celtic | Young Boys | 1 | 0");
        let candidate = extracted(extract_fragment(&undated, &context, &mut carried));
        assert_eq!(candidate.match_date, Some(d(2024, 12, 10)));
        assert_eq!(candidate.date_source, DateSource::Carried);
    }

    #[test]
    fn undated_fragment_without_carry_has_no_date() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let fragment = Fragment::from_text(0, "Celtic | Young Boys | 1 | 0");
        let candidate = extracted(extract_fragment(&fragment, &ctx(&book, d(2024, 12, 15)), &mut carried));
        assert_eq!(candidate.match_date, None);
        assert_eq!(candidate.date_source, DateSource::Missing);
        assert_eq!(candidate.phase, Phase::Unknown);
    }

    #[test]
    fn labeled_phase_carries_forward_and_beats_inference() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let context = ctx(&book, d(2025, 3, 20));

        let root = FragmentElement::new("div", &["event__match"])
            .with_child(FragmentElement::new("div", &["event__round"]).with_text("Knockout phase - Play Offs"))
            .with_child(FragmentElement::new("div", &["event__participant"]).with_text("Club Brugge"))
            .with_child(FragmentElement::new("div", &["event__participant"]).with_text("Atalanta"))
            .with_child(FragmentElement::new("span", &["event__score"]).with_text("2 - 1"))
            .with_child(FragmentElement::new("div", &["event__time"]).with_text("12.02."));
        let labeled = Fragment::from_tree(0, root);
        let first = extracted(extract_fragment(&labeled, &context, &mut carried));
        assert_eq!(first.phase, Phase::KnockoutPhase);
        assert_eq!((first.home_goals, first.away_goals), (2, 1));

        // 11.03 falls in the round-of-16 window but the carried label wins
        let next = Fragment::from_text(1, "Celtic | Bayern Munich | 1 | 2 | 11.03");
        let second = extracted(extract_fragment(&next, &context, &mut carried));
        assert_eq!(second.phase, Phase::KnockoutPhase);
        assert_eq!(carried.last_labeled_phase, Some(Phase::KnockoutPhase));
    }

    #[test]
    fn ordinal_prefixes_are_stripped_from_team_names() {
        assert_eq!(clean_team_name("1. Celtic"), "Celtic");
        assert_eq!(clean_team_name("  Real   Madrid "), "Real Madrid");
    }

    #[test]
    fn season_is_derived_from_date_without_explicit_season() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let context = ExtractionContext {
            competition: Competition::Uel,
            season: None,
            today: d(2025, 3, 1),
            calendars: &book,
        };
        let fragment = Fragment::from_text(0, "Roma | Porto | 3 | 2 | 20.02.2025");
        let candidate = extracted(extract_fragment(&fragment, &context, &mut carried));
        assert_eq!(candidate.season, Some(Season::starting(2024)));
        assert_eq!(candidate.phase, Phase::KnockoutPhase);
    }

    #[test]
    fn two_digit_segment_year_is_kept_not_inferred() {
        let book = CalendarBook::new();
        let mut carried = CarriedState::default();
        let context = ExtractionContext {
            competition: Competition::Ucl,
            season: None,
            today: d(2025, 6, 15),
            calendars: &book,
        };
        let fragment = Fragment::from_text(0, "Celtic | Young Boys | 1 | 0 | 10.12.23");
        let candidate = extracted(extract_fragment(&fragment, &context, &mut carried));
        assert_eq!(candidate.match_date, Some(d(2023, 12, 10)));
        assert_eq!(candidate.match_date, parse_date_at("10.12.23", context.today));
        assert_eq!(candidate.season, Some(Season::starting(2023)));
        assert_eq!((candidate.home_goals, candidate.away_goals), (1, 0));
    }
}
