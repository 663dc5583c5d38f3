//! Club-versus-national-team heuristic.

const NATIONAL_TEAM_MARKERS: &[&str] = &["national team", "national squad", "country team"];

const COUNTRY_NAMES: &[&str] = &[
    "england", "spain", "france", "germany", "italy", "portugal", "netherlands", "belgium",
    "poland", "greece", "turkey", "russia", "ukraine", "sweden", "norway", "denmark", "croatia",
    "serbia", "romania", "bulgaria", "hungary", "czech", "slovakia", "switzerland", "austria",
    "scotland", "wales", "ireland", "finland", "iceland",
];

const CLUB_TOKENS: &[&str] = &[
    "fc", "cf", "ac", "as", "sc", "united", "city", "real", "bayern", "barcelona", "madrid",
    "chelsea", "arsenal", "liverpool", "manchester", "club", "athletic", "sporting", "olympique",
    "paris", "milan", "inter",
];

const MIN_NAME_CHARS: usize = 3;

fn tokens(lowered: &str) -> impl Iterator<Item = &str> {
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
}

/// `true` when `name` looks like a club rather than a national side.
///
/// Short names, explicit national-team phrasing and bare country names
/// without a club token are rejected; everything else is accepted.
pub fn is_club(name: &str) -> bool {
    let visible = name.chars().filter(|c| !c.is_whitespace()).count();
    if visible < MIN_NAME_CHARS {
        return false;
    }

    let lowered = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if NATIONAL_TEAM_MARKERS.iter().any(|m| lowered.contains(m)) {
        return false;
    }

    let has_club_token = tokens(&lowered).any(|t| CLUB_TOKENS.contains(&t));
    if COUNTRY_NAMES.contains(&lowered.as_str()) && !has_club_token {
        return false;
    }

    true
}
