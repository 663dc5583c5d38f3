use std::collections::BTreeSet;

use ecc_core::{normalize_team_key, MatchRecord};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamNameReviewItem {
    pub team_a: String,
    pub team_b: String,
    pub similarity: f64,
}

/// Flags near-identical team spellings for alias curation. Never merges.
#[derive(Debug, Clone)]
pub struct TeamNameReview {
    pub threshold: f64,
}

impl Default for TeamNameReview {
    fn default() -> Self {
        Self { threshold: 0.92 }
    }
}

impl TeamNameReview {
    pub fn review(&self, records: &[MatchRecord]) -> Vec<TeamNameReviewItem> {
        let spellings: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| [r.home_team.as_str(), r.away_team.as_str()])
            .collect();
        let spellings: Vec<&str> = spellings.into_iter().collect();

        let mut items = Vec::new();
        for (i, a) in spellings.iter().enumerate() {
            for b in &spellings[i + 1..] {
                let (ka, kb) = (normalize_team_key(a), normalize_team_key(b));
                if ka == kb {
                    continue;
                }
                let similarity = jaro_winkler(&ka, &kb);
                if similarity >= self.threshold {
                    items.push(TeamNameReviewItem {
                        team_a: a.to_string(),
                        team_b: b.to_string(),
                        similarity,
                    });
                }
            }
        }
        items.sort_by(|x, y| y.similarity.total_cmp(&x.similarity));
        items
    }
}
