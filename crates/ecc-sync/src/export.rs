//! CSV hand-off files and Parquet snapshots.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use ecc_core::{render_matches_csv, Competition, MatchRecord};
use ecc_storage::write_file_atomic;
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::pipeline::CompetitionOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// `UCL_champions_league_matches.csv` and friends.
pub fn hand_off_file_name(competition: Competition) -> String {
    let snake = competition
        .display_name()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    format!("{}_{}_matches.csv", competition.code(), snake)
}

/// Writes the hand-off CSV; returns `None` without touching disk when there
/// is nothing to hand off.
pub async fn write_hand_off_csv(
    output_dir: &Path,
    competition: Competition,
    records: &[MatchRecord],
) -> Result<Option<PathBuf>> {
    if records.is_empty() {
        return Ok(None);
    }
    let path = output_dir.join(hand_off_file_name(competition));
    let csv = render_matches_csv(records)
        .with_context(|| format!("rendering {} hand-off csv", competition.code()))?;
    write_file_atomic(&path, csv.as_bytes())
        .await
        .with_context(|| format!("writing hand-off file {}", path.display()))?;
    Ok(Some(path))
}

pub fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

pub fn write_matches_parquet(path: &Path, records: &[MatchRecord]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("match_id", DataType::Utf8, false),
        ArrowField::new("competition", DataType::Utf8, false),
        ArrowField::new("season", DataType::Utf8, false),
        ArrowField::new("phase", DataType::Utf8, false),
        ArrowField::new("match_date", DataType::Utf8, false),
        ArrowField::new("home_team", DataType::Utf8, false),
        ArrowField::new("away_team", DataType::Utf8, false),
        ArrowField::new("home_goals", DataType::UInt32, false),
        ArrowField::new("away_goals", DataType::UInt32, false),
    ]));

    let utf8 = |f: fn(&MatchRecord) -> String| {
        StringArray::from(records.iter().map(f).collect::<Vec<_>>())
    };
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(utf8(|r| r.match_id.clone())),
            Arc::new(utf8(|r| r.competition.code().to_string())),
            Arc::new(utf8(|r| r.season.to_string())),
            Arc::new(utf8(|r| r.phase.as_str().to_string())),
            Arc::new(utf8(|r| r.match_date.format("%Y-%m-%d").to_string())),
            Arc::new(utf8(|r| r.home_team.clone())),
            Arc::new(utf8(|r| r.away_team.clone())),
            Arc::new(UInt32Array::from(
                records.iter().map(|r| r.home_goals).collect::<Vec<_>>(),
            )),
            Arc::new(UInt32Array::from(
                records.iter().map(|r| r.away_goals).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building matches record batch")?;
    write_parquet(path, batch)
}

pub fn write_competition_stats_parquet(path: &Path, outcomes: &[CompetitionOutcome]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("competition", DataType::Utf8, false),
        ArrowField::new("state", DataType::Utf8, false),
        ArrowField::new("fragments_seen", DataType::UInt64, false),
        ArrowField::new("rejected_no_score", DataType::UInt64, false),
        ArrowField::new("rejected_no_teams", DataType::UInt64, false),
        ArrowField::new("rejected_non_club", DataType::UInt64, false),
        ArrowField::new("rejected_no_date", DataType::UInt64, false),
        ArrowField::new("rejected_out_of_window", DataType::UInt64, false),
        ArrowField::new("truncated_by_limit", DataType::UInt64, false),
        ArrowField::new("accepted", DataType::UInt64, false),
    ]));

    let counter = |f: fn(&CompetitionOutcome) -> usize| {
        UInt64Array::from(outcomes.iter().map(|o| f(o) as u64).collect::<Vec<_>>())
    };
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(
                outcomes
                    .iter()
                    .map(|o| o.competition.code())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                outcomes
                    .iter()
                    .map(|o| o.state.to_string())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(counter(|o| o.stats.fragments_seen)),
            Arc::new(counter(|o| o.stats.rejected_no_score)),
            Arc::new(counter(|o| o.stats.rejected_no_teams)),
            Arc::new(counter(|o| o.stats.rejected_non_club)),
            Arc::new(counter(|o| o.stats.rejected_no_date)),
            Arc::new(counter(|o| o.stats.rejected_out_of_window)),
            Arc::new(counter(|o| o.stats.truncated_by_limit)),
            Arc::new(counter(|o| o.stats.accepted)),
        ],
    )
    .context("building competition stats record batch")?;
    write_parquet(path, batch)
}

pub fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ecc_core::{Phase, Season, CSV_HEADER};

    fn sample() -> Vec<MatchRecord> {
        vec![MatchRecord::new(
            Competition::Uecl,
            Season::starting(2024),
            Phase::Final,
            NaiveDate::from_ymd_opt(2025, 5, 28).unwrap(),
            "Real Betis",
            "Chelsea",
            1,
            4,
        )]
    }

    #[test]
    fn hand_off_names_follow_display_names() {
        assert_eq!(
            hand_off_file_name(Competition::Ucl),
            format!(
                "UCL_{}_matches.csv",
                Competition::Ucl.display_name().to_lowercase().replace(' ', "_")
            )
        );
        assert!(hand_off_file_name(Competition::Uecl).starts_with("UECL_"));
        assert!(!hand_off_file_name(Competition::Uel).contains(' '));
    }

    #[tokio::test]
    async fn empty_competition_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_hand_off_csv(dir.path(), Competition::Uel, &[])
            .await
            .unwrap();
        assert!(written.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn hand_off_csv_starts_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_hand_off_csv(dir.path(), Competition::Uecl, &sample())
            .await
            .unwrap()
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        assert!(lines.next().unwrap().contains("Real Betis"));
    }

    #[test]
    fn parquet_snapshot_is_listed_in_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = dir.path().join("snapshots");
        std::fs::create_dir_all(&snapshots).unwrap();
        let path = snapshots.join("matches.parquet");
        write_matches_parquet(&path, &sample()).unwrap();

        let entry = manifest_entry("matches", dir.path(), &path).unwrap();
        assert_eq!(entry.path, Path::new("snapshots").join("matches.parquet").display().to_string());
        assert_eq!(entry.sha256.len(), 64);
        assert!(entry.bytes > 0);
    }
}
