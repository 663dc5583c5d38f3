use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ecc_core::{Competition, CSV_HEADER};
use ecc_sync::{hand_off_file_name, report_recent_runs, PipelineState, SyncConfig, SyncPipeline};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

const ALL_FIXTURES: &str = r#"
competitions:
  - code: UCL
    display_name: Champions League
    enabled: true
    mode: fixture
  - code: UEL
    display_name: Europa League
    enabled: true
    mode: fixture
  - code: UECL
    display_name: Conference League
    enabled: true
    mode: fixture
"#;

/// Temp workspace holding copies of the sample fixtures and params.
fn temp_workspace(registry: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let source = workspace_root();
    for code in ["ucl", "uel", "uecl"] {
        let from = source.join("fixtures").join(code).join("sample");
        let to = dir.path().join("fixtures").join(code).join("sample");
        std::fs::create_dir_all(&to).unwrap();
        for entry in std::fs::read_dir(&from).unwrap() {
            let entry = entry.unwrap();
            std::fs::copy(entry.path(), to.join(entry.file_name())).unwrap();
        }
    }
    std::fs::create_dir_all(dir.path().join("params")).unwrap();
    std::fs::copy(
        source.join("params").join("scraper_params.json"),
        dir.path().join("params").join("scraper_params.json"),
    )
    .unwrap();
    std::fs::write(dir.path().join("competitions.yaml"), registry).unwrap();
    dir
}

fn config_for(dir: &Path) -> SyncConfig {
    let mut config = SyncConfig::for_workspace(dir);
    config.today = NaiveDate::from_ymd_opt(2025, 6, 15);
    config
}

#[tokio::test]
async fn fixture_run_writes_hand_off_files_and_reports() {
    let dir = temp_workspace(ALL_FIXTURES);
    let summary = SyncPipeline::new(config_for(dir.path()))
        .unwrap()
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.competitions.len(), 3);
    assert!(summary
        .competitions
        .iter()
        .all(|c| c.state == PipelineState::Done));
    assert_eq!(summary.total_matches, 4);

    let ucl = &summary.competitions[0];
    assert_eq!(ucl.competition, Competition::Ucl);
    assert_eq!(ucl.stats.accepted, 3);
    assert_eq!(ucl.stats.rejected_out_of_window, 2);
    assert_eq!(ucl.stats.rejected_no_score, 1);
    assert!(ucl.archived_page.is_some());

    let uel = &summary.competitions[1];
    assert_eq!(uel.stats.accepted, 0);
    assert_eq!(uel.stats.rejected_out_of_window, 3);
    assert_eq!(uel.stats.rejected_non_club, 1);
    assert!(uel.hand_off_file.is_none());

    let files = dir.path().join("files");
    assert!(!files.join(hand_off_file_name(Competition::Uel)).exists());
    let ucl_csv =
        std::fs::read_to_string(files.join(hand_off_file_name(Competition::Ucl))).unwrap();
    let lines: Vec<&str> = ucl_csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], CSV_HEADER.join(","));
    assert!(lines[1].contains("Aston Villa,Celtic,4,2"));
    assert!(lines[1].contains("2025-01-29"));
    assert!(lines[2].contains("Shakhtar Donetsk"));
    assert!(lines[3].contains("Girona"));

    let uecl_csv =
        std::fs::read_to_string(files.join(hand_off_file_name(Competition::Uecl))).unwrap();
    assert!(uecl_csv.contains("Chelsea,Shamrock Rovers,5,1"));

    let reports_dir = PathBuf::from(&summary.reports_dir);
    for name in ["run_summary.json", "results_brief.md", "team_name_review.json"] {
        assert!(reports_dir.join(name).exists(), "missing {name}");
    }
    assert!(Path::new(&summary.parquet_manifest).exists());

    let brief = std::fs::read_to_string(reports_dir.join("results_brief.md")).unwrap();
    assert!(brief.contains("## UCL Champions League"));
    assert!(brief.contains("2025-01-29 Aston Villa 4-2 Celtic (LEAGUE_PHASE)"));

    let report = report_recent_runs(5, Some(dir.path().to_path_buf())).unwrap();
    assert!(report.contains(&summary.run_id.to_string()));
    assert!(report.contains("- UCL: DONE (3 accepted)"));
}

#[tokio::test]
async fn failing_competition_does_not_stop_the_others() {
    let registry = r#"
competitions:
  - code: UCL
    display_name: Champions League
    enabled: true
    mode: fixture
  - code: UEL
    display_name: Europa League
    enabled: true
    mode: fixture
    fixture: fixtures/ucl/sample/bundle.json
"#;
    let dir = temp_workspace(registry);
    let summary = SyncPipeline::new(config_for(dir.path()))
        .unwrap()
        .run_once()
        .await
        .unwrap();

    let states: Vec<_> = summary.competitions.iter().map(|c| c.state).collect();
    assert_eq!(states, vec![PipelineState::Done, PipelineState::Failed]);
    let error = summary.competitions[1].error.as_deref().unwrap();
    assert!(error.contains("does not match"));
    assert_eq!(summary.total_matches, 3);
}

#[tokio::test]
async fn limit_caps_each_competition_after_ordering() {
    let dir = temp_workspace(ALL_FIXTURES);
    let mut config = config_for(dir.path());
    config.limit = Some(1);
    let summary = SyncPipeline::new(config).unwrap().run_once().await.unwrap();

    let ucl = &summary.competitions[0];
    assert_eq!(ucl.stats.accepted, 1);
    assert_eq!(ucl.stats.truncated_by_limit, 2);
    assert_eq!(summary.total_matches, 2);
    let report = report_recent_runs(1, Some(dir.path().to_path_buf())).unwrap();
    assert!(report.contains("- UCL: DONE (1 accepted)"));
    let brief =
        std::fs::read_to_string(Path::new(&summary.reports_dir).join("results_brief.md")).unwrap();
    assert!(brief.contains("- cut by limit: 2"));

    let ucl_csv = std::fs::read_to_string(
        dir.path()
            .join("files")
            .join(hand_off_file_name(Competition::Ucl)),
    )
    .unwrap();
    let lines: Vec<&str> = ucl_csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("Aston Villa"));
}

#[tokio::test]
async fn malformed_season_fails_the_run() {
    let dir = temp_workspace(ALL_FIXTURES);
    std::fs::write(
        dir.path().join("params").join("scraper_params.json"),
        r#"{ "SEASON": "2024" }"#,
    )
    .unwrap();
    let err = SyncPipeline::new(config_for(dir.path()))
        .unwrap()
        .run_once()
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("SEASON"));
}

#[tokio::test]
async fn scheduler_is_off_unless_enabled() {
    let dir = temp_workspace(ALL_FIXTURES);
    let pipeline = SyncPipeline::new(config_for(dir.path())).unwrap();
    assert!(pipeline.maybe_build_scheduler().await.unwrap().is_none());
}
