mod cli_helpers;

use assert_cmd::prelude::*;
use cli_helpers::{as_f64, base_cmd, cache_db_for_home, run_cmd_json, LEDGER};
use predicates::prelude::*;
use tempfile::TempDir;

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

#[test]
fn load_dry_run_previews_rows_without_color() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("load").arg(LEDGER).arg("--dry-run");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Found 5 rows"))
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("UST10Y"))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn load_dry_run_lists_unreadable_rows() {
    let home = setup_temp_home();
    let ledger = home.path().join("grouped.csv");
    std::fs::write(
        &ledger,
        "Date,Type,Ticker,Side,Price,Quantity\n\
         2024-01-01,STOCK,AAPL,buy,100,\"1,000\"\n\
         2024-01-05,STOCK,AAPL,sell,110,\"2,5\"\n",
    )
    .unwrap();

    let value = run_cmd_json(&home, &["load", ledger.to_str().unwrap(), "--dry-run"]).unwrap();
    let rows = value["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(as_f64(&rows[0]["quantity"]), Some(1000.0));
    let skipped = value["skipped"].as_array().unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0]["row"], 2);
}

#[test]
fn load_reports_dropped_rows() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("load").arg(LEDGER);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Ledger: 3 transactions"))
        .stdout(predicate::str::contains("Technology"))
        .stdout(predicate::str::contains("2 rows dropped"))
        .stdout(predicate::str::contains("unsupported instrument type 'BOND'"))
        .stdout(predicate::str::contains("unknown side 'hold'"));
}

#[test]
fn load_json_lists_transactions_and_dropped_rows() {
    let home = setup_temp_home();
    let value = run_cmd_json(&home, &["load", LEDGER]).unwrap();

    assert_eq!(value["transactions"].as_array().unwrap().len(), 3);
    let dropped = value["dropped"].as_array().unwrap();
    assert_eq!(dropped.len(), 2);
    assert_eq!(dropped[0]["row"], 3);
}

#[test]
fn show_prints_last_day_holdings() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("show").arg(LEDGER);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("AAPL"))
        .stdout(predicate::str::contains("600.00"))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn show_json_reports_holdings() {
    let home = setup_temp_home();
    let value = run_cmd_json(&home, &["show", LEDGER]).unwrap();

    assert_eq!(value["as_of"], "2024-01-10");
    let holdings = value["holdings"].as_array().unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0]["ticker"], "AAPL");
    assert_eq!(as_f64(&holdings[0]["quantity"]), Some(5.0));
    assert_eq!(as_f64(&holdings[0]["value"]), Some(600.0));
    assert_eq!(as_f64(&value["total_value"]), Some(600.0));
}

#[test]
fn perf_json_has_summary_against_benchmark() {
    let home = setup_temp_home();
    let value = run_cmd_json(&home, &["perf", LEDGER, "--trades"]).unwrap();

    assert_eq!(value["benchmark"], "SPY");
    assert_eq!(value["summary"]["kind"], "table");
    let rows = value["summary"]["rows"].as_array().unwrap();
    assert!(rows.iter().any(|r| r["label"] == "Total return"));
    assert!(rows.iter().all(|r| r["cells"].as_array().unwrap().len() == 3));
    assert_eq!(value["trades"].as_array().unwrap().len(), 2);
    assert_eq!(value["benchmark_trades"].as_array().unwrap().len(), 2);
    assert!(value["disclosure"].is_null());
}

#[test]
fn perf_full_shares_prints_disclosure() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("perf").arg(LEDGER).arg("--full-shares");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Benchmark: SPY"))
        .stderr(predicate::str::contains("whole shares of SPY"));
}

#[test]
fn rolling_metric_with_short_history_is_empty() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("metric").arg("rsharpe").arg(LEDGER);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Not enough observations for this window"));
}

#[test]
fn metric_json_serializes_placeholders_as_null() {
    let home = setup_temp_home();
    let value = run_cmd_json(&home, &["metric", "summary", LEDGER]).unwrap();

    assert_eq!(value["metric"], "summary");
    let rows = value["result"]["rows"].as_array().unwrap();
    let beta = rows.iter().find(|r| r["label"] == "Beta").unwrap();
    let cells = beta["cells"].as_array().unwrap();
    assert!(cells[1].is_null());
    assert!(cells[2].is_null());
}

#[test]
fn unknown_metric_fails() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("metric").arg("alpha-centauri").arg(LEDGER);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown metric"));
}

#[test]
fn unknown_benchmark_fails() {
    let home = setup_temp_home();

    let mut cmd = base_cmd(&home);
    cmd.arg("perf").arg(LEDGER).arg("--benchmark").arg("NOPE");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("benchmark NOPE returned no price data"));
}

#[test]
fn alloc_sector_json_compares_weights() {
    let home = setup_temp_home();
    let value = run_cmd_json(&home, &["alloc", "sector", LEDGER]).unwrap();

    assert_eq!(value["benchmark"], "SPY");
    let rows = value["rows"].as_array().unwrap();
    let tech = rows.iter().find(|r| r["name"] == "Technology").unwrap();
    assert_eq!(as_f64(&tech["portfolio"]), Some(1.0));
    assert_eq!(as_f64(&tech["benchmark"]), Some(0.3));

    let health = rows.iter().find(|r| r["name"] == "Healthcare").unwrap();
    assert_eq!(as_f64(&health["portfolio"]), Some(0.0));
}

#[test]
fn returns_json_has_both_sides() {
    let home = setup_temp_home();
    let value = run_cmd_json(&home, &["returns", LEDGER, "--frequency", "daily"]).unwrap();

    assert!(value["portfolio"].is_object());
    assert!(value["benchmark"].is_object());
}

#[test]
fn price_cache_is_created_under_home() {
    let home = setup_temp_home();
    let db_path = cache_db_for_home(&home);
    assert!(!db_path.exists(), "cache should start absent");

    let mut cmd = base_cmd(&home);
    cmd.arg("show").arg(LEDGER);
    cmd.assert().success();

    assert!(db_path.exists(), "cache db should be created");
}

#[test]
fn no_cache_leaves_home_untouched() {
    let home = setup_temp_home();
    let db_path = cache_db_for_home(&home);

    let mut cmd = base_cmd(&home);
    cmd.arg("--no-cache").arg("show").arg(LEDGER);
    cmd.assert().success();

    assert!(!db_path.exists(), "cache db should not be created");
}
