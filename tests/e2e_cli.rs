
use assert_cmd::{cargo, prelude::*};
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use workbook_fixtures::{sample_lines, write_database, write_monthly, write_standard};

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

/// Isolated HOME so no user config.toml leaks into the run
fn base_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("t12-ledger"));
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("RUST_LOG")
        .arg("--no-color")
        .arg("--as-of")
        .arg("2024-12-31");
    cmd
}

fn standard_workbook(home: &TempDir) -> PathBuf {
    let path = home.path().join("standard.xlsx");
    write_standard(&path, &[("Oak Grove", sample_lines()), ("Pine Ridge", sample_lines())], 2024)
        .expect("failed to write standard workbook");
    path
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("failed to run t12-ledger");
    assert!(
        output.status.success(),
        "command failed\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp path is valid UTF-8")
}

#[test]
fn formats_lists_builtin_processors() {
    let home = setup_temp_home();
    base_cmd(&home)
        .arg("formats")
        .assert()
        .success()
        .stdout(predicate::str::contains("T12_Monthly_Financial"))
        .stdout(predicate::str::contains("Standard_T12_Workbook"))
        .stdout(predicate::str::contains("Database_T12_Workbook"))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn inspect_reports_detected_format_as_json() {
    let home = setup_temp_home();
    let path = home.path().join("database.xlsx");
    write_database(&path, &[("Cedar", sample_lines())], 2024, 1).expect("failed to write workbook");

    let report = json_stdout(base_cmd(&home).arg("--json").arg("inspect").arg(path_arg(&path)));
    assert_eq!(report["detected"], "Database_T12_Workbook");
    assert_eq!(report["sheets"].as_array().map(|s| s.len()), Some(2));
    assert_eq!(report["sheets"][0]["name"], "Cedar-Fin");
}

#[test]
fn process_writes_csv_and_prints_summary() {
    let home = setup_temp_home();
    let path = standard_workbook(&home);
    let csv_path = home.path().join("canonical.csv");

    base_cmd(&home)
        .arg("process")
        .arg(path_arg(&path))
        .arg("--csv")
        .arg(path_arg(&csv_path))
        .assert()
        .success()
        .stdout(predicate::str::contains("Standard_T12_Workbook"))
        .stdout(predicate::str::contains("Oak Grove"))
        .stdout(predicate::str::contains("Wrote"))
        .stdout(predicate::str::contains("\u{001b}[").not());

    let csv = std::fs::read_to_string(&csv_path).expect("csv written");
    assert!(csv.starts_with("Property,Sheet,Metric,Period,PeriodParsed,IsYTD,Value,BudgetValue"));
    assert!(csv.contains("Pine Ridge,Pine Ridge,EBITDA (NOI),YTD,,true,480000,624000"));
}

#[test]
fn process_json_fingerprint_is_repeatable() {
    let home = setup_temp_home();
    let path = standard_workbook(&home);

    let first = json_stdout(base_cmd(&home).arg("--json").arg("process").arg(path_arg(&path)));
    let second = json_stdout(base_cmd(&home).arg("--json").arg("process").arg(path_arg(&path)));

    assert_eq!(first["format"], "Standard_T12_Workbook");
    assert!(first["fingerprint"].as_str().is_some_and(|f| !f.is_empty()));
    assert_eq!(first["fingerprint"], second["fingerprint"]);
    assert_eq!(first["rows"].as_array().map(|r| r.len()), Some(2 * 10 * 13));
}

#[test]
fn process_unknown_format_fails_with_available_list() {
    let home = setup_temp_home();
    let path = standard_workbook(&home);

    base_cmd(&home)
        .arg("process")
        .arg(path_arg(&path))
        .arg("--format")
        .arg("Quarterly")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Quarterly"))
        .stderr(predicate::str::contains("T12_Monthly_Financial"));
}

#[test]
fn analyze_property_json_has_variances() {
    let home = setup_temp_home();
    let path = standard_workbook(&home);

    let result = json_stdout(
        base_cmd(&home)
            .arg("--json")
            .arg("analyze")
            .arg(path_arg(&path))
            .arg("--property")
            .arg("Oak Grove"),
    );
    assert_eq!(result["property_name"], "Oak Grove");
    assert_eq!(result["report_period"], "December 2024");
    assert_eq!(result["prior_period"], "November 2024");
    assert_eq!(result["budget_variances"]["monthly"]["ebitda_noi"]["variance_pct"], -23.08);
    assert_eq!(result["key_ratios"]["vacancy_rate_pct"], 5.0);
    assert_eq!(result["diagnostics"]["detection"], "core_metrics");
}

#[test]
fn analyze_minimal_for_every_property() {
    let home = setup_temp_home();
    let path = standard_workbook(&home);

    let results = json_stdout(
        base_cmd(&home)
            .arg("--json")
            .arg("analyze")
            .arg(path_arg(&path))
            .arg("--minimal"),
    );
    let results = results.as_array().expect("array of properties");
    assert_eq!(results.len(), 2);
    assert_eq!(results[1]["property_name"], "Pine Ridge");
    assert!(results[0]["trailing_anomalies"].is_object());
    assert!(results[0].get("key_ratios").is_none());
}

#[test]
fn analyze_unavailable_period_fails() {
    let home = setup_temp_home();
    let path = standard_workbook(&home);

    base_cmd(&home)
        .arg("analyze")
        .arg(path_arg(&path))
        .arg("--property")
        .arg("Oak Grove")
        .arg("--period")
        .arg("2021-03")
        .assert()
        .failure()
        .stderr(predicate::str::contains("2021-03"));
}

#[test]
fn summary_prints_kpi_sections() {
    let home = setup_temp_home();
    let path = home.path().join("maple.xlsx");
    write_monthly(&path, &[("Maple CRES", sample_lines())], 2024).expect("failed to write workbook");

    base_cmd(&home)
        .arg("summary")
        .arg(path_arg(&path))
        .assert()
        .success()
        .stdout(predicate::str::contains("T12 PROPERTY ANALYSIS - December 2024"))
        .stdout(predicate::str::contains("=== KEY PERFORMANCE RATIOS ==="))
        .stdout(predicate::str::contains("Vacancy Rate: 5.0%"))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn unrecognized_workbook_fails_detection() {
    let home = setup_temp_home();
    let path = home.path().join("notes.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Notes").expect("valid sheet name");
    sheet.write_string(0, 0, "Nothing to see").expect("write cell");
    workbook.save(&path).expect("save workbook");

    base_cmd(&home)
        .arg("process")
        .arg(path_arg(&path))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no registered format"));
}
