//! Integration tests for the reclaim cycle CLI.
//!
//! These tests write the three input streams to a temp directory, run the
//! actual binary, and check the outcome CSV on stdout.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const HEADERS: &str = "owner,cycle,trip,rate_code,rate_code_ext,reload
UP,C1,500,A,EXT1,N
UP,C2,501,A,EXT1,N
UP,C3,502,B,,N
BN,C9,900,A,EXT1,N
";

const RATES: &str = "owner,rate_code,rate_code_ext,effective,expire,rate,description
UP,A,EXT1,200101,200112,1.00,first
UP,A,EXT1,200201,999912,1.25,second
UP,ZZ,MAX,200101,999912,5.00,ceiling
";

const HISTORY: &str = "owner,trip,rule5_receivable,delivery,event_type,timestamp
UP,500,N,N,ARRV,01
UP,500,N,N,PLCD,02
UP,500,Y,N,RLSE,03
UP,501,N,N,ARRV,01
UP,502,Y,Y,DLVR,01
";

struct Inputs {
    _dir: TempDir,
    headers: PathBuf,
    rates: PathBuf,
    history: PathBuf,
}

fn write_inputs(headers: &str, rates: &str, history: &str) -> Inputs {
    let dir = TempDir::new().unwrap();
    let headers_path = dir.path().join("headers.csv");
    let rates_path = dir.path().join("rates.csv");
    let history_path = dir.path().join("history.csv");
    fs::write(&headers_path, headers).unwrap();
    fs::write(&rates_path, rates).unwrap();
    fs::write(&history_path, history).unwrap();

    Inputs {
        _dir: dir,
        headers: headers_path,
        rates: rates_path,
        history: history_path,
    }
}

fn cycle_cmd(inputs: &Inputs, month: &str, phase: &str) -> Command {
    let mut cmd = Command::cargo_bin("reclaim-cycle").unwrap();
    cmd.arg("--owner")
        .arg("UP")
        .arg("--service-month")
        .arg(month)
        .arg("--phase")
        .arg(phase)
        .arg("--headers")
        .arg(&inputs.headers)
        .arg("--rates")
        .arg(&inputs.rates)
        .arg("--history")
        .arg(&inputs.history);
    cmd
}

fn stdout_lines(cmd: &mut Command) -> Vec<String> {
    let assert = cmd.assert().success();
    String::from_utf8(assert.get_output().stdout.clone())
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

#[test]
fn test_rates_only_run() {
    let inputs = write_inputs(HEADERS, RATES, HISTORY);
    let lines = stdout_lines(&mut cycle_cmd(&inputs, "200203", "2"));

    assert_eq!(
        lines,
        vec![
            "cycle,trip,rate_code,rate_code_ext,status,rate,tol,reason",
            "C1,500,A,EXT1,resolved,1.2500,n/a,",
            "C2,501,A,EXT1,resolved,1.2500,n/a,",
            "C3,502,B,,failed,,,rate not on file",
        ]
    );
}

#[test]
fn test_tol_detection_run() {
    let inputs = write_inputs(HEADERS, RATES, HISTORY);
    let mut cmd = cycle_cmd(&inputs, "200203", "2");
    cmd.arg("--voluntary-trip");
    let lines = stdout_lines(&mut cmd);

    assert_eq!(lines[1], "C1,500,A,EXT1,resolved,1.2500,satisfied@03,");
    assert_eq!(
        lines[2],
        "C2,501,A,EXT1,failed,,failed,no receivable event for trip 501 (1 examined)"
    );
    assert_eq!(lines[3], "C3,502,B,,failed,,,rate not on file");
}

#[test]
fn test_service_month_before_first_generation() {
    let inputs = write_inputs(HEADERS, RATES, HISTORY);
    let lines = stdout_lines(&mut cycle_cmd(&inputs, "199912", "2"));

    assert_eq!(lines[1], "C1,500,A,EXT1,failed,,,rate not yet effective");
}

#[test]
fn test_phase_one_reports_follow_ups() {
    let inputs = write_inputs(HEADERS, RATES, HISTORY);
    let mut cmd = cycle_cmd(&inputs, "200203", "1");
    cmd.env("RUST_LOG", "info")
        .assert()
        .success()
        .stderr(predicate::str::contains("FifthReclaim"));
}

#[test]
fn test_empty_headers() {
    let inputs = write_inputs(
        "owner,cycle,trip,rate_code,rate_code_ext,reload\n",
        RATES,
        HISTORY,
    );
    let lines = stdout_lines(&mut cycle_cmd(&inputs, "200203", "2"));

    assert_eq!(
        lines,
        vec!["cycle,trip,rate_code,rate_code_ext,status,rate,tol,reason"]
    );
}

#[test]
fn test_whitespace_handling() {
    let inputs = write_inputs(
        "owner, cycle, trip, rate_code, rate_code_ext, reload\n  UP , C1 , 500 , A , EXT1 , N \n",
        RATES,
        HISTORY,
    );
    let lines = stdout_lines(&mut cycle_cmd(&inputs, "200203", "2"));

    assert_eq!(lines[1], "C1,500,A,EXT1,resolved,1.2500,n/a,");
}

#[test]
fn test_invalid_phase_aborts() {
    let inputs = write_inputs(HEADERS, RATES, HISTORY);
    cycle_cmd(&inputs, "200203", "7")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Aborted: missing phase"));
}

#[test]
fn test_corrupt_rate_row_fails_load() {
    let inputs = write_inputs(
        HEADERS,
        "owner,rate_code,rate_code_ext,effective,expire,rate,description
UP,A,EXT1,200201,199912,1.25,inverted
",
        HISTORY,
    );
    cycle_cmd(&inputs, "200203", "2")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("rate master"))
        .stderr(predicate::str::contains("row 2"));
}

#[test]
fn test_bad_service_month_rejected() {
    let inputs = write_inputs(HEADERS, RATES, HISTORY);
    cycle_cmd(&inputs, "200213", "2").assert().failure();
}

#[test]
fn test_missing_file() {
    let mut cmd = Command::cargo_bin("reclaim-cycle").unwrap();
    cmd.args([
        "--owner",
        "UP",
        "--service-month",
        "200203",
        "--phase",
        "2",
        "--headers",
        "nonexistent_headers.csv",
        "--rates",
        "nonexistent_rates.csv",
        "--history",
        "nonexistent_history.csv",
    ])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_missing_arguments() {
    let mut cmd = Command::cargo_bin("reclaim-cycle").unwrap();
    cmd.assert().failure();
}
