use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_msh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn msh");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait output")
}

#[test]
fn background_job_is_listed_then_foregrounded() {
    let started = Instant::now();
    let output = run_shell(&["sleep 1 &", "jobs", "fg 0", "jobs", "echo AFTER"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("[0] sleep 1\n"), "stdout was: {stdout}");
    assert!(stdout.contains("AFTER"), "stdout was: {stdout}");
    assert_eq!(stdout.matches("[0] sleep 1\n").count(), 1, "stdout was: {stdout}");
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[test]
fn background_launch_announces_index_and_pid() {
    let output = run_shell(&["sleep 1 &", "fg"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[0] "), "stdout was: {stdout}");
}

#[test]
fn fg_with_unknown_index_reports_and_continues() {
    let output = run_shell(&["fg 7", "echo ALIVE"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(stderr.contains("no such job"), "stderr was: {stderr}");
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}

#[test]
fn bg_on_running_job_is_refused() {
    let output = run_shell(&["sleep 1 &", "bg 0", "fg 0"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bg"), "stderr was: {stderr}");
}

#[test]
fn finished_background_job_is_reported_once() {
    let output = run_shell(&["true &", "sleep 1", "jobs", "jobs"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("Done true").count(), 1, "stdout was: {stdout}");
}

#[test]
fn jobs_output_can_be_redirected() {
    let dir = tempfile::tempdir().unwrap();
    let listing = dir.path().join("jobs.txt");
    let redirect = format!("jobs 1> {}", listing.display());

    let output = run_shell(&["sleep 1 &", &redirect, "fg 0"]);
    assert!(output.status.success());
    assert_eq!(std::fs::read_to_string(&listing).unwrap(), "[0] sleep 1\n");
}
