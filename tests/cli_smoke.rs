use std::process::Command;

use tempfile::tempdir;

fn write_gold_set(path: &std::path::Path, accepted: usize, rejected: usize) {
    let mut contents =
        String::from("rfc_id,original_affiliation,llm_normalized,human_normalized,label\n");
    for i in 0..accepted {
        contents.push_str(&format!("rfc{i},raw {i},AT&T,AT&T,r\n"));
    }
    for i in 0..rejected {
        contents.push_str(&format!("bad{i},raw bad {i},ATT,AT&T,w\n"));
    }
    std::fs::write(path, contents).unwrap();
}

#[test]
fn cli_stats_reports_accuracy_and_exports_errors() {
    let dir = tempdir().unwrap();
    let gold = dir.path().join("gold_set.csv");
    let errors = dir.path().join("error_samples.csv");
    write_gold_set(&gold, 7, 3);

    let output = Command::new(env!("CARGO_BIN_EXE_goldset"))
        .args(["stats", "--kind", "affiliation", "--skip-consistency"])
        .arg("--gold")
        .arg(&gold)
        .arg("--errors")
        .arg(&errors)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("N = Total number of manually evaluated entries: 10"));
    assert!(stdout.contains("Accuracy = R / N = 7 / 10 = 70.00%"));
    assert!(stdout.contains("Error Rate = W / N = 3 / 10 = 30.00%"));

    let exported = std::fs::read_to_string(&errors).unwrap();
    assert!(exported.starts_with("rfc_id,original_affiliation,llm_normalized,human_normalized"));
    assert_eq!(exported.lines().count(), 4);
    assert!(!exported.contains(",r\n"));
}

#[test]
fn cli_run_on_populated_gold_set_reports_without_api_key() {
    let dir = tempdir().unwrap();
    let gold = dir.path().join("gold_set.csv");
    let errors = dir.path().join("error_samples.csv");
    write_gold_set(&gold, 7, 3);

    // Resume is a pure reporting run: no input corpus, no API key.
    let output = Command::new(env!("CARGO_BIN_EXE_goldset"))
        .args(["run", "--kind", "affiliation"])
        .arg("--input")
        .arg(dir.path().join("absent_input.csv"))
        .arg("--gold")
        .arg(&gold)
        .arg("--errors")
        .arg(&errors)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("EXISTING GOLD SET FOUND"));
    assert!(stdout.contains("Accuracy = R / N = 7 / 10 = 70.00%"));
    assert!(stdout.contains("Skipping consistency check: OPENAI_API_KEY not set"));
    assert!(errors.exists());
}

#[test]
fn cli_stats_with_clean_gold_set_skips_error_export() {
    let dir = tempdir().unwrap();
    let gold = dir.path().join("gold_set.csv");
    let errors = dir.path().join("error_samples.csv");
    write_gold_set(&gold, 5, 0);

    let output = Command::new(env!("CARGO_BIN_EXE_goldset"))
        .args(["stats", "--kind", "affiliation", "--skip-consistency", "--log-usage"])
        .arg("--gold")
        .arg(&gold)
        .arg("--errors")
        .arg(&errors)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Accuracy = R / N = 5 / 5 = 100.00%"));
    assert!(stdout.contains("No error cases to save"));
    assert!(!errors.exists());
}

#[test]
fn cli_stats_fails_cleanly_without_a_gold_set() {
    let dir = tempdir().unwrap();
    let gold = dir.path().join("missing.csv");

    let output = Command::new(env!("CARGO_BIN_EXE_goldset"))
        .args(["stats", "--kind", "affiliation", "--skip-consistency"])
        .arg("--gold")
        .arg(&gold)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no gold set found"));
}
