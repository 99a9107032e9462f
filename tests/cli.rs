// CLI smoke tests against the built binary

use std::io::Write;
use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ingest2parquet"))
}

#[test]
fn test_invalid_date_fails_before_config_is_read() {
    let output = bin()
        .args([
            "ingest",
            "--execution-date",
            "2024-1-01",
            "--config",
            "/nonexistent/pipeline.yaml",
        ])
        .output()
        .expect("binary runs");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E002"), "stderr: {}", stderr);
    assert!(!stderr.contains("E005"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let output = bin()
        .args([
            "ingest",
            "--execution-date",
            "2024-12-01",
            "--config",
            "/nonexistent/pipeline.yaml",
        ])
        .output()
        .expect("binary runs");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E005"), "stderr: {}", stderr);
}

#[test]
fn test_csv_ingest_to_local_directory() {
    let work = tempfile::tempdir().unwrap();
    let csv_path = work.path().join("users.csv");
    std::fs::write(
        &csv_path,
        "id,created_at\n1,2024-12-01 10:00:00\n2,2024-12-02 10:00:00\n",
    )
    .unwrap();
    let out = work.path().join("out");
    std::fs::create_dir(&out).unwrap();

    let mut config = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    write!(
        config,
        "pipeline:\n  source_type: csv\n  source:\n    file_path: {}\n    date_column: created_at\n  target:\n    storage: fs\n    bucket: {}\n    path: users\n    partition_column: dt\n",
        csv_path.display(),
        out.display()
    )
    .unwrap();

    let output = bin()
        .args(["ingest", "--execution-date", "2024-12-01", "--config"])
        .arg(config.path())
        .env_remove("INGEST2PARQUET_TARGET_BUCKET")
        .env_remove("INGEST2PARQUET_SOURCE_TYPE")
        .output()
        .expect("binary runs");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let partition = out.join("users").join("dt=2024-12-01");
    assert_eq!(std::fs::read_dir(partition).unwrap().count(), 1);
}

#[test]
fn test_ddl_missing_folder_exits_nonzero() {
    let output = bin()
        .args(["ddl", "--sql-folder", "/nonexistent/bigquery", "--dry-run"])
        .output()
        .expect("binary runs");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SQL folder"), "stderr: {}", stderr);
}
