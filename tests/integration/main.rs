//! Integration tests for basin

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Run against a config file inside `dir` so the user's config is never read
    fn basin(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("basin");
        cmd.env("BASIN_CONFIG", dir.join("config.toml"));
        cmd
    }

    fn with_cache_dir(dir: &Path) -> Command {
        let cache = dir.join("cache");
        std::fs::write(
            dir.join("config.toml"),
            format!("[cache]\ndir = {:?}\n", cache.display().to_string()),
        )
        .unwrap();
        basin(dir)
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        basin(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("watershed context builder"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        basin(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("basin"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        basin(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        basin(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[processing]"))
            .stdout(predicate::str::contains("segmentation_epsg = 5070"));
    }

    #[test]
    fn config_init_creates_file() {
        let temp = TempDir::new().unwrap();
        basin(temp.path()).args(["config", "init"]).assert().success();
        assert!(temp.path().join("config.toml").exists());
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[processing.segmentation]\nmin_length_m = 500.0\nmax_length_m = 300.0\n",
        )
        .unwrap();
        basin(temp.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("min_length_m"));
    }

    #[test]
    fn datasets_lists_registry() {
        let temp = TempDir::new().unwrap();
        basin(temp.path())
            .args(["datasets", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("DEM"))
            .stdout(predicate::str::contains("NHDFlowline"));
    }

    #[test]
    fn datasets_json_is_valid() {
        let temp = TempDir::new().unwrap();
        let output = basin(temp.path())
            .args(["datasets", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert!(parsed.as_array().unwrap().iter().any(|d| d["id"] == "HYDROLOGY"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        with_cache_dir(temp.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached downloads"));
    }

    #[test]
    fn cache_gc_dry_run_empty() {
        let temp = TempDir::new().unwrap();
        with_cache_dir(temp.path())
            .args(["cache", "gc", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached downloads older than 30 days"));
    }

    #[test]
    fn build_rejects_invalid_region() {
        let temp = TempDir::new().unwrap();
        basin(temp.path())
            .args(["build", "17A1"])
            .arg("--output")
            .arg(temp.path().join("out"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid input"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_rejects_bad_meta() {
        let temp = TempDir::new().unwrap();
        basin(temp.path())
            .args(["build", "1701", "--meta", "novalue"])
            .arg("--output")
            .arg(temp.path().join("out"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected key=value"));
    }

    #[test]
    fn build_requires_output() {
        let temp = TempDir::new().unwrap();
        basin(temp.path())
            .args(["build", "1701"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--output"));
    }
}
