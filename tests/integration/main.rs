//! Integration tests for Layer

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use layer_sdk::config::Config;
    use layer_sdk::flavor::{FlavorKind, ModelObject};
    use predicates::prelude::*;
    use serde_json::json;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const TRAIN_ID: &str = "a7c02598-7910-4f96-b8e6-bc6b62bd214f";

    fn layer() -> Command {
        cargo_bin_cmd!("layer")
    }

    /// Temp config with a directory-backed store holding one JSON model
    struct Env {
        temp: TempDir,
        config: PathBuf,
    }

    impl Env {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let mut config = Config::default();
            config.storage.local_root = Some(temp.path().join("store"));
            config.cache.dir = Some(temp.path().join("cache"));
            config.transfer.initial_backoff_ms = 1;
            config.transfer.max_attempts = 2;

            let path = temp.path().join("config.toml");
            fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

            let model_dir = temp.path().join("store/models/churn").join(TRAIN_ID);
            fs::create_dir_all(&model_dir).unwrap();
            FlavorKind::Json
                .flavor()
                .save_to_directory(
                    &ModelObject::Json(json!({"coef": [0.5, 1.5], "intercept": -2.0})),
                    &model_dir,
                )
                .unwrap();

            Self { temp, config: path }
        }

        fn cmd(&self) -> Command {
            let mut cmd = layer();
            cmd.env("LAYER_CONFIG", &self.config);
            cmd
        }

        fn cache_dir(&self) -> PathBuf {
            self.temp.path().join("cache")
        }

        fn location(&self) -> String {
            format!("s3://models/churn/{TRAIN_ID}")
        }
    }

    fn is_cached(cache_dir: &Path, key: &str) -> bool {
        cache_dir.join(key).join(".layer-entry.json").is_file()
    }

    #[test]
    fn help_displays() {
        layer()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("fetch"))
            .stdout(predicate::str::contains("cache"));
    }

    #[test]
    fn version_displays() {
        layer()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("layer"));
    }

    #[test]
    fn config_path_follows_flag() {
        let env = Env::new();
        env.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let env = Env::new();
        env.cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("lock_timeout_secs"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[cache\nenabled = ").unwrap();

        layer()
            .env("LAYER_CONFIG", &path)
            .args(["cache", "path"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn cache_path_and_empty_list() {
        let env = Env::new();
        env.cmd()
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache"));

        env.cmd()
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached artifacts."));
    }

    #[test]
    fn fetch_then_hit() {
        let env = Env::new();

        env.cmd()
            .args(["fetch", &env.location(), "--key", TRAIN_ID])
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("Fetched {TRAIN_ID}")))
            .stdout(predicate::str::contains("JSON object with 2 field(s)"));
        assert!(is_cached(&env.cache_dir(), TRAIN_ID));

        // Remove the remote copy: the second fetch must not need it
        fs::remove_dir_all(env.temp.path().join("store/models/churn")).unwrap();

        env.cmd()
            .args(["fetch", &env.location(), "--key", TRAIN_ID])
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("Loaded {TRAIN_ID} from cache")));

        env.cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains(TRAIN_ID));
    }

    #[test]
    fn fetch_no_cache_leaves_cache_empty() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", &env.location(), "--key", TRAIN_ID, "--no-cache"])
            .assert()
            .success()
            .stdout(predicate::str::contains("(not cached)"));
        assert!(!env.cache_dir().join(TRAIN_ID).exists());
    }

    #[test]
    fn fetch_with_wrong_flavor_fails() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", &env.location(), "--key", TRAIN_ID, "--flavor", "bytes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to load bytes artifact"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn fetch_invalid_location() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", "ftp://models/x", "--key", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid remote location"));
    }

    #[test]
    fn fetch_missing_prefix_publishes_nothing() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", "s3://models/churn/none", "--key", "none"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Transfer failed"));
        assert!(!is_cached(&env.cache_dir(), "none"));
    }

    #[test]
    fn fetch_without_storage_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[general]\nlog_format = \"text\"\n").unwrap();

        layer()
            .env("LAYER_CONFIG", &path)
            .args(["fetch", "s3://models/x", "--key", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Object storage is not configured"))
            .stderr(predicate::str::contains("storage.local_root"));
    }

    #[test]
    fn push_then_fetch() {
        let env = Env::new();
        let out = env.temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        FlavorKind::Bytes
            .flavor()
            .save_to_directory(&ModelObject::Bytes(vec![9u8; 64]), &out)
            .unwrap();

        env.cmd()
            .args(["push", out.to_str().unwrap(), "s3://models/blob/run-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Uploaded"));
        assert!(env
            .temp
            .path()
            .join("store/models/blob/run-1/model.bin")
            .is_file());

        env.cmd()
            .args(["fetch", "s3://models/blob/run-1", "--key", "run-1", "--flavor", "bytes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("binary blob, 64 B"));
    }

    #[test]
    fn cache_remove_and_clear() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", &env.location(), "--key", TRAIN_ID])
            .assert()
            .success();

        env.cmd()
            .args(["cache", "remove", TRAIN_ID])
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("Removed {TRAIN_ID}")));
        assert!(!is_cached(&env.cache_dir(), TRAIN_ID));

        env.cmd()
            .args(["fetch", &env.location(), "--key", TRAIN_ID])
            .assert()
            .success();

        // Without a terminal the prompt falls back to "no"
        env.cmd()
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("left untouched"));
        assert!(is_cached(&env.cache_dir(), TRAIN_ID));

        env.cmd()
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache cleared"));
        assert!(!env.cache_dir().exists());
    }

    #[test]
    fn cache_list_json() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", &env.location(), "--key", TRAIN_ID])
            .assert()
            .success();

        let output = env
            .cmd()
            .args(["cache", "list", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(entries[0]["key"], TRAIN_ID);
        assert_eq!(entries[0]["file_count"], 2);
    }

    #[test]
    fn dataset_fetch_then_hit() {
        let env = Env::new();
        let build = env.temp.path().join("store/datasets/titanic/b1");
        fs::create_dir_all(build.join("parts")).unwrap();
        fs::write(build.join("parts/0000.csv"), "id,survived\n1,0\n").unwrap();
        fs::write(build.join("schema.json"), "[\"id\"]").unwrap();

        env.cmd()
            .args(["dataset", "s3://datasets/titanic/b1", "--build", "b1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Fetched dataset b1"))
            .stdout(predicate::str::contains("parts/0000.csv"));
        assert!(is_cached(&env.cache_dir(), "b1"));

        fs::remove_dir_all(&build).unwrap();

        let output = env
            .cmd()
            .args(["dataset", "s3://datasets/titanic/b1", "--build", "b1", "-f", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let files: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(files[0]["name"], "parts/0000.csv");
        assert_eq!(files[1]["name"], "schema.json");
        assert_eq!(files[1]["size"], 6);
    }

    #[test]
    fn dataset_no_cache_leaves_cache_empty() {
        let env = Env::new();
        let build = env.temp.path().join("store/datasets/titanic/b2");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("data.csv"), "a\n").unwrap();

        env.cmd()
            .args(["dataset", "s3://datasets/titanic/b2", "--build", "b2", "--no-cache"])
            .assert()
            .success()
            .stdout(predicate::str::contains("(not cached)"))
            .stdout(predicate::str::contains("data.csv"));
        assert!(!env.cache_dir().join("b2").exists());
    }
}
