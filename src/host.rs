//! Runtime host
//!
//! Brings a single worker process to a running state with a writable
//! persistence location and deterministic output behavior. The host
//! provisions the data directory, spawns exactly one worker, blocks until
//! it exits and propagates its exit code. There is no restart or backoff:
//! a worker that dies takes the host down with it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

use crate::config::{flag_enabled, DEFAULT_DATABASE_PATH};

/// Name of the worker executable looked up next to the host binary.
const WORKER_BIN: &str = "gatebot-worker";

/// Host errors
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to provision data directory {path}: {source}")]
    Provisioning {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to start worker `{command}`: {source}")]
    Startup {
        command: String,
        source: std::io::Error,
    },
    #[error("failed waiting on worker: {0}")]
    Wait(std::io::Error),
}

/// Runtime host configuration, parsed once at process entry.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Path the worker must open/create its persistent store at.
    pub database_path: PathBuf,
    /// When enabled, the worker is told to stream its output line by line
    /// so externally captured logs appear in real time.
    pub unbuffered_output: bool,
    /// Override for the worker command line (whitespace-split). When unset,
    /// the `gatebot-worker` binary next to the host executable is used.
    pub worker_command: Option<Vec<String>>,
}

impl HostConfig {
    /// Parse configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Parse configuration from an explicit key-value map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let database_path = vars
            .get("DATABASE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let unbuffered_output = flag_enabled(vars.get("UNBUFFERED_OUTPUT").map(String::as_str));

        let worker_command = vars
            .get("WORKER_COMMAND")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .filter(|argv: &Vec<String>| !argv.is_empty());

        Self {
            database_path,
            unbuffered_output,
            worker_command,
        }
    }

    /// The worker command line to spawn: the configured override, or the
    /// sibling worker binary, falling back to a `PATH` lookup.
    pub fn resolved_worker_command(&self) -> Vec<String> {
        if let Some(argv) = &self.worker_command {
            return argv.clone();
        }
        let sibling = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BIN)));
        match sibling {
            Some(path) if path.exists() => vec![path.to_string_lossy().into_owned()],
            _ => vec![WORKER_BIN.to_string()],
        }
    }
}

/// Ensure the directory that will hold the persistent store exists and is
/// writable. Idempotent: succeeds whether or not the directory already
/// exists. The store file itself is created by the worker on first use.
pub fn provision_data_dir(config: &HostConfig) -> Result<PathBuf, HostError> {
    let dir = match config.database_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    fs::create_dir_all(&dir).map_err(|source| HostError::Provisioning {
        path: dir.clone(),
        source,
    })?;
    probe_writable(&dir).map_err(|source| HostError::Provisioning {
        path: dir.clone(),
        source,
    })?;

    Ok(dir)
}

/// The worker must be able to create its store file here, so a create-only
/// check is not enough after `create_dir_all` short-circuits on an existing
/// directory.
fn probe_writable(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(".gatebot-write-probe");
    fs::write(&probe, b"")?;
    fs::remove_file(&probe)
}

/// Provision the data directory, start exactly one worker and wait for it.
/// Returns the worker's exit code unmodified; death by signal maps to 1.
pub async fn run(config: &HostConfig) -> Result<i32, HostError> {
    let data_dir = provision_data_dir(config)?;
    tracing::info!(dir = %data_dir.display(), "data directory ready");

    let argv = config.resolved_worker_command();
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .env("DATABASE_PATH", &config.database_path)
        .env(
            "UNBUFFERED_OUTPUT",
            if config.unbuffered_output { "1" } else { "0" },
        );
    // stdout/stderr stay inherited: the host adds no buffering layer of its
    // own between the worker and whatever captures the output.

    let mut child = cmd.spawn().map_err(|source| HostError::Startup {
        command: argv.join(" "),
        source,
    })?;
    tracing::info!(pid = child.id(), command = %argv.join(" "), "worker started");

    let status = child.wait().await.map_err(HostError::Wait)?;
    let code = status.code().unwrap_or(1);
    tracing::info!(code, "worker exited");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config_for(db_path: PathBuf) -> HostConfig {
        HostConfig {
            database_path: db_path,
            unbuffered_output: true,
            worker_command: None,
        }
    }

    #[test]
    fn test_default_config() {
        let config = HostConfig::from_vars(&HashMap::new());
        assert_eq!(
            config.database_path,
            PathBuf::from("/app/data/bot_database.db")
        );
        assert!(config.unbuffered_output);
        assert!(config.worker_command.is_none());
    }

    #[test]
    fn test_config_from_vars() {
        let config = HostConfig::from_vars(&vars(&[
            ("DATABASE_PATH", "/var/lib/bot/state.db"),
            ("UNBUFFERED_OUTPUT", "0"),
            ("WORKER_COMMAND", "python3 -u main.py"),
        ]));
        assert_eq!(config.database_path, PathBuf::from("/var/lib/bot/state.db"));
        assert!(!config.unbuffered_output);
        assert_eq!(
            config.worker_command,
            Some(vec![
                "python3".to_string(),
                "-u".to_string(),
                "main.py".to_string()
            ])
        );
    }

    #[test]
    fn test_blank_worker_command_is_ignored() {
        let config = HostConfig::from_vars(&vars(&[("WORKER_COMMAND", "   ")]));
        assert!(config.worker_command.is_none());
    }

    #[test]
    fn test_provisioning_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path().join("data").join("bot.db"));

        let first = provision_data_dir(&config).unwrap();
        assert!(first.is_dir());
        // Second run must succeed with the directory already present.
        let second = provision_data_dir(&config).unwrap();
        assert_eq!(first, second);
        assert!(second.is_dir());
    }

    #[test]
    fn test_provisioning_fails_on_unwritable_parent() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where a directory is needed blocks creation for
        // any uid, unlike a permissions-based check.
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let config = config_for(blocker.join("data").join("bot.db"));

        let err = provision_data_dir(&config).unwrap_err();
        assert!(matches!(err, HostError::Provisioning { .. }));
    }

    #[tokio::test]
    async fn test_worker_exit_code_is_propagated() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for(tmp.path().join("bot.db"));

        config.worker_command = Some(vec!["sh".into(), "-c".into(), "exit 7".into()]);
        assert_eq!(run(&config).await.unwrap(), 7);

        config.worker_command = Some(vec!["sh".into(), "-c".into(), "exit 0".into()]);
        assert_eq!(run(&config).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_database_path_is_passed_to_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("seen-path");
        let mut config = config_for(tmp.path().join("store").join("bot.db"));
        config.worker_command = Some(vec![
            "sh".into(),
            "-c".into(),
            format!("printf %s \"$DATABASE_PATH\" > {}", out.display()),
        ]);

        assert_eq!(run(&config).await.unwrap(), 0);
        let seen = fs::read_to_string(&out).unwrap();
        assert_eq!(PathBuf::from(seen), config.database_path);
    }

    #[tokio::test]
    async fn test_buffering_toggle_is_passed_to_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("seen-flag");
        let mut config = config_for(tmp.path().join("bot.db"));
        config.unbuffered_output = false;
        config.worker_command = Some(vec![
            "sh".into(),
            "-c".into(),
            format!("printf %s \"$UNBUFFERED_OUTPUT\" > {}", out.display()),
        ]);

        assert_eq!(run(&config).await.unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "0");
    }

    #[tokio::test]
    async fn test_missing_worker_is_a_startup_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for(tmp.path().join("bot.db"));
        config.worker_command = Some(vec!["gatebot-no-such-worker-binary".into()]);

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, HostError::Startup { .. }));
    }

    #[tokio::test]
    async fn test_worker_never_starts_when_provisioning_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let marker = tmp.path().join("worker-ran");
        let mut config = config_for(blocker.join("bot.db"));
        config.worker_command = Some(vec![
            "sh".into(),
            "-c".into(),
            format!("touch {}", marker.display()),
        ]);

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, HostError::Provisioning { .. }));
        assert!(!marker.exists());
    }
}
