use std::{
    env,
    fmt::Display,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use tracing::info;

pub const ENV_FILE: &str = ".env.local";
pub const DEFAULT_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_WORKSPACE: &str = "./data";
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173,\
     http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub workspace: PathBuf,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Read settings from the environment. Call [`load_env_file`] first so
    /// `.env.local` values are visible here.
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            addr: try_load("SCHOOLD_ADDR", DEFAULT_ADDR)?,
            workspace: try_load("SCHOOLD_WORKSPACE", DEFAULT_WORKSPACE)?,
            cors_origins: parse_origins(&var_or("SCHOOLD_CORS_ORIGINS", DEFAULT_CORS_ORIGINS)),
        })
    }
}

/// Load a dotenv file into the process environment when it exists.
/// Variables already set win. Runs before logging is up, so `RUST_LOG` may
/// come from the file.
pub fn load_env_file(path: &Path) -> bool {
    dotenvy::from_path(path).is_ok()
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var_or(key, default);
    raw.parse()
        .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value: {raw}"))
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_blanks_dropped() {
        assert_eq!(
            parse_origins(" http://a.test ,, http://b.test,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn env_file_is_loaded_without_overriding_set_vars() {
        let dir = std::env::temp_dir().join(format!("schoold-env-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join(ENV_FILE);
        std::fs::write(
            &path,
            "SCHOOLD_TEST_ENV_FILE_LOG=schoold=debug\nSCHOOLD_TEST_ENV_FILE_KEPT=from-file\n",
        )
        .expect("write env file");
        env::set_var("SCHOOLD_TEST_ENV_FILE_KEPT", "from-process");

        assert!(load_env_file(&path));
        assert_eq!(
            env::var("SCHOOLD_TEST_ENV_FILE_LOG").as_deref(),
            Ok("schoold=debug")
        );
        assert_eq!(
            env::var("SCHOOLD_TEST_ENV_FILE_KEPT").as_deref(),
            Ok("from-process")
        );
        assert!(!load_env_file(&dir.join("missing.env")));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn default_addr_parses() {
        let addr: SocketAddr = DEFAULT_ADDR.parse().expect("default addr");
        assert_eq!(addr.port(), 8787);
        assert_eq!(parse_origins(DEFAULT_CORS_ORIGINS).len(), 4);
    }
}
