use std::path::PathBuf;

use rusqlite::Connection;
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Shared by every handler through `State<Arc<AppState>>`. The connection is
/// the only shared mutable state; requests serialize on it.
pub struct AppState {
    pub workspace: PathBuf,
    pub db: Mutex<Connection>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(workspace: PathBuf, conn: Connection) -> Self {
        Self {
            workspace,
            db: Mutex::new(conn),
            build: BuildInfo {
                service: "schoold",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
