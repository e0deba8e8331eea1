mod handlers;
mod helpers;
mod router;
mod types;

pub use router::build_router;
pub use types::{AppState, BuildInfo};
