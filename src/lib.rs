pub mod app;
pub mod baths;
pub mod challenge;
pub mod config;
pub mod errors;
pub mod friends;
pub mod handlers;
pub mod models;
pub mod profiles;
pub mod stats;
pub mod state;
pub mod storage;
pub mod validation;

pub use app::router;
pub use config::{AppConfig, Clock};
pub use state::AppState;
pub use storage::{JsonStore, Store};
