pub mod api;
pub mod build;
pub mod config;
pub mod engine;
pub mod error;
pub mod locator;
pub mod metrics;
pub mod process;
pub mod search;
pub mod state;
pub mod types;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use metrics::{init_logging, init_metrics};
pub use search::SearchService;
pub use state::AppState;
