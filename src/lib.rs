// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod history;
pub mod logging;
pub mod morse;
pub mod playback;
pub mod runtime;
pub mod source;
pub mod stats;
pub mod timing;
pub mod tone;
pub mod util;

pub use error::DahditError;
