//! Solrfeed Core - Shared infrastructure for search-index feeders
//!
//! Blocking HTTP transport over a shared runtime, logging that cooperates
//! with progress bars, and signal-driven graceful shutdown.

pub mod http;
pub mod logging;
pub mod progress;
pub mod shutdown;

// Re-exports for convenience
pub use http::{HttpConfig, HttpError, build_client, post_json};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_count};
pub use shutdown::{INTERRUPTED_EXIT_CODE, install_signal_handlers, shutdown_flag};
