pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod types;

pub use client::{JwnetClient, ManifestApi};
pub use config::{Config, ConfigOptions};
pub use error::{ApiError, Diagnostic, ErrorKind};
pub use retry::RetryPolicy;
pub use tokio_util::sync::CancellationToken;
