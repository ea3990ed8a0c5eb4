//! Process-wide default client.
//!
//! Prefer constructing a [`JwnetClient`] and passing it to callers explicitly.
//! This registry is a convenience for call sites that have no way to receive
//! one: the first call to [`client`] builds the default client from `JWNET_*`
//! environment variables and later calls share it.
//!
//! [`install`] and [`reset`] exist for test harnesses. A call that already
//! obtained the client keeps its own `Arc`, so a swap never affects calls in
//! flight. Beyond that, swapping while other tasks are using the registry is
//! unsupported: install doubles before concurrent work starts and reset after
//! it ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;

use crate::client::{JwnetClient, ManifestApi};
use crate::config::Config;
use crate::error::ApiError;
use crate::runtime::{RealRuntime, Runtime};

static DEFAULT_CLIENT: Mutex<Option<Arc<dyn ManifestApi>>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<Arc<dyn ManifestApi>>> {
    DEFAULT_CLIENT
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Returns the default client, building it from the process environment on
/// first use. Configuration errors are returned and not cached.
pub fn client() -> Result<Arc<dyn ManifestApi>, ApiError> {
    client_from(&RealRuntime)
}

/// Like [`client`], reading configuration through `runtime`.
pub fn client_from<R: Runtime + ?Sized>(runtime: &R) -> Result<Arc<dyn ManifestApi>, ApiError> {
    let mut slot = slot();
    if let Some(existing) = slot.as_ref() {
        return Ok(Arc::clone(existing));
    }

    let config = Config::from_env(runtime)?;
    info!("Creating default JWNET client for {}", config.api_url());
    let created: Arc<dyn ManifestApi> = Arc::new(JwnetClient::new(config)?);
    *slot = Some(Arc::clone(&created));
    Ok(created)
}

/// Replaces the default client, returning the previous one.
pub fn install(client: Arc<dyn ManifestApi>) -> Option<Arc<dyn ManifestApi>> {
    slot().replace(client)
}

/// Drops the default client; the next [`client`] call builds a fresh one.
pub fn reset() {
    slot().take();
}
