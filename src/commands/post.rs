// Post command: save the cache of a fresh build

use crate::cache::{self, BlobStore, LocalBlobStore, SaveOutcome};
use crate::config;
use crate::platform::Platform;
use crate::state::InstallState;
use crate::ui;
use anyhow::Result;
use log::info;
use std::path::Path;

pub async fn post() -> Result<()> {
    let store = LocalBlobStore::new(config::cache_dir()?);
    let temp_dir = config::temp_dir()?;
    let outcome = save_state(
        &store,
        &config::state_path()?,
        &temp_dir,
        Platform::current()?,
    )
    .await?;

    match outcome {
        Some(SaveOutcome::Saved) => ui::success("Cache saved"),
        Some(SaveOutcome::TooLarge(_)) => ui::warning("Install too large to cache"),
        Some(SaveOutcome::AlreadyReserved) => ui::action("Cache already exists"),
        None => info!("Nothing to cache"),
    }
    Ok(())
}

/// Save the install recorded in `state_path`, then forget it
async fn save_state(
    store: &dyn BlobStore,
    state_path: &Path,
    temp_dir: &Path,
    platform: Platform,
) -> Result<Option<SaveOutcome>> {
    let Some(state) = InstallState::load(state_path)? else {
        return Ok(None);
    };

    let key = state.cache_key(platform);
    let outcome = cache::save_install(store, &key, &state.install_path, temp_dir).await?;
    InstallState::remove(state_path)?;
    Ok(Some(outcome))
}
