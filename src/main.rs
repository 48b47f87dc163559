use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use topika::database::{Database, PersistenceMode};
use topika::error::{Result, TopikaError};

/// Engine settings, read from `topika.json` next to the binary. Everything
/// is optional; the default is an in-memory store.
#[derive(Debug, Deserialize, Default)]
struct Settings {
    /// Path of the SQLite database file; omit for an in-memory store.
    database: Option<String>,
}

fn load_settings() -> Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("topika").required(false))
        .add_source(config::Environment::with_prefix("TOPIKA"))
        .build()
        .map_err(|e| TopikaError::Config(e.to_string()))?;
    settings
        .try_deserialize()
        .map_err(|e| TopikaError::Config(e.to_string()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let settings = load_settings()?;
    let mode = match &settings.database {
        Some(path) => PersistenceMode::File(path.clone()),
        None => PersistenceMode::InMemory,
    };
    info!(?mode, "starting topika");
    let db = Database::new(mode)?;
    info!(
        constructs = db.construct_count(),
        locators = db.locator_count(),
        scopes = db.scope_count(),
        superhash = db.superhash().as_deref().unwrap_or("none"),
        "topic map ready"
    );
    Ok(())
}
