//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `leadsync_core` linkage.
//! - Optionally open the configured store and report how many leads it holds.
//! - Keep output deterministic for quick local sanity checks.

use leadsync_core::db::open_db_from_config;
use leadsync_core::{
    init_logging_from_config, sort_options, CoreConfig, LeadListQuery, RecordStore,
    SqliteRecordStore, StorePermissions,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("leadsync_core ping={}", leadsync_core::ping());
    println!("leadsync_core version={}", leadsync_core::core_version());
    let sorts = sort_options()
        .iter()
        .map(|option| option.value)
        .collect::<Vec<_>>()
        .join(",");
    println!("leadsync_core sort_options={sorts}");

    let Some(config_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match probe_store(&config_path) {
        Ok(count) => {
            println!("leadsync_core recent_leads={count}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("leadsync_core error={err}");
            ExitCode::FAILURE
        }
    }
}

fn probe_store(config_path: &str) -> Result<usize, Box<dyn Error>> {
    let config = CoreConfig::load(config_path)?;
    init_logging_from_config(&config.logging)?;

    let conn = open_db_from_config(&config.database)?;
    let store =
        SqliteRecordStore::with_permissions(&conn, StorePermissions::from(&config.permissions))?;
    let query = LeadListQuery {
        limit: Some(100),
        ..LeadListQuery::default()
    };
    Ok(store.list_leads(&query)?.len())
}
