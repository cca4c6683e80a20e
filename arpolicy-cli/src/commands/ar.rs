//! `ar enable`, `ar disable` and `ar status`: the persisted AR opt-in.

use arpolicy::config::ConfigFile;
use arpolicy::preferences::{IniPreferenceStore, PreferenceStore, AR_ENABLED_KEY};
use clap::Subcommand;

use crate::error::CliError;

/// AR preference subcommands.
#[derive(Debug, Subcommand)]
pub enum ArCommands {
    /// Turn AR on for future sessions
    Enable,

    /// Turn AR off; hosts stay in non-AR mode
    Disable,

    /// Show whether AR is enabled
    Status,
}

pub fn run(command: ArCommands, config: &ConfigFile) -> Result<(), CliError> {
    let store = IniPreferenceStore::new(&config.preferences.file);
    match command {
        ArCommands::Enable => set(&store, true),
        ArCommands::Disable => set(&store, false),
        ArCommands::Status => {
            let enabled = store.get_bool(AR_ENABLED_KEY)?;
            println!(
                "AR is {} ({})",
                if enabled { "enabled" } else { "disabled" },
                store.path().display()
            );
            Ok(())
        }
    }
}

fn set(store: &IniPreferenceStore, enabled: bool) -> Result<(), CliError> {
    store.set_bool(AR_ENABLED_KEY, enabled)?;
    println!("Set {} = {}", AR_ENABLED_KEY, enabled);
    Ok(())
}
