use clap::Subcommand;
use tomato_core::SettingsStore;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a setting (e.g. "timer.focus_duration", "notifications.enabled")
    Get {
        /// Dot-separated key
        key: String,
    },
    /// Set a setting
    Set {
        /// Dot-separated key
        key: String,
        /// New value
        value: String,
    },
    /// List all settings as JSON
    List,
    /// Reset settings to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = SettingsStore::open()?;

    match action {
        ConfigAction::Get { key } => match store.snapshot().get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(format!("unknown key: {key}").into()),
        },
        ConfigAction::Set { key, value } => {
            let settings = store.set(&key, &value)?;
            let stored = settings.get(&key).unwrap_or(value);
            println!("{key} = {stored}");
        }
        ConfigAction::List => {
            println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        }
        ConfigAction::Reset => {
            store.reset()?;
            println!("settings reset to defaults");
        }
    }
    Ok(())
}
