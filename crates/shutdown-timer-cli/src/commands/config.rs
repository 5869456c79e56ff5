use clap::Subcommand;
use shutdown_timer_core::{ConfigError, ConfigStore};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "shutdown.slider", "root_mode.enabled")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = ConfigStore::open()?;
    match action {
        ConfigAction::Get { key } => match store.config().get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(ConfigError::UnknownKey(key).into()),
        },
        ConfigAction::Set { key, value } => {
            store.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(store.config())?);
            } else {
                for (key, value) in store.config().list() {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::Reset => {
            store.reset()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
