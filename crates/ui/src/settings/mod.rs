pub mod state;

pub use state::{FolioSettings, LinkSettings, ModelSettings, SettingsError, SettingsStore};
