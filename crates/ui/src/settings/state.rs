use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use folio_chat::config::{
    DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_TOKENS, DEFAULT_OWNER_NAME, DEFAULT_TEMPERATURE,
};
use folio_chat::{AgentConfig, PortfolioPrompt, Theme, default_greeting};
use folio_llm::{DEFAULT_CHAT_MODEL, Model, ProviderConfig, default_local_models};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_PROVIDER_ID: &str = "openai";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/v1";
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 800;
pub const SETTINGS_DIRECTORY_NAME: &str = "folio";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "FOLIO_";

const DEFAULT_PROFILE: &str = "Varun Patkar is a Data Engineer/Analyst based in Mumbai, India, \
exploring web development with Three.js and WebLLM and leveraging AI tools in his workflow. \
He has 2+ years of experience and 20+ completed projects. Skills: Python, SQL, Node.js, \
Express, Django, MongoDB, React, Next.js, Tailwind CSS, Three.js. Email: varunpatkar501@gmail.com.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ModelSettings {
    fn normalized(mut self) -> Option<Self> {
        self.model_id = self.model_id.trim().to_string();
        if self.model_id.is_empty() {
            return None;
        }
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        Some(self)
    }

    pub fn as_model(&self) -> Model {
        let mut model = if self.name.is_empty() {
            Model::from_id(self.model_id.clone())
        } else {
            Model::new(self.model_id.clone(), self.name.clone())
        };
        if !self.description.is_empty() {
            model = model.with_description(self.description.clone());
        }
        model
    }
}

impl From<&Model> for ModelSettings {
    fn from(model: &Model) -> Self {
        Self {
            model_id: model.id.clone(),
            name: model.name.clone(),
            description: model.description.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSettings {
    pub label: String,
    pub url: String,
}

/// Everything the widget host reads at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolioSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_models")]
    pub models: Vec<ModelSettings>,
    #[serde(default = "default_active_model")]
    pub active_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_owner_name")]
    pub owner_name: String,
    /// Empty means the stock greeting for `owner_name`.
    #[serde(default)]
    pub greeting: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_links")]
    pub links: Vec<LinkSettings>,
    #[serde(default)]
    pub initial_theme: Theme,
}

impl Default for FolioSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            endpoint: default_endpoint(),
            api_key: String::new(),
            models: default_models(),
            active_model: default_active_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_window: default_context_window(),
            settle_delay_ms: default_settle_delay_ms(),
            owner_name: default_owner_name(),
            greeting: String::new(),
            profile: default_profile(),
            links: default_links(),
            initial_theme: Theme::Light,
        }
    }
}

impl FolioSettings {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.provider_id, &self.endpoint, &self.api_key)
    }

    pub fn configured_models(&self) -> Vec<Model> {
        self.models.iter().map(ModelSettings::as_model).collect()
    }

    pub fn greeting(&self) -> String {
        if self.greeting.is_empty() {
            default_greeting(&self.owner_name)
        } else {
            self.greeting.clone()
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model_id: self.active_model.clone(),
            owner_name: self.owner_name.clone(),
            greeting: self.greeting(),
            context_window: self.context_window,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn prompt(&self) -> PortfolioPrompt {
        self.links.iter().fold(
            PortfolioPrompt::new(self.owner_name.clone(), self.profile.clone()),
            |prompt, link| prompt.with_link(link.label.clone(), link.url.clone()),
        )
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_string()
        };
        self.endpoint = if self.endpoint.trim().is_empty() {
            default_endpoint()
        } else {
            self.endpoint.trim().to_string()
        };
        self.api_key = self.api_key.trim().to_string();
        self.owner_name = if self.owner_name.trim().is_empty() {
            default_owner_name()
        } else {
            self.owner_name.trim().to_string()
        };
        self.greeting = self.greeting.trim().to_string();

        self.models = self
            .models
            .into_iter()
            .filter_map(ModelSettings::normalized)
            .collect();
        if self.models.is_empty() {
            self.models = default_models();
        }

        // The active model must be one of the listed ones.
        let active = self.active_model.trim();
        self.active_model = if self.models.iter().any(|model| model.model_id == active) {
            active.to_string()
        } else {
            self.models
                .first()
                .map(|model| model.model_id.clone())
                .unwrap_or_else(default_active_model)
        };

        if !self.temperature.is_finite() || self.temperature < 0.0 {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        self.context_window = self.context_window.max(1);
        self.links.retain(|link| {
            !link.label.trim().is_empty()
                && (link.url.starts_with("http://") || link.url.starts_with("https://"))
        });

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<FolioSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".folio"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<FolioSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: FolioSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Persists a new active model, keeping everything else.
    pub fn set_active_model(&self, model_id: &str) -> Result<(), SettingsError> {
        let mut settings = FolioSettings::clone(&self.settings());
        settings.active_model = model_id.to_string();
        self.update(settings)
    }

    fn load_from_disk(path: &Path) -> FolioSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let figment = Figment::from(Serialized::defaults(FolioSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<FolioSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                FolioSettings::default()
            }
        }
    }

    fn persist(&self, settings: &FolioSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_models() -> Vec<ModelSettings> {
    default_local_models().iter().map(ModelSettings::from).collect()
}

fn default_active_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u64 {
    DEFAULT_MAX_TOKENS
}

fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_owner_name() -> String {
    DEFAULT_OWNER_NAME.to_string()
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_links() -> Vec<LinkSettings> {
    [
        ("GitHub", "https://github.com/Varun-Patkar"),
        ("LinkedIn", "https://www.linkedin.com/in/varun-patkar/"),
        ("Twitter", "https://x.com/Varun_Patkar"),
    ]
    .into_iter()
    .map(|(label, url)| LinkSettings {
        label: label.to_string(),
        url: url.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let settings = store.settings();

        assert_eq!(settings.active_model, DEFAULT_CHAT_MODEL);
        assert_eq!(settings.context_window, 3);
        assert_eq!(settings.agent_config().settle_delay, Duration::from_millis(800));
        assert_eq!(settings.greeting(), default_greeting("Varun"));
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone());

        let mut settings = FolioSettings::clone(&store.settings());
        settings.owner_name = "  Ana ".to_string();
        settings.temperature = 0.2;
        store.update(settings).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let reloaded = SettingsStore::new(path).settings();
        assert_eq!(reloaded.owner_name, "Ana");
        assert_eq!(reloaded.temperature, 0.2);
        assert_eq!(reloaded.greeting(), default_greeting("Ana"));
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let settings = SettingsStore::new(path).settings();
        assert_eq!(*settings, FolioSettings::default());
    }

    #[test]
    fn normalization_repairs_active_model_and_links() {
        let settings = FolioSettings {
            models: vec![
                ModelSettings {
                    model_id: "  ".to_string(),
                    name: String::new(),
                    description: String::new(),
                },
                ModelSettings {
                    model_id: " tiny-model ".to_string(),
                    name: String::new(),
                    description: String::new(),
                },
            ],
            active_model: "gone-model".to_string(),
            context_window: 0,
            links: vec![LinkSettings {
                label: "Mail".to_string(),
                url: "mailto:x@y.z".to_string(),
            }],
            ..FolioSettings::default()
        }
        .normalized();

        assert_eq!(settings.models.len(), 1);
        assert_eq!(settings.active_model, "tiny-model");
        assert_eq!(settings.context_window, 1);
        assert!(settings.links.is_empty());
    }

    #[test]
    fn active_model_switch_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone());
        let other = store.settings().models[1].model_id.clone();

        store.set_active_model(&other).unwrap();

        assert_eq!(SettingsStore::new(path).settings().active_model, other);
    }
}
