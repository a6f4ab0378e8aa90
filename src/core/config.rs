use std::path::Path;

use serde::Deserialize;

use super::{AppCore, DEFAULT_AUTHOR_NAME, DEFAULT_COUNTERPART_NAME, DEFAULT_HISTORY_LIMIT};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) history_limit: Option<usize>,
    pub(super) counterpart_placeholder: Option<String>,
    pub(super) author_placeholder: Option<String>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("campus_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}

impl AppCore {
    /// Newest messages kept when seeding history.
    pub(super) fn history_limit(&self) -> usize {
        self.config.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub(super) fn counterpart_placeholder(&self) -> String {
        self.config
            .counterpart_placeholder
            .clone()
            .unwrap_or_else(|| DEFAULT_COUNTERPART_NAME.to_string())
    }

    pub(super) fn author_placeholder(&self) -> String {
        self.config
            .author_placeholder
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string())
    }
}
