use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::paths::AppPaths;
use super::settings::RagSettings;
use super::validation::validate_config;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("LEGAL_RAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Public config merged with secrets, as raw JSON.
    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        Ok(deep_merge(&public_config, &secrets_config))
    }

    /// Loads, overrides from the environment, validates and types the configuration.
    pub fn load_settings(&self) -> Result<RagSettings, ApiError> {
        let mut config = self.load_config()?;
        apply_env_overrides(&mut config, |key| env::var(key).ok());
        self.settings_from_value(config)
    }

    pub fn settings_from_value(&self, config: Value) -> Result<RagSettings, ApiError> {
        validate_config(&config)?;
        let mut settings: RagSettings = serde_json::from_value(config)
            .map_err(|e| ApiError::BadRequest(format!("Invalid config: {}", e)))?;

        settings.document.path = self.paths.resolve(&settings.document.path);
        settings.index.path = self.paths.resolve(&settings.index.path);
        Ok(settings)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, ApiError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(ApiError::internal)?;
    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_yaml::from_str::<Value>(&contents) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(_) => Err(ApiError::BadRequest(format!(
            "Invalid config file {}: expected a mapping at the top level",
            path.display()
        ))),
        Err(e) => Err(ApiError::BadRequest(format!(
            "Invalid config file {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Provider keys and the listen port may come from the environment; file values win for keys.
fn apply_env_overrides<F>(config: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(root) = config.as_object_mut() else {
        return;
    };

    for section in ["embedding", "generation"] {
        let entry = root
            .entry(section.to_string())
            .or_insert_with(|| json!({}));
        let Some(map) = entry.as_object_mut() else {
            continue;
        };

        let has_key = map
            .get("api_key")
            .and_then(Value::as_str)
            .is_some_and(|key| !key.trim().is_empty());
        if has_key {
            continue;
        }

        let provider = map
            .get("provider")
            .and_then(Value::as_str)
            .unwrap_or("gemini");
        let env_key = if provider == "gemini" {
            "GOOGLE_API_KEY"
        } else {
            "OPENAI_API_KEY"
        };
        if let Some(key) = lookup(env_key).filter(|key| !key.trim().is_empty()) {
            map.insert("api_key".to_string(), Value::String(key));
        }
    }

    if let Some(port) = lookup("PORT").and_then(|val| val.parse::<u16>().ok()) {
        let server = root.entry("server".to_string()).or_insert_with(|| json!({}));
        if let Some(map) = server.as_object_mut() {
            map.insert("port".to_string(), json!(port));
        }
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProviderKind;

    fn service_in(dir: &Path) -> ConfigService {
        ConfigService::new(Arc::new(AppPaths::with_dirs(
            dir.to_path_buf(),
            dir.to_path_buf(),
        )))
    }

    #[test]
    fn deep_merge_overrides_nested_keys_only() {
        let base = json!({ "embedding": { "model": "a", "batch_size": 10 }, "x": 1 });
        let secrets = json!({ "embedding": { "api_key": "k" } });
        let merged = deep_merge(&base, &secrets);

        assert_eq!(merged["embedding"]["model"], "a");
        assert_eq!(merged["embedding"]["batch_size"], 10);
        assert_eq!(merged["embedding"]["api_key"], "k");
        assert_eq!(merged["x"], 1);
    }

    #[test]
    fn env_keys_fill_missing_api_keys_per_provider() {
        let mut config = json!({
            "embedding": { "provider": "gemini" },
            "generation": { "provider": "openai", "api_key": "from-file" }
        });
        apply_env_overrides(&mut config, |key| match key {
            "GOOGLE_API_KEY" => Some("google".to_string()),
            "OPENAI_API_KEY" => Some("openai".to_string()),
            "PORT" => Some("8081".to_string()),
            _ => None,
        });

        assert_eq!(config["embedding"]["api_key"], "google");
        assert_eq!(config["generation"]["api_key"], "from-file");
        assert_eq!(config["server"]["port"], 8081);
    }

    #[test]
    fn loads_yaml_with_secrets_and_resolves_paths() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("config.yml"),
            "document:\n  path: data/act.pdf\nchunking:\n  chunk_size: 400\n  chunk_overlap: 40\ngeneration:\n  provider: openai\n  model: gpt-4o-mini\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("secrets.yaml"),
            "generation:\n  api_key: sk-test\n",
        )
        .unwrap();

        let service = service_in(tmp.path());
        let raw = service.load_config().unwrap();
        let settings = service.settings_from_value(raw).unwrap();

        assert_eq!(settings.document.path, tmp.path().join("data/act.pdf"));
        assert_eq!(settings.index.path, tmp.path().join("db/rag_index.db"));
        assert_eq!(settings.chunking.chunk_size, 400);
        assert_eq!(settings.generation.provider, ProviderKind::OpenAiCompatible);
        assert_eq!(settings.generation.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn invalid_yaml_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.yml"), "- just\n- a list\n").unwrap();

        let service = service_in(tmp.path());
        assert!(matches!(service.load_config(), Err(ApiError::BadRequest(_))));
    }
}
