//! Loader for `brochure.yaml` with environment overlays.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. built-in defaults (serde defaults on every section)
//! 2. `<config dir>/brochure/brochure.yaml`, when present
//! 3. files and inline YAML added with [`BrochureConfigLoader::with_file`] /
//!    [`BrochureConfigLoader::with_yaml_str`]
//! 4. `BROCHURE_`-prefixed environment variables, `__` between path segments
//!    (`BROCHURE_LLM__MODEL=phi3`)
//! 5. explicit overrides from [`BrochureConfigLoader::with_override`]
//!
//! String values then go through `${VAR}` expansion.
use brochure_common::{DEFAULT_MAX_PROMPT_CHARS, LlmConfig};
use brochure_common::observability::{LogConfig, LogFormat};
use brochure_llm::links::UrlPolicy;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const DEFAULT_PROVIDER: &str = "ollama";

pub const ENV_PREFIX: &str = "BROCHURE";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BrochureConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub brochure: BrochureSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FetchConfig {
    /// `None` keeps the fetcher's browser-like default.
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl FetchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrochureSettings {
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default)]
    pub url_policy: UrlPolicy,
}

impl Default for BrochureSettings {
    fn default() -> Self {
        Self {
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            url_policy: UrlPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub stderr: bool,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            stderr: true,
            filter: default_filter(),
            dir: None,
        }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self, app_name: &'static str) -> LogConfig {
        LogConfig {
            app_name,
            log_dir: self.dir.clone(),
            emit_stderr: self.stderr,
            format: self.format,
            default_filter: self.filter.clone(),
        }
    }
}

fn default_max_prompt_chars() -> usize {
    DEFAULT_MAX_PROMPT_CHARS
}
fn default_true() -> bool {
    true
}
fn default_filter() -> String {
    "info".into()
}

/// `<config dir>/brochure/brochure.yaml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("brochure").join("brochure.yaml"))
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// An `llm` section given only partially (say, just a model from the
/// environment) is read as an Ollama section.
fn default_llm_provider(v: &mut Value) {
    if let Some(llm) = v.get_mut("llm").and_then(Value::as_object_mut) {
        llm.entry("provider")
            .or_insert_with(|| Value::String(DEFAULT_PROVIDER.into()));
    }
}

fn validate(cfg: &BrochureConfig) -> Result<(), ConfigError> {
    if cfg.brochure.max_prompt_chars == 0 {
        return Err(ConfigError::Message(
            "brochure.max_prompt_chars must be greater than zero".into(),
        ));
    }
    if let LlmConfig::OpenAi { auth_token, .. } = &cfg.llm {
        if auth_token.contains("${") {
            return Err(ConfigError::Message(format!(
                "llm.auth_token references an unset variable: {auth_token}"
            )));
        }
    }
    Ok(())
}

/// Builder hiding the `config` crate wiring.
pub struct BrochureConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for BrochureConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BrochureConfigLoader {
    /// Built-in defaults only; environment variables are layered on at [`load`](Self::load).
    ///
    /// ```
    /// use brochure_config::BrochureConfigLoader;
    ///
    /// let cfg = BrochureConfigLoader::new()
    ///     .with_yaml_str("llm:\n  model: qwen2.5\nbrochure:\n  max_prompt_chars: 800")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(cfg.llm.provider_name(), "ollama");
    /// assert_eq!(cfg.llm.model(), Some("qwen2.5"));
    /// assert_eq!(cfg.brochure.max_prompt_chars, 800);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Merge the per-user file from [`default_config_path`] when it exists.
    pub fn with_default_file(mut self) -> Self {
        if let Some(path) = default_config_path() {
            self.builder = self
                .builder
                .add_source(File::from(path).format(FileFormat::Yaml).required(false));
        }
        self
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    /// Loading fails if the file is missing.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Force `key` (dotted path, e.g. `llm.model`) regardless of every other source.
    pub fn with_override<V>(mut self, key: &str, value: V) -> Result<Self, ConfigError>
    where
        V: Into<config::Value>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Merge all sources, expand `${VAR}` placeholders and deserialize.
    pub fn load(self) -> Result<BrochureConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);
        default_llm_provider(&mut v);

        let typed: BrochureConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate(&typed)?;
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("BROCHURE_TEST_HOST", Some("ollama.lan"), || {
            let mut v = json!("http://${BROCHURE_TEST_HOST}:11434");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("http://ollama.lan:11434"));
        });
    }

    #[test]
    fn expands_nested_values_and_leaves_scalars() {
        temp_env::with_vars([("KEY_A", Some("sk-a")), ("DIR_B", Some("/var/log"))], || {
            let mut v = json!({
                "llm": { "auth_token": "$KEY_A" },
                "logging": { "dir": "${DIR_B}/brochure", "stderr": true },
                "list": ["${KEY_A}", 3, null]
            });
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!({
                    "llm": { "auth_token": "sk-a" },
                    "logging": { "dir": "/var/log/brochure", "stderr": true },
                    "list": ["sk-a", 3, null]
                })
            );
        });
    }

    #[test]
    fn expansion_follows_references_and_stops_on_cycles() {
        temp_env::with_vars(
            [
                ("INNER", Some("key")),
                ("OUTER", Some("sk-${INNER}")),
                ("LOOP_A", Some("${LOOP_B}")),
                ("LOOP_B", Some("${LOOP_A}")),
            ],
            || {
                let mut v = json!("${OUTER}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("sk-key"));

                let mut v = json!("x-${LOOP_A}");
                expand_env_in_value(&mut v);
                assert!(v.as_str().unwrap().contains("${"));
            },
        );
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("${BROCHURE_TEST_NOT_SET}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("${BROCHURE_TEST_NOT_SET}"));
    }

    #[test]
    fn partial_llm_section_defaults_to_ollama() {
        let mut v = json!({ "llm": { "model": "phi3" } });
        default_llm_provider(&mut v);
        assert_eq!(v["llm"]["provider"], json!("ollama"));

        let mut v = json!({ "llm": { "provider": "openai" } });
        default_llm_provider(&mut v);
        assert_eq!(v["llm"]["provider"], json!("openai"));
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let cfg: BrochureConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg, BrochureConfig::default());
        assert_eq!(cfg.brochure.max_prompt_chars, DEFAULT_MAX_PROMPT_CHARS);
        assert_eq!(DEFAULT_MAX_PROMPT_CHARS, 5000);
        assert_eq!(cfg.brochure.url_policy, UrlPolicy::Strict);
        assert!(cfg.logging.stderr);
        assert_eq!(cfg.fetch.timeout(), None);
    }

    #[test]
    fn rejects_zero_prompt_budget() {
        let mut cfg = BrochureConfig::default();
        cfg.brochure.max_prompt_chars = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_unexpanded_openai_token() {
        let cfg = BrochureConfig {
            llm: LlmConfig::OpenAi {
                model: "gpt-4o-mini".into(),
                auth_token: "${BROCHURE_TEST_NOT_SET}".into(),
                endpoint: "https://api.openai.com/v1".into(),
                temperature: None,
                max_tokens: None,
            },
            ..BrochureConfig::default()
        };
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("llm.auth_token"));
    }
}
