use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Language the recommendation should be written in.
    #[serde(default = "default_reply_language")]
    pub language: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_llm_model(),
            base_url: String::new(),
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            language: default_reply_language(),
        }
    }
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return &self.base_url;
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineConfig {
    #[serde(default)]
    pub channel_token: String,
    #[serde(default)]
    pub channel_secret: String,
    #[serde(default = "default_line_api_url")]
    pub api_url: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_token: String::new(),
            channel_secret: String::new(),
            api_url: default_line_api_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlacesConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_places_url")]
    pub base_url: String,
    /// Search radius in meters.
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_places_language")]
    pub language: String,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_places_url(),
            radius: default_radius(),
            language: default_places_language(),
        }
    }
}

/// Fallback search origin used when no per-user location is known.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct LocationConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommandConfig {
    pub command: String,
    pub keyword: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Present only when replies should go through the text-generation API.
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default = "default_commands")]
    pub commands: Vec<CommandConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line: LineConfig::default(),
            places: PlacesConfig::default(),
            location: LocationConfig::default(),
            server: ServerConfig::default(),
            llm: None,
            commands: default_commands(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

fn default_reply_language() -> String {
    "繁體中文".to_string()
}

fn default_line_api_url() -> String {
    "https://api.line.me/v2/bot".to_string()
}

fn default_places_url() -> String {
    "https://maps.googleapis.com/maps/api/place/nearbysearch/json".to_string()
}

fn default_radius() -> u32 {
    1000
}

fn default_places_language() -> String {
    "zh-TW".to_string()
}

fn default_latitude() -> f64 {
    24.5644
}

fn default_longitude() -> f64 {
    121.2220
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_commands() -> Vec<CommandConfig> {
    [("/想吃甜", "甜點", "🍰"), ("/想吃鹹", "小吃", "🍱"), ("/想喝飲料", "飲料", "🧋")]
        .into_iter()
        .map(|(command, keyword, icon)| CommandConfig {
            command: command.to_string(),
            keyword: keyword.to_string(),
            icon: icon.to_string(),
        })
        .collect()
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", name, value))
}

impl Config {
    /// Load `path` if it exists, overlay the process environment, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_lookup(path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`], reading variables through `lookup`.
    pub fn from_lookup<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Environment values win over anything read from the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LINE_TOKEN") {
            self.line.channel_token = v;
        }
        if let Some(v) = get("LINE_SECRET") {
            self.line.channel_secret = v;
        }
        if let Some(v) = get("GOOGLE_MAPS_API_KEY") {
            self.places.api_key = v;
        }
        if let Some(v) = get("SEARCH_RADIUS") {
            self.places.radius = parse_var("SEARCH_RADIUS", &v)?;
        }
        if let Some(v) = get("DEFAULT_LAT") {
            self.location.latitude = parse_var("DEFAULT_LAT", &v)?;
        }
        if let Some(v) = get("DEFAULT_LNG") {
            self.location.longitude = parse_var("DEFAULT_LNG", &v)?;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_var("PORT", &v)?;
        }

        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.get_or_insert_with(LlmConfig::default).api_key = key;
        }
        if let Some(llm) = self.llm.as_mut() {
            if let Some(v) = get("OPENAI_MODEL") {
                llm.model = v;
            }
            if let Some(v) = get("OPENAI_BASE_URL") {
                llm.base_url = v;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.line.channel_token.is_empty() {
            anyhow::bail!("Missing LINE channel token (set LINE_TOKEN or [line] channel_token)");
        }
        if self.line.channel_secret.is_empty() {
            anyhow::bail!("Missing LINE channel secret (set LINE_SECRET or [line] channel_secret)");
        }
        if self.places.api_key.is_empty() {
            anyhow::bail!(
                "Missing places API key (set GOOGLE_MAPS_API_KEY or [places] api_key)"
            );
        }
        if self.commands.is_empty() {
            anyhow::bail!("At least one [[commands]] entry is required");
        }
        Ok(())
    }

    /// Whether replies are delegated to the text-generation API.
    pub fn delegated_replies(&self) -> bool {
        self.llm.is_some()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("LINE_TOKEN", "token"),
            ("LINE_SECRET", "secret"),
            ("GOOGLE_MAPS_API_KEY", "maps-key"),
        ]
    }

    #[test]
    fn test_env_only_uses_defaults() {
        let config = Config::from_lookup(Path::new("does-not-exist.toml"), env(&required())).unwrap();
        assert_eq!(config.line.channel_secret, "secret");
        assert_eq!(config.places.radius, 1000);
        assert_eq!(config.places.language, "zh-TW");
        assert_eq!(config.location, LocationConfig { latitude: 24.5644, longitude: 121.2220 });
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.commands.len(), 3);
        assert!(!config.delegated_replies());
    }

    #[test]
    fn test_env_overrides_numbers() {
        let mut vars = required();
        vars.extend([("DEFAULT_LAT", "25.03"), ("DEFAULT_LNG", "121.56"), ("PORT", "8080"), ("SEARCH_RADIUS", "800")]);
        let config = Config::from_lookup(Path::new("does-not-exist.toml"), env(&vars)).unwrap();
        assert_eq!(config.location.latitude, 25.03);
        assert_eq!(config.location.longitude, 121.56);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.places.radius, 800);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut vars = required();
        vars.push(("PORT", "not-a-port"));
        let err = Config::from_lookup(Path::new("does-not-exist.toml"), env(&vars)).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let vars = [("LINE_TOKEN", "token"), ("GOOGLE_MAPS_API_KEY", "k")];
        let err = Config::from_lookup(Path::new("does-not-exist.toml"), env(&vars)).unwrap_err();
        assert!(err.to_string().contains("LINE_SECRET"));
    }

    #[test]
    fn test_openai_key_enables_delegated_mode() {
        let mut vars = required();
        vars.extend([("OPENAI_API_KEY", "sk-test"), ("OPENAI_MODEL", "gpt-4o")]);
        let config = Config::from_lookup(Path::new("does-not-exist.toml"), env(&vars)).unwrap();
        let llm = config.llm.as_ref().unwrap();
        assert!(config.delegated_replies());
        assert_eq!(llm.api_key, "sk-test");
        assert_eq!(llm.model, "gpt-4o");
        assert_eq!(llm.temperature, 0.7);
        assert_eq!(llm.max_tokens, 500);
        assert_eq!(llm.effective_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_parse_file_sections() {
        let toml = r#"
[line]
channel_token = "t"
channel_secret = "s"

[places]
api_key = "k"
radius = 800

[llm]
provider = "ollama"
model = "llama3"

[[commands]]
command = "/coffee"
keyword = "cafe"
icon = "☕"
"#;
        let mut config = Config::parse(toml).unwrap();
        config.apply_env(|_| None).unwrap();
        config.validate().unwrap();
        assert_eq!(config.places.radius, 800);
        assert_eq!(config.commands.len(), 1);
        assert_eq!(config.commands[0].keyword, "cafe");
        let llm = config.llm.unwrap();
        assert_eq!(llm.provider, LlmProvider::Ollama);
        assert_eq!(llm.effective_base_url(), "http://localhost:11434/v1");
        assert_eq!(config.line.api_url, "https://api.line.me/v2/bot");
    }

    #[test]
    fn test_blank_env_value_is_ignored() {
        let mut vars = required();
        vars.push(("DEFAULT_LAT", "  "));
        let config = Config::from_lookup(Path::new("does-not-exist.toml"), env(&vars)).unwrap();
        assert_eq!(config.location.latitude, 24.5644);
    }
}
