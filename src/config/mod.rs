use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::tools::hotels::MAX_HOTELS;

pub const PROJECT_CONFIG_DIR: &str = ".trip";

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_SEARCH_BASE_URL: &str = "https://serpapi.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub project_root: PathBuf,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub agent: LoopConfig,
    // Delay between words when printing a reply; 0 prints it at once
    pub stream_delay_ms: u64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: 0.0,
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            agent: LoopConfig::default(),
            stream_delay_ms: 0,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_base_ms: u64,
    pub retry_jitter_ms: u64,
    pub respect_retry_after: bool,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 60_000,
            max_retries: 3,
            retry_base_ms: 1000,
            retry_jitter_ms: 2000,
            respect_retry_after: true,
            timeout_ms: 120_000,
        }
    }
}

/// Settings for the search provider behind the flight and hotel tools.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub language: String,
    pub flights_country: String,
    pub flights_currency: String,
    pub hotels_country: String,
    pub hotels_currency: String,
    pub max_flights: usize,
    pub max_hotels: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
            api_key: None,
            timeout_ms: 30_000,
            language: "en".to_string(),
            flights_country: "us".to_string(),
            flights_currency: "USD".to_string(),
            hotels_country: "in".to_string(),
            hotels_currency: "INR".to_string(),
            max_flights: 5,
            max_hotels: 5,
        }
    }
}

/// Bounds on a single conversation turn.
#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    pub max_rounds: usize,
    pub session_timeout_ms: u64,
    pub tool_timeout_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            session_timeout_ms: 300_000,
            tool_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub llm: Option<PartialLlmConfig>,
    pub search: Option<PartialSearchConfig>,
    pub agent: Option<PartialLoopConfig>,
    pub stream_delay_ms: Option<u64>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialLlmConfig {
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_base_ms: Option<u64>,
    pub retry_jitter_ms: Option<u64>,
    pub respect_retry_after: Option<bool>,
    pub timeout_ms: Option<u64>,
}

impl PartialLlmConfig {
    /// Fields set in `self` win over `other`.
    fn or(self, other: PartialLlmConfig) -> PartialLlmConfig {
        PartialLlmConfig {
            connect_timeout_ms: self.connect_timeout_ms.or(other.connect_timeout_ms),
            request_timeout_ms: self.request_timeout_ms.or(other.request_timeout_ms),
            max_retries: self.max_retries.or(other.max_retries),
            retry_base_ms: self.retry_base_ms.or(other.retry_base_ms),
            retry_jitter_ms: self.retry_jitter_ms.or(other.retry_jitter_ms),
            respect_retry_after: self.respect_retry_after.or(other.respect_retry_after),
            timeout_ms: self.timeout_ms.or(other.timeout_ms),
        }
    }

    fn resolve(self) -> LlmConfig {
        let d = LlmConfig::default();
        LlmConfig {
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(d.connect_timeout_ms),
            request_timeout_ms: self.request_timeout_ms.unwrap_or(d.request_timeout_ms),
            max_retries: self.max_retries.unwrap_or(d.max_retries),
            retry_base_ms: self.retry_base_ms.unwrap_or(d.retry_base_ms),
            retry_jitter_ms: self.retry_jitter_ms.unwrap_or(d.retry_jitter_ms),
            respect_retry_after: self.respect_retry_after.unwrap_or(d.respect_retry_after),
            timeout_ms: self.timeout_ms.unwrap_or(d.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialSearchConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: Option<u64>,
    pub language: Option<String>,
    pub flights_country: Option<String>,
    pub flights_currency: Option<String>,
    pub hotels_country: Option<String>,
    pub hotels_currency: Option<String>,
    pub max_flights: Option<usize>,
    pub max_hotels: Option<usize>,
}

impl PartialSearchConfig {
    fn or(self, other: PartialSearchConfig) -> PartialSearchConfig {
        PartialSearchConfig {
            base_url: self.base_url.or(other.base_url),
            api_key: self.api_key.or(other.api_key),
            timeout_ms: self.timeout_ms.or(other.timeout_ms),
            language: self.language.or(other.language),
            flights_country: self.flights_country.or(other.flights_country),
            flights_currency: self.flights_currency.or(other.flights_currency),
            hotels_country: self.hotels_country.or(other.hotels_country),
            hotels_currency: self.hotels_currency.or(other.hotels_currency),
            max_flights: self.max_flights.or(other.max_flights),
            max_hotels: self.max_hotels.or(other.max_hotels),
        }
    }

    fn resolve(self) -> SearchConfig {
        let d = SearchConfig::default();
        SearchConfig {
            base_url: self.base_url.unwrap_or(d.base_url),
            api_key: self.api_key.or(d.api_key),
            timeout_ms: self.timeout_ms.unwrap_or(d.timeout_ms),
            language: self.language.unwrap_or(d.language),
            flights_country: self.flights_country.unwrap_or(d.flights_country),
            flights_currency: self.flights_currency.unwrap_or(d.flights_currency),
            hotels_country: self.hotels_country.unwrap_or(d.hotels_country),
            hotels_currency: self.hotels_currency.unwrap_or(d.hotels_currency),
            max_flights: self.max_flights.unwrap_or(d.max_flights).max(1),
            max_hotels: self
                .max_hotels
                .unwrap_or(d.max_hotels)
                .clamp(1, MAX_HOTELS),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialLoopConfig {
    pub max_rounds: Option<usize>,
    pub session_timeout_ms: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
}

impl PartialLoopConfig {
    fn or(self, other: PartialLoopConfig) -> PartialLoopConfig {
        PartialLoopConfig {
            max_rounds: self.max_rounds.or(other.max_rounds),
            session_timeout_ms: self.session_timeout_ms.or(other.session_timeout_ms),
            tool_timeout_ms: self.tool_timeout_ms.or(other.tool_timeout_ms),
        }
    }

    fn resolve(self) -> LoopConfig {
        let d = LoopConfig::default();
        LoopConfig {
            max_rounds: self.max_rounds.unwrap_or(d.max_rounds),
            session_timeout_ms: self.session_timeout_ms.unwrap_or(d.session_timeout_ms),
            tool_timeout_ms: self.tool_timeout_ms.unwrap_or(d.tool_timeout_ms),
        }
    }
}

/// Values that come from the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub max_rounds: Option<usize>,
    pub stream_delay_ms: Option<u64>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|v| v.parse::<T>().ok())
}

impl AppConfig {
    pub fn load(cli: CliOverrides) -> Result<Self> {
        let project_root = std::env::current_dir().context("resolve current dir")?;
        let project_cfg = load_project_config(&project_root).unwrap_or_default();
        let file_cfg = load_file_config().unwrap_or_default();
        Ok(Self::merge(cli, project_root, project_cfg, file_cfg))
    }

    /// Priority: CLI > env > project config > user config > defaults.
    pub fn merge(
        cli: CliOverrides,
        project_root: PathBuf,
        project_cfg: FileConfig,
        file_cfg: FileConfig,
    ) -> Self {
        let defaults = AppConfig::default();

        let api_key = cli
            .api_key
            .or_else(|| env_nonempty("GROQ_API_KEY"))
            .or_else(|| env_nonempty("OPENAI_API_KEY"))
            .or(project_cfg.api_key)
            .or(file_cfg.api_key);
        let base_url = cli
            .base_url
            .or_else(|| env_nonempty("OPENAI_BASE_URL"))
            .or(project_cfg.base_url)
            .or(file_cfg.base_url)
            .unwrap_or(defaults.base_url);
        let model = cli
            .model
            .or_else(|| env_nonempty("TRIP_MODEL"))
            .or(project_cfg.model)
            .or(file_cfg.model)
            .unwrap_or(defaults.model);
        let temperature = project_cfg
            .temperature
            .or(file_cfg.temperature)
            .unwrap_or(defaults.temperature);

        let llm = project_cfg
            .llm
            .unwrap_or_default()
            .or(file_cfg.llm.unwrap_or_default())
            .resolve();

        let mut search = project_cfg
            .search
            .unwrap_or_default()
            .or(file_cfg.search.unwrap_or_default())
            .resolve();
        if let Some(key) = env_nonempty("SERPAPI_API_KEY") {
            search.api_key = Some(key);
        }
        if let Some(url) = env_nonempty("SERPAPI_BASE_URL") {
            search.base_url = url;
        }

        let mut agent = project_cfg
            .agent
            .unwrap_or_default()
            .or(file_cfg.agent.unwrap_or_default())
            .resolve();
        if let Some(rounds) = cli.max_rounds.or_else(|| env_parse("TRIP_MAX_ROUNDS")) {
            agent.max_rounds = rounds;
        }

        let stream_delay_ms = cli
            .stream_delay_ms
            .or(project_cfg.stream_delay_ms)
            .or(file_cfg.stream_delay_ms)
            .unwrap_or(defaults.stream_delay_ms);
        let log_level = cli
            .log_level
            .or_else(|| env_nonempty("TRIP_LOG"))
            .or(project_cfg.log_level)
            .or(file_cfg.log_level)
            .unwrap_or(defaults.log_level);
        let log_file = cli
            .log_file
            .or(project_cfg.log_file)
            .or(file_cfg.log_file);

        Self {
            base_url,
            model,
            api_key,
            temperature,
            project_root,
            llm,
            search,
            agent,
            stream_delay_ms,
            log_level,
            log_file,
        }
    }
}

pub fn load_file_config() -> Result<FileConfig> {
    fn candidate_paths() -> Vec<PathBuf> {
        let mut v = Vec::new();
        if let Ok(p) = std::env::var("TRIP_PLANNER_CONFIG") {
            v.push(PathBuf::from(p));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            v.push(Path::new(&xdg_home).join("trip-planner/config.toml"));
        } else if let Some(dir) = dirs::config_dir() {
            v.push(dir.join("trip-planner/config.toml"));
        }
        v
    }

    for p in candidate_paths() {
        if p.exists() {
            let s = fs::read_to_string(&p)
                .with_context(|| format!("read config file: {}", p.display()))?;
            match toml::from_str::<FileConfig>(&s) {
                Ok(cfg) => {
                    info!(path=%p.display(), "loaded config file");
                    return Ok(cfg);
                }
                Err(e) => {
                    warn!(path=%p.display(), error=%e.to_string(), "parse config failed");
                    continue;
                }
            }
        }
    }
    Ok(FileConfig::default())
}

/// Load project-specific configuration from .trip/config.toml
pub fn load_project_config(project_root: &Path) -> Result<FileConfig> {
    let project_config_path = project_root.join(PROJECT_CONFIG_DIR).join("config.toml");

    if !project_config_path.exists() {
        return Ok(FileConfig::default());
    }
    let s = fs::read_to_string(&project_config_path).with_context(|| {
        format!(
            "read project config file: {}",
            project_config_path.display()
        )
    })?;
    match toml::from_str::<FileConfig>(&s) {
        Ok(cfg) => {
            info!(path=%project_config_path.display(), "loaded project config file");
            Ok(cfg)
        }
        Err(e) => {
            warn!(path=%project_config_path.display(), error=%e.to_string(), "parse project config failed");
            Ok(FileConfig::default())
        }
    }
}

#[cfg(test)]
mod tests;
