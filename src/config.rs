//! Dashboard configuration
//!
//! Pipeline constants with their defaults, environment overrides and
//! validation. The CLI layers its own flags on top of `from_env`.

use crate::error::{DashboardError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Source values are recorded in thousands of USD.
pub const SOURCE_UNIT_SCALE: f64 = 1000.0;
pub const DEFAULT_EXCHANGE_RATE: f64 = 35.0;
/// Currency the loader converts into (USD -> THB at the exchange rate)
pub const CURRENCY_LABEL: &str = "THB";
pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_TOP_N_MONTHLY: usize = 3;
pub const DEFAULT_SCENARIO: &str = "FISHERY";
pub const DEFAULT_FOCUS_SPECIES: &str = "Catfishes";
pub const DEFAULT_OUTPUT_DIR: &str = "metrics_data";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;

/// Text-generation backend used by the summary generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI-compatible `/chat/completions` endpoint
    OpenAi,
    /// Google Gemini `generateContent` endpoint
    Gemini,
}

impl LlmProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4",
            LlmProvider::Gemini => "gemini-2.0-flash",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Provider-specific environment variable holding the API key
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "gemini" => Ok(LlmProvider::Gemini),
            other => Err(DashboardError::Config(format!(
                "Unknown LLM provider '{}' (expected 'openai' or 'gemini')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn for_provider(provider: LlmProvider) -> Self {
        Self {
            provider,
            api_key: None,
            model: provider.default_model().to_string(),
            base_url: provider.default_base_url().to_string(),
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::for_provider(LlmProvider::Gemini)
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Units of target currency per source currency unit
    pub exchange_rate: f64,
    /// Cutoff for the "top provinces" bar charts
    pub top_n: usize,
    /// Cutoff for the monthly comparison line charts
    pub top_n_monthly: usize,
    /// Prefix of every exported file name
    pub scenario: String,
    /// Pieaces value used by the unit-value-over-time chart
    pub focus_species: String,
    pub output_dir: PathBuf,
    pub llm: LlmConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            exchange_rate: DEFAULT_EXCHANGE_RATE,
            top_n: DEFAULT_TOP_N,
            top_n_monthly: DEFAULT_TOP_N_MONTHLY,
            scenario: DEFAULT_SCENARIO.to_string(),
            focus_species: DEFAULT_FOCUS_SPECIES.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            llm: LlmConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Build configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unset keys keep their defaults; set keys that fail to parse are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("FISHERY_EXCHANGE_RATE") {
            config.exchange_rate = parse_var("FISHERY_EXCHANGE_RATE", &v)?;
        }
        if let Some(v) = lookup("FISHERY_TOP_N") {
            config.top_n = parse_var("FISHERY_TOP_N", &v)?;
        }
        if let Some(v) = lookup("FISHERY_TOP_N_MONTHLY") {
            config.top_n_monthly = parse_var("FISHERY_TOP_N_MONTHLY", &v)?;
        }
        if let Some(v) = lookup("FISHERY_SCENARIO") {
            config.scenario = v;
        }
        if let Some(v) = lookup("FISHERY_FOCUS_SPECIES") {
            config.focus_species = v;
        }
        if let Some(v) = lookup("FISHERY_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }

        let provider = match lookup("LLM_PROVIDER") {
            Some(v) => v.parse::<LlmProvider>()?,
            None => LlmProvider::Gemini,
        };
        let mut llm = LlmConfig::for_provider(provider);
        if let Some(v) = lookup("LLM_MODEL") {
            llm.model = v;
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            llm.base_url = v;
        }
        if let Some(v) = lookup("LLM_TIMEOUT_SECS") {
            llm.timeout_secs = parse_var("LLM_TIMEOUT_SECS", &v)?;
        }
        llm.api_key = lookup("LLM_API_KEY").or_else(|| lookup(provider.api_key_var()));
        config.llm = llm;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.exchange_rate.is_finite() || self.exchange_rate <= 0.0 {
            return Err(DashboardError::Config(format!(
                "exchange rate must be a positive number, got {}",
                self.exchange_rate
            )));
        }
        if self.top_n == 0 || self.top_n_monthly == 0 {
            return Err(DashboardError::Config(
                "top-N cutoffs must be at least 1".to_string(),
            ));
        }
        if self.scenario.trim().is_empty() {
            return Err(DashboardError::Config("scenario tag must not be empty".to_string()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(DashboardError::Config("LLM timeout must be at least 1 second".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| DashboardError::Config(format!("Invalid value for {}: '{}'", key, value)))
}
