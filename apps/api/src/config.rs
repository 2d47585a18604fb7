use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::speech::proxy::ConfigPolicy;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173,\
    http://localhost:3000,http://127.0.0.1:3000";
const DEFAULT_CHAT_MODEL: &str = "doubao-seed-1-6-250615";
const DEFAULT_EXTRACTION_MODEL: &str = "doubao-seed-1-6-flash-250615";
const DEFAULT_STS_URL: &str = "https://openspeech.bytedance.com/api/v1/sts/token";
const DEFAULT_ASR_URL: &str = "wss://openspeech.bytedance.com/api/v3/sauc/bigmodel";
const DEFAULT_RESOURCE_ID: &str = "volc.bigasr.sauc.duration";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub extraction_model: String,
    pub port: u16,
    pub rust_log: String,
    pub cors_allowed_origins: Vec<String>,
    pub speech: SpeechConfig,
    pub audio_config_policy: ConfigPolicy,
    /// `None` disables the idle timeout.
    pub chat_idle_timeout: Option<Duration>,
    pub audio_idle_timeout: Option<Duration>,
}

/// Speech vendor endpoints and credentials for the audio proxy.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub app_id: Option<String>,
    pub access_key: Option<String>,
    pub sts_url: String,
    pub asr_url: String,
    pub resource_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let audio_config_policy = match var("AUDIO_CONFIG_POLICY").as_deref() {
            None | Some("strict") => ConfigPolicy::Strict,
            Some("synthesize") => ConfigPolicy::SynthesizeDefault,
            Some(other) => bail!("AUDIO_CONFIG_POLICY must be 'strict' or 'synthesize', got '{other}'"),
        };

        Ok(Config {
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_base_url: require("OPENAI_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            chat_model: var("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            extraction_model: var("EXTRACTION_MODEL")
                .unwrap_or_else(|| DEFAULT_EXTRACTION_MODEL.to_string()),
            port: var("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            cors_allowed_origins: split_origins(
                &var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()),
            ),
            speech: SpeechConfig {
                app_id: var("SPEECH_APP_ID"),
                access_key: var("SPEECH_ACCESS_KEY"),
                sts_url: var("SPEECH_STS_URL").unwrap_or_else(|| DEFAULT_STS_URL.to_string()),
                asr_url: var("SPEECH_ASR_URL").unwrap_or_else(|| DEFAULT_ASR_URL.to_string()),
                resource_id: var("SPEECH_RESOURCE_ID")
                    .unwrap_or_else(|| DEFAULT_RESOURCE_ID.to_string()),
            },
            audio_config_policy,
            chat_idle_timeout: parse_timeout(var("CHAT_IDLE_TIMEOUT_SECS"), 60)
                .context("CHAT_IDLE_TIMEOUT_SECS must be a whole number of seconds")?,
            audio_idle_timeout: parse_timeout(var("AUDIO_IDLE_TIMEOUT_SECS"), 300)
                .context("AUDIO_IDLE_TIMEOUT_SECS must be a whole number of seconds")?,
        })
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_timeout(raw: Option<String>, default_secs: u64) -> Result<Option<Duration>> {
    let secs = match raw {
        Some(v) => v.trim().parse::<u64>()?,
        None => default_secs,
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
