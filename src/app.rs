use crate::{chat, config, provider};
use provider::Provider;

/// Default model when neither flag nor config names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Resolution order for the session credential: flag, environment, config.
/// Returns the raw value; the format check happens at submission time.
pub fn resolve_api_key(flag: Option<&str>, cfg: Option<&config::Config>) -> Option<String> {
    flag.map(str::to_string)
        .or_else(|| {
            std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
        .or_else(|| cfg.and_then(|c| c.api_key.clone()))
}

/// Per-call options from flag and config, with the original defaults
/// (temperature 0.0, no system prompt).
pub fn turn_options(model_flag: Option<String>, cfg: Option<&config::Config>) -> chat::TurnOptions {
    let model = model_flag
        .or_else(|| cfg.and_then(|c| c.model.clone()))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let mut opts = chat::TurnOptions::new(model);
    opts.system_prompt = cfg.and_then(|c| c.system_prompt.clone());
    opts.temperature = cfg.and_then(|c| c.temperature).unwrap_or(0.0);
    opts
}

pub fn build_provider(
    http: &reqwest::Client,
    cfg: Option<&config::Config>,
    provider_name: &str,
) -> anyhow::Result<Box<dyn Provider + Send + Sync>> {
    match provider_name {
        "openai" => {
            #[cfg(feature = "openai")]
            {
                let p = match cfg.and_then(|c| c.base_url.as_deref()) {
                    Some(base) => provider::openai::OpenAiProvider::with_base(http.clone(), base)?,
                    None => provider::openai::OpenAiProvider::new(http.clone())?,
                };
                Ok(Box::new(p))
            }
            #[cfg(not(feature = "openai"))]
            {
                let _ = http;
                let _ = cfg;
                anyhow::bail!("openai provider is not enabled in this build")
            }
        }
        "stub" => Ok(Box::new(provider::stub::StubProvider::new())),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_config_for_api_key() {
        let cfg = config::Config {
            api_key: Some("sk-config".to_string()),
            ..Default::default()
        };
        let resolved = resolve_api_key(Some("sk-flag"), Some(&cfg));
        assert_eq!(resolved.as_deref(), Some("sk-flag"));
    }

    #[test]
    fn turn_options_fall_back_to_defaults() {
        let opts = turn_options(None, None);
        assert_eq!(opts.model, DEFAULT_MODEL);
        assert_eq!(opts.temperature, 0.0);
        assert!(opts.system_prompt.is_none());
    }

    #[test]
    fn turn_options_read_config() {
        let cfg = config::Config {
            model: Some("local-model".to_string()),
            system_prompt: Some("Be brief.".to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };
        let opts = turn_options(None, Some(&cfg));
        assert_eq!(opts.model, "local-model");
        assert_eq!(opts.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(opts.temperature, 0.3);
    }

    #[test]
    fn model_flag_beats_config() {
        let cfg = config::Config {
            model: Some("from-config".to_string()),
            ..Default::default()
        };
        let opts = turn_options(Some("from-flag".to_string()), Some(&cfg));
        assert_eq!(opts.model, "from-flag");
    }
}
