use std::env;
use thiserror::Error;

/// Placeholder policy ids that ship in sample env files. A deployment still
/// carrying one of these has not been wired to a real marketplace account.
const PLACEHOLDER_POLICY_IDS: &[&str] = &["1234567890", "9876543210", "5432109876"];

const DEFAULT_EBAY_BASE_URL: &str = "https://api.sandbox.ebay.com/sell/inventory/v1";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    #[error("{0} is still set to a placeholder policy id")]
    PlaceholderPolicy(&'static str),
}

/// The three seller policies every offer references. Read once at startup,
/// never regenerated by the pipeline.
#[derive(Debug, Clone)]
pub struct PolicySet {
    pub fulfillment_policy_id: String,
    pub payment_policy_id: String,
    pub return_policy_id: String,
}

#[derive(Debug, Clone)]
pub struct EbayConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub marketplace_id: String,
    pub policies: PolicySet,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Everything the pipeline needs, snapshotted from the environment at
/// startup and handed to the orchestrator at construction. Nothing else in
/// the crate reads marketplace or vision settings from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ebay: EbayConfig,
    pub vision: VisionConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            ebay: EbayConfig {
                base_url: env_or("EBAY_BASE_URL", DEFAULT_EBAY_BASE_URL),
                bearer_token: env::var("EBAY_TOKEN").unwrap_or_default(),
                marketplace_id: env_or("EBAY_MARKETPLACE_ID", "EBAY_US"),
                policies: PolicySet {
                    fulfillment_policy_id: env::var("EBAY_FULFILLMENT_POLICY_ID")
                        .unwrap_or_default(),
                    payment_policy_id: env::var("EBAY_PAYMENT_POLICY_ID").unwrap_or_default(),
                    return_policy_id: env::var("EBAY_RETURN_POLICY_ID").unwrap_or_default(),
                },
            },
            vision: VisionConfig {
                base_url: env_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
                api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
                model: env_or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            },
        }
    }

    /// Pre-flight check run before any remote call is attempted. A missing
    /// credential or policy id fails the invocation here, with zero
    /// marketplace traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ebay.bearer_token.trim().is_empty() {
            return Err(ConfigError::Missing("EBAY_TOKEN"));
        }
        if self.vision.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("GEMINI_API_KEY"));
        }
        let policies = [
            (
                "EBAY_FULFILLMENT_POLICY_ID",
                &self.ebay.policies.fulfillment_policy_id,
            ),
            (
                "EBAY_PAYMENT_POLICY_ID",
                &self.ebay.policies.payment_policy_id,
            ),
            ("EBAY_RETURN_POLICY_ID", &self.ebay.policies.return_policy_id),
        ];
        for (name, value) in policies {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
            if PLACEHOLDER_POLICY_IDS.contains(&value.trim()) {
                return Err(ConfigError::PlaceholderPolicy(name));
            }
        }
        Ok(())
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        ebay: EbayConfig {
            base_url: DEFAULT_EBAY_BASE_URL.to_string(),
            bearer_token: "v^1.1#token".to_string(),
            marketplace_id: "EBAY_US".to_string(),
            policies: PolicySet {
                fulfillment_policy_id: "6055772000".to_string(),
                payment_policy_id: "6055773000".to_string(),
                return_policy_id: "6055774000".to_string(),
            },
        },
        vision: VisionConfig {
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            api_key: "gemini-key".to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        },
    }
}
