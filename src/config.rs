//! Configuration types.

/// Relay configuration.
///
/// Every field has a sensible default; `from_env` overrides from
/// `RELAY_*` environment variables so deployments can tune without
/// recompiling.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Identifier of the primary user the relay acts on behalf of
    /// (Telegram username or numeric user id).
    pub primary_user: String,
    /// Assistant name used in prompts and notifications.
    pub agent_name: String,
    /// How long a pending draft stays approvable.
    pub draft_expiry_minutes: u32,
    /// Default window for `/digest` when no hours are given.
    pub digest_default_hours: i64,
    /// Prefix for outbound reference tokens.
    pub reference_prefix: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            primary_user: String::new(),
            agent_name: "Relay".to_string(),
            draft_expiry_minutes: 120,
            digest_default_hours: 2,
            reference_prefix: "RLY".to_string(),
        }
    }
}

impl RelayConfig {
    /// Build a config from the environment. `RELAY_PRIMARY_USER` is the
    /// only required variable; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, crate::error::ConfigError> {
        let primary_user = std::env::var("RELAY_PRIMARY_USER").map_err(|_| {
            crate::error::ConfigError::MissingEnvVar("RELAY_PRIMARY_USER".to_string())
        })?;

        let defaults = Self::default();
        Ok(Self {
            primary_user,
            agent_name: std::env::var("RELAY_AGENT_NAME").unwrap_or(defaults.agent_name),
            draft_expiry_minutes: env_parse("RELAY_DRAFT_EXPIRE_MIN", defaults.draft_expiry_minutes),
            digest_default_hours: env_parse("RELAY_DIGEST_HOURS", defaults.digest_default_hours),
            reference_prefix: std::env::var("RELAY_REF_PREFIX").unwrap_or(defaults.reference_prefix),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
