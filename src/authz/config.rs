/// Environment variable naming the deployment environment.
pub const APP_ENV: &str = "APP_ENV";
/// Opt-in switch for the development bypass.
pub const DEV_BYPASS: &str = "AUTHZ_DEV_BYPASS";
/// Email domain whose users are allowed everything while the bypass is on.
pub const DEV_DOMAIN_SUFFIX: &str = "AUTHZ_DEV_DOMAIN_SUFFIX";

const DEVELOPMENT: &str = "development";

/// Development-mode override configuration.
///
/// SECURITY: when active, every authenticated user whose email domain matches
/// `domain_suffix` is allowed every permission without consulting the store.
/// It is off by default and only switches on when `APP_ENV=development`,
/// `AUTHZ_DEV_BYPASS` is truthy and a non-empty suffix is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevModeConfig {
    pub enabled: bool,
    pub domain_suffix: String,
}

impl DevModeConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_development = lookup(APP_ENV)
            .map(|env| env.trim().eq_ignore_ascii_case(DEVELOPMENT))
            .unwrap_or(false);
        let bypass_requested = lookup(DEV_BYPASS)
            .map(|flag| matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        let domain_suffix = lookup(DEV_DOMAIN_SUFFIX)
            .map(|suffix| suffix.trim().trim_start_matches('@').to_ascii_lowercase())
            .unwrap_or_default();

        if bypass_requested && !is_development {
            tracing::warn!(
                "{} is set outside the development environment; development bypass stays disabled",
                DEV_BYPASS
            );
        }

        let config = Self {
            enabled: is_development && bypass_requested,
            domain_suffix,
        };
        if config.is_active() {
            tracing::warn!(
                domain_suffix = %config.domain_suffix,
                "development authorization bypass is ACTIVE"
            );
        }
        config
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.domain_suffix.is_empty()
    }

    /// Whether `identity` (an email) belongs to the development domain.
    ///
    /// The domain after the last `@` must equal the suffix or be a subdomain of it.
    pub fn matches(&self, identity: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let Some((_, domain)) = identity.rsplit_once('@') else {
            return false;
        };
        let domain = domain.trim().to_ascii_lowercase();
        let suffix = self.domain_suffix.trim_start_matches('@').to_ascii_lowercase();
        if suffix.is_empty() {
            return false;
        }
        domain == suffix || domain.ends_with(&format!(".{suffix}"))
    }
}
