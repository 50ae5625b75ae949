//! Configuration schema.

use opsgate_core::{
    OperationPolicy, OperationType, RiskLevel, Role, Timestamp,
    policy::{APPROVAL_COUNT_RANGE, TIMEOUT_HOURS_RANGE},
};
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Minimum HMAC key length in bytes.
const MIN_KEY_BYTES: usize = 32;
/// Hard cap on per-wrapper timeout overrides, in seconds.
const MAX_WRAPPER_TIMEOUT_SECS: u64 = 120;

/// The merged, validated configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Key material.
    pub security: SecurityConfig,
    /// Database location.
    pub database: DatabaseConfig,
    /// Gateway limits.
    pub gateway: GatewayConfig,
    /// Sweeper cadence.
    pub sweeper: SweeperConfig,
    /// Wrapper registry entries.
    pub wrappers: Vec<WrapperConfig>,
    /// Policy seed rows.
    pub policies: Vec<PolicyConfig>,
}

/// Key material.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Hex-encoded HMAC-SHA256 key for history signatures; at least 32
    /// bytes once decoded.
    pub hmac_key_hex: String,
}

/// Database location.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file path.
    pub path: String,
}

/// Gateway limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Global cap on concurrently running wrapper children.
    pub max_concurrency: usize,
    /// Queue wait budget before an execution is refused as overloaded.
    pub queue_timeout_ms: u64,
    /// Prefixes a normalized path argument must stay inside.
    pub allowed_path_prefixes: Vec<String>,
    /// Absolute command paths a cron entry may invoke.
    pub allowed_cron_commands: Vec<String>,
}

/// Sweeper cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweeperConfig {
    /// Seconds between expiry sweeps.
    pub period_secs: u64,
}

/// One wrapper registry entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WrapperConfig {
    /// Symbolic id.
    pub id: String,
    /// Absolute wrapper path.
    pub path: String,
    /// Documented minimum argument count.
    pub min_args: usize,
    /// Optional timeout override (1-120 seconds).
    pub timeout_secs: Option<u64>,
    /// Forbidden characters this wrapper's arguments may carry.
    #[serde(default)]
    pub allow_chars: Vec<String>,
}

/// One policy seed row.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// The governed operation type.
    pub operation_type: String,
    /// Human description.
    pub description: String,
    /// Whether the approval workflow applies.
    pub approval_required: bool,
    /// Role names that may approve.
    pub approver_roles: Vec<String>,
    /// Minimum approvals (1-10).
    pub approval_count: u32,
    /// Pending-request lifetime (1-168 hours).
    pub timeout_hours: u32,
    /// Whether approval executes immediately.
    pub auto_execute: bool,
    /// Risk level (LOW/MEDIUM/HIGH/CRITICAL).
    pub risk_level: String,
}

impl Config {
    /// Decode and length-check the HMAC key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a missing, non-hex, or
    /// short key.
    pub fn hmac_key(&self) -> ConfigResult<Vec<u8>> {
        if self.security.hmac_key_hex.is_empty() {
            return Err(ConfigError::Invalid(
                "security.hmac_key_hex must be set".to_string(),
            ));
        }
        let key = hex::decode(&self.security.hmac_key_hex)
            .map_err(|e| ConfigError::Invalid(format!("security.hmac_key_hex: {e}")))?;
        if key.len() < MIN_KEY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "security.hmac_key_hex decodes to {} bytes; minimum is {MIN_KEY_BYTES}",
                key.len()
            )));
        }
        Ok(key)
    }

    /// Convert the policy seeds into domain policies.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first malformed row.
    pub fn seed_policies(&self) -> ConfigResult<Vec<OperationPolicy>> {
        self.policies.iter().map(PolicyConfig::to_policy).collect()
    }

    /// Validate everything that is checkable without I/O.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violation.
    pub fn validate(&self) -> ConfigResult<()> {
        self.hmac_key()?;

        if self.gateway.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "gateway.max_concurrency must be positive".to_string(),
            ));
        }
        if self.sweeper.period_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweeper.period_secs must be positive".to_string(),
            ));
        }
        for prefix in &self.gateway.allowed_path_prefixes {
            if !prefix.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "gateway.allowed_path_prefixes: {prefix:?} is not absolute"
                )));
            }
        }
        for command in &self.gateway.allowed_cron_commands {
            if !command.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "gateway.allowed_cron_commands: {command:?} is not absolute"
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for wrapper in &self.wrappers {
            if !wrapper.path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "wrapper {}: path {:?} is not absolute",
                    wrapper.id, wrapper.path
                )));
            }
            if let Some(secs) = wrapper.timeout_secs {
                if secs == 0 || secs > MAX_WRAPPER_TIMEOUT_SECS {
                    return Err(ConfigError::Invalid(format!(
                        "wrapper {}: timeout_secs {secs} outside 1-{MAX_WRAPPER_TIMEOUT_SECS}",
                        wrapper.id
                    )));
                }
            }
            for ch in &wrapper.allow_chars {
                if ch.chars().count() != 1 {
                    return Err(ConfigError::Invalid(format!(
                        "wrapper {}: allow_chars entries must be single characters",
                        wrapper.id
                    )));
                }
            }
            if !seen.insert(wrapper.id.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate wrapper id {}",
                    wrapper.id
                )));
            }
        }

        for policy in &self.policies {
            policy.to_policy()?;
        }
        Ok(())
    }
}

impl PolicyConfig {
    /// Convert to a domain policy, checking every constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the violation.
    pub fn to_policy(&self) -> ConfigResult<OperationPolicy> {
        let invalid = |message: String| {
            ConfigError::Invalid(format!("policy {}: {message}", self.operation_type))
        };

        let operation_type = OperationType::parse(&self.operation_type)
            .map_err(|e| invalid(e.to_string()))?;
        let risk_level =
            RiskLevel::parse(&self.risk_level).map_err(|e| invalid(e.to_string()))?;
        let approver_roles = self
            .approver_roles
            .iter()
            .map(|name| {
                Role::parse(name).ok_or_else(|| invalid(format!("unknown role {name:?}")))
            })
            .collect::<ConfigResult<Vec<Role>>>()?;

        let (count_lo, count_hi) = APPROVAL_COUNT_RANGE;
        if self.approval_count < count_lo || self.approval_count > count_hi {
            return Err(invalid(format!(
                "approval_count {} outside {count_lo}-{count_hi}",
                self.approval_count
            )));
        }
        let (hours_lo, hours_hi) = TIMEOUT_HOURS_RANGE;
        if self.timeout_hours < hours_lo || self.timeout_hours > hours_hi {
            return Err(invalid(format!(
                "timeout_hours {} outside {hours_lo}-{hours_hi}",
                self.timeout_hours
            )));
        }

        let now = Timestamp::now();
        let policy = OperationPolicy {
            operation_type,
            description: self.description.clone(),
            approval_required: self.approval_required,
            approver_roles,
            approval_count: self.approval_count,
            timeout_hours: self.timeout_hours,
            auto_execute: self.auto_execute,
            risk_level,
            created_at: now,
            updated_at: now,
        };
        policy.validate().map_err(ConfigError::Invalid)?;
        Ok(policy)
    }
}
