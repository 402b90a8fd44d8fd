//! ServerConfig (C8) — version/encryption policy and resource caps for an
//! INC endpoint.
//!
//! The builder shape (`ServerConfigBuilder` with chained setters and a
//! final `build()` that validates) follows the teacher's `ConfigBuilder`/
//! `TransportConfigBuilder`. `dump()`/`load()`'s line-oriented `key=value`
//! text format follows `iincserverconfig.cpp`'s `dump`/`load` functions,
//! which serialize each field as one `key=value` line and skip blank lines
//! and lines starting with `#`.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{IncError, IncResult};

/// How strictly an endpoint enforces protocol version compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Reject any peer whose protocol version isn't exactly `min_version`.
    Strict,
    /// Accept any peer version within `[min_version, max_version]`.
    #[default]
    Compatible,
    /// Accept any peer version, logging a warning outside the range.
    Permissive,
}

impl VersionPolicy {
    fn as_str(&self) -> &'static str {
        match self {
            VersionPolicy::Strict => "strict",
            VersionPolicy::Compatible => "compatible",
            VersionPolicy::Permissive => "permissive",
        }
    }

    fn from_str(s: &str) -> IncResult<Self> {
        Ok(match s {
            "strict" => VersionPolicy::Strict,
            "compatible" => VersionPolicy::Compatible,
            "permissive" => VersionPolicy::Permissive,
            other => {
                return Err(IncError::ConfigParse {
                    line: 0,
                    reason: format!("unknown version_policy: {other}"),
                })
            }
        })
    }
}

/// Whether transport-level encryption is required to complete a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionRequirement {
    Optional,
    #[default]
    Preferred,
    Required,
}

impl EncryptionRequirement {
    fn as_str(&self) -> &'static str {
        match self {
            EncryptionRequirement::Optional => "optional",
            EncryptionRequirement::Preferred => "preferred",
            EncryptionRequirement::Required => "required",
        }
    }

    fn from_str(s: &str) -> IncResult<Self> {
        Ok(match s {
            "optional" => EncryptionRequirement::Optional,
            "preferred" => EncryptionRequirement::Preferred,
            "required" => EncryptionRequirement::Required,
            other => {
                return Err(IncError::ConfigParse {
                    line: 0,
                    reason: format!("unknown encryption_requirement: {other}"),
                })
            }
        })
    }
}

/// Version and resource policy for an INC endpoint (spec.md §5).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub min_version: u16,
    pub max_version: u16,
    pub version_policy: VersionPolicy,
    pub encryption: EncryptionRequirement,
    pub max_message_size: u32,
    pub max_pending_operations: u32,
    pub handshake_timeout_ms: u32,
    pub ping_interval_ms: u32,
    pub shared_memory_enabled: bool,
    pub shared_memory_threshold: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            min_version: 1,
            max_version: 1,
            version_policy: VersionPolicy::Compatible,
            encryption: EncryptionRequirement::Preferred,
            max_message_size: 64 * 1024 * 1024,
            max_pending_operations: 4096,
            handshake_timeout_ms: 5_000,
            ping_interval_ms: 30_000,
            shared_memory_enabled: true,
            shared_memory_threshold: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Serialize to the `key=value` line format `iincserverconfig.cpp`'s
    /// `dump()` produces: one assignment per line, no trailing blank line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "min_version={}", self.min_version);
        let _ = writeln!(out, "max_version={}", self.max_version);
        let _ = writeln!(out, "version_policy={}", self.version_policy.as_str());
        let _ = writeln!(out, "encryption={}", self.encryption.as_str());
        let _ = writeln!(out, "max_message_size={}", self.max_message_size);
        let _ = writeln!(
            out,
            "max_pending_operations={}",
            self.max_pending_operations
        );
        let _ = writeln!(out, "handshake_timeout_ms={}", self.handshake_timeout_ms);
        let _ = writeln!(out, "ping_interval_ms={}", self.ping_interval_ms);
        let _ = writeln!(
            out,
            "shared_memory_enabled={}",
            self.shared_memory_enabled
        );
        let _ = writeln!(
            out,
            "shared_memory_threshold={}",
            self.shared_memory_threshold
        );
        out
    }

    /// Parse the format `dump()` produces. Blank lines and lines starting
    /// with `#` are skipped, matching `iincserverconfig.cpp`'s `load()`.
    pub fn load(text: &str) -> IncResult<Self> {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| IncError::ConfigParse {
                line: idx + 1,
                reason: format!("expected key=value, got '{line}'"),
            })?;
            fields.insert(key.trim(), value.trim());
        }

        let parse_u16 = |key: &str, fields: &HashMap<&str, &str>| -> IncResult<u16> {
            fields
                .get(key)
                .ok_or_else(|| IncError::ConfigParse {
                    line: 0,
                    reason: format!("missing field {key}"),
                })?
                .parse()
                .map_err(|_| IncError::ConfigParse {
                    line: 0,
                    reason: format!("invalid u16 for {key}"),
                })
        };
        let parse_u32 = |key: &str, fields: &HashMap<&str, &str>| -> IncResult<u32> {
            fields
                .get(key)
                .ok_or_else(|| IncError::ConfigParse {
                    line: 0,
                    reason: format!("missing field {key}"),
                })?
                .parse()
                .map_err(|_| IncError::ConfigParse {
                    line: 0,
                    reason: format!("invalid u32 for {key}"),
                })
        };
        let parse_bool = |key: &str, fields: &HashMap<&str, &str>| -> IncResult<bool> {
            fields
                .get(key)
                .ok_or_else(|| IncError::ConfigParse {
                    line: 0,
                    reason: format!("missing field {key}"),
                })?
                .parse()
                .map_err(|_| IncError::ConfigParse {
                    line: 0,
                    reason: format!("invalid bool for {key}"),
                })
        };

        let config = ServerConfig {
            min_version: parse_u16("min_version", &fields)?,
            max_version: parse_u16("max_version", &fields)?,
            version_policy: VersionPolicy::from_str(
                fields.get("version_policy").copied().unwrap_or("compatible"),
            )?,
            encryption: EncryptionRequirement::from_str(
                fields.get("encryption").copied().unwrap_or("preferred"),
            )?,
            max_message_size: parse_u32("max_message_size", &fields)?,
            max_pending_operations: parse_u32("max_pending_operations", &fields)?,
            handshake_timeout_ms: parse_u32("handshake_timeout_ms", &fields)?,
            ping_interval_ms: parse_u32("ping_interval_ms", &fields)?,
            shared_memory_enabled: parse_bool("shared_memory_enabled", &fields)?,
            shared_memory_threshold: parse_u32("shared_memory_threshold", &fields)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> IncResult<()> {
        if self.min_version > self.max_version {
            return Err(IncError::Configuration {
                field: "min_version".into(),
                message: "min_version must not exceed max_version".into(),
            });
        }
        if self.max_message_size == 0 {
            return Err(IncError::Configuration {
                field: "max_message_size".into(),
                message: "must be nonzero".into(),
            });
        }
        Ok(())
    }

    /// Whether `offered` satisfies this config's version policy.
    pub fn accepts_version(&self, offered: u16) -> bool {
        match self.version_policy {
            VersionPolicy::Strict => offered == self.min_version,
            VersionPolicy::Compatible => offered >= self.min_version && offered <= self.max_version,
            VersionPolicy::Permissive => true,
        }
    }
}

/// Builder for `ServerConfig`, validating on `build()`.
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn min_version(mut self, v: u16) -> Self {
        self.config.min_version = v;
        self
    }
    pub fn max_version(mut self, v: u16) -> Self {
        self.config.max_version = v;
        self
    }
    pub fn version_policy(mut self, p: VersionPolicy) -> Self {
        self.config.version_policy = p;
        self
    }
    pub fn encryption(mut self, e: EncryptionRequirement) -> Self {
        self.config.encryption = e;
        self
    }
    pub fn max_message_size(mut self, n: u32) -> Self {
        self.config.max_message_size = n;
        self
    }
    pub fn max_pending_operations(mut self, n: u32) -> Self {
        self.config.max_pending_operations = n;
        self
    }
    pub fn handshake_timeout_ms(mut self, ms: u32) -> Self {
        self.config.handshake_timeout_ms = ms;
        self
    }
    pub fn ping_interval_ms(mut self, ms: u32) -> Self {
        self.config.ping_interval_ms = ms;
        self
    }
    pub fn shared_memory_enabled(mut self, enabled: bool) -> Self {
        self.config.shared_memory_enabled = enabled;
        self
    }
    pub fn shared_memory_threshold(mut self, n: u32) -> Self {
        self.config.shared_memory_threshold = n;
        self
    }

    pub fn build(self) -> IncResult<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
