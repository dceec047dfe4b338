//! Configuration for the secure channel

use std::fmt;
use std::time::Duration;

use kem::{KemVariant, WipeHook};

use crate::codec::MAX_FRAME_LEN;
use crate::error::{ChannelError, Result};

/// Default frame budget per key before the sender rotates it.
pub const DEFAULT_REKEY_AFTER: u64 = u32::MAX as u64;

/// Configuration shared by every connection of a [`crate::Context`]
#[derive(Clone)]
pub struct ChannelConfig {
    /// Maximum wait for each handshake phase
    pub handshake_timeout: Duration,

    /// Maximum frame body (kind byte + payload), at most [`MAX_FRAME_LEN`]
    pub max_frame_len: usize,

    /// Frames sealed under one key before it is rotated
    pub rekey_after: u64,

    /// Rotate keys automatically when `rekey_after` is reached.
    /// If false the session closes instead.
    pub auto_rekey: bool,

    /// Variant proposed when initiating
    pub offered_variant: KemVariant,

    /// Variants accepted when responding
    pub accepted_variants: Vec<KemVariant>,

    /// Whether to log detailed handshake information
    pub verbose_logging: bool,

    /// Observer attached to every local key pair, called after wiping
    pub wipe_hook: Option<WipeHook>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            max_frame_len: MAX_FRAME_LEN,
            rekey_after: DEFAULT_REKEY_AFTER,
            auto_rekey: true,
            offered_variant: KemVariant::MlKem768,
            accepted_variants: KemVariant::ALL.to_vec(),
            verbose_logging: false,
            wipe_hook: None,
        }
    }
}

impl ChannelConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a development configuration (verbose, short timeouts)
    pub fn development() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            verbose_logging: true,
            ..Self::default()
        }
    }

    /// Create a production configuration (hybrid variants only)
    pub fn production() -> Self {
        Self {
            offered_variant: KemVariant::HybridMlKemNtru,
            accepted_variants: vec![KemVariant::HybridMlKemNtru, KemVariant::HybridMlKemMcEliece],
            ..Self::default()
        }
    }

    /// Set the per-phase handshake timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_variant(mut self, variant: KemVariant) -> Self {
        self.offered_variant = variant;
        self
    }

    pub fn with_accepted_variants(mut self, variants: impl Into<Vec<KemVariant>>) -> Self {
        self.accepted_variants = variants.into();
        self
    }

    pub fn with_rekey_after(mut self, frames: u64) -> Self {
        self.rekey_after = frames;
        self
    }

    pub fn with_auto_rekey(mut self, enabled: bool) -> Self {
        self.auto_rekey = enabled;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn with_wipe_hook(mut self, hook: WipeHook) -> Self {
        self.wipe_hook = Some(hook);
        self
    }

    /// Enable verbose logging
    pub fn with_verbose_logging(mut self) -> Self {
        self.verbose_logging = true;
        self
    }

    pub fn accepts(&self, variant: KemVariant) -> bool {
        self.accepted_variants.contains(&variant)
    }

    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout.is_zero() {
            return Err(ChannelError::InvalidConfig(
                "handshake timeout must be non-zero".to_string(),
            ));
        }
        if self.max_frame_len < 2 || self.max_frame_len > MAX_FRAME_LEN {
            return Err(ChannelError::InvalidConfig(format!(
                "max frame length must be within 2..={}",
                MAX_FRAME_LEN
            )));
        }
        // one nonce per key is reserved for the rekey announcement
        if self.rekey_after < 2 {
            return Err(ChannelError::InvalidConfig(
                "rekey_after must be at least 2".to_string(),
            ));
        }
        if self.accepted_variants.is_empty() {
            return Err(ChannelError::InvalidConfig(
                "at least one accepted variant is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("handshake_timeout", &self.handshake_timeout)
            .field("max_frame_len", &self.max_frame_len)
            .field("rekey_after", &self.rekey_after)
            .field("auto_rekey", &self.auto_rekey)
            .field("offered_variant", &self.offered_variant)
            .field("accepted_variants", &self.accepted_variants)
            .field("verbose_logging", &self.verbose_logging)
            .field("wipe_hook", &self.wipe_hook.is_some())
            .finish()
    }
}

/// Builder for ChannelConfig
pub struct ChannelConfigBuilder {
    config: ChannelConfig,
}

impl Default for ChannelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: ChannelConfig::default(),
        }
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    pub fn rekey_after(mut self, frames: u64) -> Self {
        self.config.rekey_after = frames;
        self
    }

    pub fn auto_rekey(mut self, enabled: bool) -> Self {
        self.config.auto_rekey = enabled;
        self
    }

    pub fn offer(mut self, variant: KemVariant) -> Self {
        self.config.offered_variant = variant;
        self
    }

    pub fn accept(mut self, variants: impl Into<Vec<KemVariant>>) -> Self {
        self.config.accepted_variants = variants.into();
        self
    }

    pub fn wipe_hook(mut self, hook: WipeHook) -> Self {
        self.config.wipe_hook = Some(hook);
        self
    }

    /// Enable verbose logging
    pub fn verbose(mut self) -> Self {
        self.config.verbose_logging = true;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ChannelConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
