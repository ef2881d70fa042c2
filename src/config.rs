//! Explicit configuration record threaded through the stack at construction
//! time.

use crate::protocol::ProtocolKind;
use log::LevelFilter;

/// Adapter-level timing and retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    /// Protocol to request via `ATSP`; `None` means auto-detect (`ATSP 0`).
    pub preferred_protocol: Option<ProtocolKind>,
    /// Per-request timeout, `P2_client`.
    pub p2_client_ms: u32,
    /// Extension granted per `0x78` response-pending NRC, `P2*_server`.
    pub p2_star_ms: u32,
    /// Maximum retries for transient transport/adapter errors.
    pub max_retries: u32,
    /// Maximum number of consecutive `0x78` repeats honored before giving up.
    pub max_pending_repeats: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            preferred_protocol: None,
            p2_client_ms: 1000,
            p2_star_ms: 5000,
            max_retries: 3,
            max_pending_repeats: 10,
        }
    }
}

/// ISO-TP engine configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IsoTpConfig {
    /// `STmin` this engine requests of a sender, in milliseconds.
    pub st_min_default_ms: u8,
    /// Block size this engine requests of a sender (0 = unbounded).
    pub block_size_default: u8,
}

impl Default for IsoTpConfig {
    fn default() -> Self {
        Self {
            st_min_default_ms: 0,
            block_size_default: 0,
        }
    }
}

/// Session manager configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Interval between tester-present/`ATMA` keep-alive messages.
    pub tester_present_interval_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tester_present_interval_ms: 2000,
        }
    }
}

/// The explicit, immutable configuration record passed once at construction
/// and cloned into each component that needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticConfig {
    /// Adapter timing/retry settings.
    pub adapter: AdapterConfig,
    /// ISO-TP flow control settings.
    pub isotp: IsoTpConfig,
    /// Session manager settings.
    pub session: SessionConfig,
    /// Log level the consuming application should install for this crate's
    /// log target; the crate itself never installs a logger.
    pub logging_level: LevelFilter,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterConfig::default(),
            isotp: IsoTpConfig::default(),
            session: SessionConfig::default(),
            logging_level: LevelFilter::Info,
        }
    }
}

/// Builder for [`DiagnosticConfig`].
#[derive(Debug, Clone, Default)]
pub struct DiagnosticConfigBuilder {
    config: DiagnosticConfig,
}

impl DiagnosticConfigBuilder {
    /// Starts from [`DiagnosticConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `adapter.preferred_protocol`.
    pub fn preferred_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.config.adapter.preferred_protocol = Some(protocol);
        self
    }

    /// Sets `adapter.p2_client_ms`.
    pub fn p2_client_ms(mut self, ms: u32) -> Self {
        self.config.adapter.p2_client_ms = ms;
        self
    }

    /// Sets `adapter.p2_star_ms`.
    pub fn p2_star_ms(mut self, ms: u32) -> Self {
        self.config.adapter.p2_star_ms = ms;
        self
    }

    /// Sets `adapter.max_retries`.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.adapter.max_retries = n;
        self
    }

    /// Sets `adapter.max_pending_repeats`.
    pub fn max_pending_repeats(mut self, n: u32) -> Self {
        self.config.adapter.max_pending_repeats = n;
        self
    }

    /// Sets `isotp.st_min_default_ms`.
    pub fn st_min_default_ms(mut self, ms: u8) -> Self {
        self.config.isotp.st_min_default_ms = ms;
        self
    }

    /// Sets `isotp.block_size_default`.
    pub fn block_size_default(mut self, bs: u8) -> Self {
        self.config.isotp.block_size_default = bs;
        self
    }

    /// Sets `session.tester_present_interval_ms`.
    pub fn tester_present_interval_ms(mut self, ms: u32) -> Self {
        self.config.session.tester_present_interval_ms = ms;
        self
    }

    /// Sets `logging.level`.
    pub fn logging_level(mut self, level: LevelFilter) -> Self {
        self.config.logging_level = level;
        self
    }

    /// Finalizes the builder into an immutable [`DiagnosticConfig`].
    pub fn build(self) -> DiagnosticConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = DiagnosticConfig::default();
        assert_eq!(cfg.adapter.p2_client_ms, 1000);
        assert_eq!(cfg.adapter.p2_star_ms, 5000);
        assert_eq!(cfg.adapter.max_retries, 3);
        assert_eq!(cfg.adapter.max_pending_repeats, 10);
        assert_eq!(cfg.isotp.st_min_default_ms, 0);
        assert_eq!(cfg.isotp.block_size_default, 0);
        assert_eq!(cfg.session.tester_present_interval_ms, 2000);
    }

    #[test]
    fn builder_overrides_individual_fields() {
        let cfg = DiagnosticConfigBuilder::new()
            .preferred_protocol(ProtocolKind::Iso15765Can11_500)
            .max_retries(5)
            .build();
        assert_eq!(cfg.adapter.preferred_protocol, Some(ProtocolKind::Iso15765Can11_500));
        assert_eq!(cfg.adapter.max_retries, 5);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.adapter.p2_client_ms, 1000);
    }
}
