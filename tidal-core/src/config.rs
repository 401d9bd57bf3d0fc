//! Centralized configuration for Tidal.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the simulators.

use std::path::PathBuf;
use std::time::Duration;

use crate::congestion::TimeoutReset;
use crate::network::LinkParams;
use crate::{Result, TidalError, ensure_positive};

/// Central configuration for all Tidal components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct TidalConfig {
    pub single: SingleFlowConfig,
    pub multi: MultiFlowConfig,
    pub routing: RoutingConfig,
    pub congestion: CongestionConfig,
    pub external: ExternalEngineConfig,
}

/// Integration settings for the single bottleneck simulator.
#[derive(Debug, Clone)]
pub struct SingleFlowConfig {
    /// Integration step in seconds
    pub step_secs: f64,
    /// Interval between trace samples in seconds
    pub sample_interval_secs: f64,
    /// Congestion window at time zero, in packets
    pub initial_cwnd: f64,
    /// Slow start threshold at time zero, in packets
    pub initial_ssthresh: f64,
}

impl Default for SingleFlowConfig {
    fn default() -> Self {
        Self {
            step_secs: 0.01,
            sample_interval_secs: 0.1,
            initial_cwnd: 1.0,
            initial_ssthresh: 40.0,
        }
    }
}

/// Defaults for multi-flow topology simulations.
#[derive(Debug, Clone)]
pub struct MultiFlowConfig {
    /// Interval between trace samples in seconds
    pub sample_interval_secs: f64,
    /// Parameters for links without an explicit override
    pub default_link: LinkParams,
    /// Simulated duration when a scenario does not specify one
    pub default_duration_secs: f64,
    /// Integration step when a scenario does not specify one
    pub default_step_secs: f64,
    /// Congestion window at time zero, in packets
    pub initial_cwnd: f64,
    /// Slow start threshold at time zero (unbounded by default)
    pub initial_ssthresh: f64,
}

impl Default for MultiFlowConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 0.1,
            default_link: LinkParams::default(),
            default_duration_secs: 20.0,
            default_step_secs: 0.05,
            initial_cwnd: 1.0,
            initial_ssthresh: f64::INFINITY,
        }
    }
}

/// Weights of the link cost function used by the path router.
///
/// cost = alpha * delay_ms + beta * (1 / bandwidth_mbps)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingConfig {
    /// Weight of the propagation delay term
    pub alpha_delay: f64,
    /// Weight of the inverse bandwidth term
    pub beta_inv_bandwidth: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            alpha_delay: 1.0,
            beta_inv_bandwidth: 50.0,
        }
    }
}

/// Tunables shared by the congestion controllers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CongestionConfig {
    /// Lowest congestion window any controller may produce, in packets
    pub cwnd_floor: f64,
    /// Window Reno restarts from after a timeout-like loss
    pub reno_timeout_reset: TimeoutReset,
    /// Cubic scaling constant C
    pub cubic_c: f64,
    /// Cubic multiplicative decrease factor
    pub cubic_beta: f64,
    /// Fraction of the gap to the BDP target BBR closes per step
    pub bbr_gain: f64,
    /// Multiplicative backoff BBR applies on loss
    pub bbr_loss_backoff: f64,
    /// Minimum BBR window, in packets
    pub bbr_min_cwnd: f64,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            cwnd_floor: 1.0,
            reno_timeout_reset: TimeoutReset::ToOne,
            cubic_c: 0.4,
            cubic_beta: 0.7,
            bbr_gain: 0.1,
            bbr_loss_backoff: 0.8,
            bbr_min_cwnd: 4.0,
        }
    }
}

/// Location and limits of the external packet-level simulator.
#[derive(Debug, Clone)]
pub struct ExternalEngineConfig {
    /// ns-3 checkout containing the `ns3` launcher script
    pub ns3_dir: PathBuf,
    /// Maximum wall-clock time a single external run may take
    pub timeout: Duration,
    /// Scratch program invoked through the launcher
    pub program: String,
}

impl Default for ExternalEngineConfig {
    fn default() -> Self {
        Self {
            ns3_dir: PathBuf::from("ns3"),
            timeout: Duration::from_secs(30),
            program: "scratch/tcp_multi".to_string(),
        }
    }
}

impl TidalConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Values that fail to parse are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("TIDAL_NS3_DIR") {
            config.external.ns3_dir = PathBuf::from(dir);
        }

        if let Some(seconds) = env_parse::<u64>("TIDAL_NS3_TIMEOUT_SECS") {
            config.external.timeout = Duration::from_secs(seconds);
        }

        if let Some(alpha) = env_parse::<f64>("TIDAL_ROUTING_ALPHA") {
            config.routing.alpha_delay = alpha;
        }

        if let Some(beta) = env_parse::<f64>("TIDAL_ROUTING_BETA") {
            config.routing.beta_inv_bandwidth = beta;
        }

        if let Some(floor) = env_parse::<f64>("TIDAL_CWND_FLOOR") {
            config.congestion.cwnd_floor = floor;
        }

        if let Some(interval) = env_parse::<f64>("TIDAL_SAMPLE_INTERVAL") {
            config.single.sample_interval_secs = interval;
            config.multi.sample_interval_secs = interval;
        }

        config
    }

    /// Checks that every tunable is usable by the simulators.
    ///
    /// # Errors
    /// - `TidalError::Configuration` - A floor, weight or interval is out of range
    pub fn validate(&self) -> Result<()> {
        if !self.congestion.cwnd_floor.is_finite() || self.congestion.cwnd_floor < 1.0 {
            return Err(TidalError::Configuration {
                reason: format!(
                    "cwnd floor must be at least 1 packet, got {}",
                    self.congestion.cwnd_floor
                ),
            });
        }

        if !(0.0..1.0).contains(&self.congestion.cubic_beta) {
            return Err(TidalError::Configuration {
                reason: format!(
                    "cubic beta must be in [0, 1), got {}",
                    self.congestion.cubic_beta
                ),
            });
        }

        if self.routing.alpha_delay < 0.0 || self.routing.beta_inv_bandwidth < 0.0 {
            return Err(TidalError::Configuration {
                reason: "routing weights must not be negative".to_string(),
            });
        }

        for (name, value) in [
            ("single.step_secs", self.single.step_secs),
            ("single.sample_interval_secs", self.single.sample_interval_secs),
            ("multi.sample_interval_secs", self.multi.sample_interval_secs),
            ("multi.default_step_secs", self.multi.default_step_secs),
        ] {
            ensure_positive(name, value).map_err(|e| TidalError::Configuration {
                reason: e.to_string(),
            })?;
        }

        self.multi
            .default_link
            .validate()
            .map_err(|e| TidalError::Configuration {
                reason: e.to_string(),
            })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

/// Number of integration steps between two trace samples.
///
/// Always at least one so every step can be sampled when the interval is
/// shorter than the step.
pub fn sample_every(sample_interval_secs: f64, step_secs: f64) -> usize {
    let ratio = sample_interval_secs / step_secs.max(crate::EPSILON);
    (ratio.round() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TidalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.routing.alpha_delay, 1.0);
        assert_eq!(config.routing.beta_inv_bandwidth, 50.0);
        assert_eq!(config.single.step_secs, 0.01);
        assert_eq!(config.multi.default_step_secs, 0.05);
        assert_eq!(config.external.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_cwnd_floor_below_one_rejected() {
        let mut config = TidalConfig::default();
        config.congestion.cwnd_floor = 0.1;
        assert!(matches!(
            config.validate(),
            Err(TidalError::Configuration { .. })
        ));
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let mut config = TidalConfig::default();
        config.single.step_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_every() {
        assert_eq!(sample_every(0.1, 0.01), 10);
        assert_eq!(sample_every(0.1, 0.05), 2);
        assert_eq!(sample_every(0.1, 0.5), 1);
    }
}
