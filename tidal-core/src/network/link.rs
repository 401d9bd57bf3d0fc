//! Static link parameters and per-link overrides.

use serde::{Deserialize, Serialize};

use crate::{EPSILON, Result, TidalError, ensure_non_negative, ensure_positive};

/// Configured properties of one link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    /// Service rate in megabits per second
    pub bandwidth: f64,
    /// One-way propagation delay in milliseconds
    pub delay: f64,
    /// Buffer capacity in packets
    pub buffer: u32,
    /// Segment size in bytes
    pub mss: u32,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            bandwidth: 5.0,
            delay: 15.0,
            buffer: 20,
            mss: 1500,
        }
    }
}

impl LinkParams {
    /// Creates link parameters.
    pub fn new(bandwidth: f64, delay: f64, buffer: u32, mss: u32) -> Self {
        Self {
            bandwidth,
            delay,
            buffer,
            mss,
        }
    }

    /// Service rate in bytes per second.
    pub fn bytes_per_sec(&self) -> f64 {
        self.bandwidth * 1e6 / 8.0
    }

    /// Service rate in segments per second, never below `EPSILON`.
    pub fn packets_per_sec(&self) -> f64 {
        (self.bytes_per_sec() / f64::from(self.mss.max(1))).max(EPSILON)
    }

    /// Buffer capacity in bytes.
    pub fn buffer_bytes(&self) -> f64 {
        f64::from(self.buffer) * f64::from(self.mss)
    }

    /// Propagation delay in seconds.
    pub fn delay_secs(&self) -> f64 {
        self.delay / 1000.0
    }

    /// Checks the parameters describe a usable link.
    ///
    /// # Errors
    /// - `TidalError::InvalidParameter` - Bandwidth not positive, delay negative,
    ///   buffer below one packet or zero segment size
    pub fn validate(&self) -> Result<()> {
        ensure_positive("bandwidth", self.bandwidth)?;
        ensure_non_negative("delay", self.delay)?;
        if self.buffer < 1 {
            return Err(TidalError::invalid("buffer", "must be at least 1 packet"));
        }
        if self.mss == 0 {
            return Err(TidalError::invalid("mss", "must be at least 1 byte"));
        }
        Ok(())
    }
}

/// Partial replacement of a link's parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkOverride {
    pub bandwidth: Option<f64>,
    pub delay: Option<f64>,
    pub buffer: Option<u32>,
    pub mss: Option<u32>,
}

impl LinkOverride {
    /// Returns `base` with every field this override sets replaced.
    pub fn apply(&self, base: LinkParams) -> LinkParams {
        LinkParams {
            bandwidth: self.bandwidth.unwrap_or(base.bandwidth),
            delay: self.delay.unwrap_or(base.delay),
            buffer: self.buffer.unwrap_or(base.buffer),
            mss: self.mss.unwrap_or(base.mss),
        }
    }

    /// Returns true when the override changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_rates() {
        let link = LinkParams::new(12.0, 10.0, 20, 1500);
        assert_eq!(link.bytes_per_sec(), 1_500_000.0);
        assert_eq!(link.packets_per_sec(), 1000.0);
        assert_eq!(link.buffer_bytes(), 30_000.0);
        assert_eq!(link.delay_secs(), 0.01);
    }

    #[test]
    fn test_validate_rejects_degenerate_links() {
        assert!(LinkParams::default().validate().is_ok());
        assert!(LinkParams::new(0.0, 10.0, 20, 1500).validate().is_err());
        assert!(LinkParams::new(5.0, -1.0, 20, 1500).validate().is_err());
        assert!(LinkParams::new(5.0, 10.0, 0, 1500).validate().is_err());
        assert!(LinkParams::new(5.0, 10.0, 20, 0).validate().is_err());
    }

    #[test]
    fn test_override_replaces_only_set_fields() {
        let base = LinkParams::default();
        let patch = LinkOverride {
            bandwidth: Some(1.0),
            buffer: Some(5),
            ..Default::default()
        };
        let patched = patch.apply(base);
        assert_eq!(patched.bandwidth, 1.0);
        assert_eq!(patched.buffer, 5);
        assert_eq!(patched.delay, base.delay);
        assert_eq!(patched.mss, base.mss);
        assert!(!patch.is_empty());
        assert!(LinkOverride::default().is_empty());
    }
}
