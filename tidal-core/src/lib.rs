//! Tidal Core - Network model and congestion control for fluid TCP simulation
//!
//! This crate provides the building blocks shared by every Tidal simulation:
//! link parameters, topology templates, shortest-path routing, per-flow
//! congestion controllers and centralized configuration.

pub mod config;
pub mod congestion;
pub mod network;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::TidalConfig;
pub use congestion::{Algorithm, Congestion, LossSignal, Phase, StepSignal, WindowState};
pub use network::{FlowId, FlowSpec, Graph, LinkKey, LinkParams, NodeId, PathRouter, Topology};

/// Lower bound applied to rates and round-trip times before dividing by them.
pub const EPSILON: f64 = 1e-9;

/// Core errors that can bubble up from any Tidal subsystem.
///
/// Every variant represents an input that was rejected before any simulation
/// state was constructed.
#[derive(Debug, thiserror::Error)]
pub enum TidalError {
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("Unknown congestion control algorithm: {name}")]
    UnknownAlgorithm { name: String },

    #[error("Duplicate flow id: {flow_id}")]
    DuplicateFlow { flow_id: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl TidalError {
    /// Builds an `InvalidParameter` error for the named parameter.
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        TidalError::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, TidalError::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, TidalError>;

/// Ensures a floating point parameter is finite and strictly positive.
///
/// # Errors
/// - `TidalError::InvalidParameter` - Value is zero, negative, NaN or infinite
pub fn ensure_positive(parameter: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TidalError::invalid(
            parameter,
            format!("must be a finite value > 0, got {value}"),
        ));
    }
    Ok(())
}

/// Ensures a floating point parameter is finite and not negative.
///
/// # Errors
/// - `TidalError::InvalidParameter` - Value is negative, NaN or infinite
pub fn ensure_non_negative(parameter: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TidalError::invalid(
            parameter,
            format!("must be a finite value >= 0, got {value}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_positive_rejects_zero_and_nan() {
        assert!(ensure_positive("bandwidth", 5.0).is_ok());
        assert!(ensure_positive("bandwidth", 0.0).is_err());
        assert!(ensure_positive("bandwidth", -1.0).is_err());
        assert!(ensure_positive("bandwidth", f64::NAN).is_err());
        assert!(ensure_positive("bandwidth", f64::INFINITY).is_err());
    }

    #[test]
    fn test_ensure_non_negative_accepts_zero() {
        assert!(ensure_non_negative("delay", 0.0).is_ok());
        assert!(ensure_non_negative("delay", -0.5).is_err());
    }

    #[test]
    fn test_invalid_parameter_message() {
        let error = TidalError::invalid("buffer", "must be at least 1 packet");
        assert_eq!(
            error.to_string(),
            "Invalid parameter 'buffer': must be at least 1 packet"
        );
        assert!(error.is_user_error());
    }
}
