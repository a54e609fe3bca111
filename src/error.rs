//! Error types for dupire-lib.
//!
//! Every fallible numerical operation returns [`Result<T>`]. Errors are raised at the
//! point of failure and handed to the immediate caller; nothing in the crate retries a
//! root search or an optimisation on its own.

use thiserror::Error;

/// Convenience type alias for results in this crate.
pub type Result<T> = std::result::Result<T, DupireError>;

/// Errors raised by the surface, solvers, simulators, pricers and calibrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DupireError {
    /// SSVI parameters violate `eta > 0`, `0 < gamma < 1` or are not finite.
    #[error("invalid SSVI parameter range: {message}")]
    InvalidParameterRange { message: String },

    /// Newton iteration hit a (near) zero derivative.
    #[error("Newton solver failed: derivative too small ({derivative:e}) at x={x}")]
    DerivativeTooSmall { x: f64, derivative: f64 },

    /// Newton iteration exhausted its iteration budget.
    #[error("Newton solver did not converge after {iterations} iterations (last x={last_x})")]
    DidNotConverge { iterations: usize, last_x: f64 },

    /// A put price implies a negative call price through put/call parity.
    #[error("put/call parity violated: derived call price {call_price} is negative")]
    ParityViolation { call_price: f64 },

    /// Option type label is not one of Call/call/C/c/Put/put/P/p.
    #[error("unrecognized option type '{0}', expected Call, call, C, c, Put, put, P or p")]
    UnrecognizedOptionType(String),

    /// Barrier direction label is neither Down nor Up.
    #[error("unrecognized barrier direction '{0}', expected D (down) or U (up)")]
    InvalidBarrierDirection(String),

    /// Knock type label is neither In nor Out.
    #[error("unrecognized knock type '{0}', expected I (in) or O (out)")]
    InvalidKnockType(String),

    /// An error metric was requested with an empty market quote list.
    #[error("there is no market data to use for error calculation")]
    NoCalibrationData,

    /// The optimiser terminated for a reason other than convergence or iteration cap.
    #[error("{stage} calibration failed: {reason}")]
    CalibrationFailed { stage: &'static str, reason: String },

    /// Malformed simulation or pricing input (sizes, maturities, monitoring times).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl DupireError {
    pub fn parameter_range(msg: impl Into<String>) -> Self {
        Self::InvalidParameterRange {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }
}
