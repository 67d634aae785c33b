use thiserror::Error;
use crate::Float;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine-level failures. Every variant is fatal for the run it occurs in:
/// the simulation is an offline batch computation and a violated invariant
/// means the remaining steps cannot be trusted.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Collision ran before relaxation parameters were attached.
    #[error("collision policy used before initialization: call initialize_bgk or initialize_trt during setup")]
    CollisionNotInitialized,

    /// Partially-saturated bounce-back ran before its setup calls.
    #[error("partially-saturated bounce-back used before initialization: call initialize and allowed_tau during setup")]
    PsBounceBackNotInitialized,

    /// A relaxation time outside the stable range of the chosen policy.
    #[error("relaxation time {tau} outside stable range ({min}, {max}) for {policy}")]
    UnstableRelaxationTime {
        policy: &'static str,
        tau: Float,
        min: Float,
        max: Float,
    },

    /// A node received two conflicting classifications, or a list holds a
    /// duplicate coordinate. Either breaks the disjoint-write invariant the
    /// parallel node loops rely on.
    #[error("geometry inconsistency at node ({x}, {y}): {reason}")]
    GeometryInconsistency { x: usize, y: usize, reason: String },

    /// A coordinate outside the declared lattice dimensions.
    #[error("node ({x}, {y}) outside lattice dimensions {nx}x{ny}")]
    OutOfDomain { x: usize, y: usize, nx: usize, ny: usize },

    /// Construction info missing a required piece (e.g. domain dimensions).
    #[error("invalid construction info: {0}")]
    InvalidConstruction(String),

    /// No usable GPU adapter for the accelerator execution mode.
    #[error("accelerator backend unavailable: {0}")]
    AcceleratorUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
