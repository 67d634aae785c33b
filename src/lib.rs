pub mod boundary;
pub mod collision;
pub mod config;
pub mod error;
pub mod execution;
pub mod geometry;
pub mod gpu;
pub mod initializer;
pub mod lattice;
pub mod output;
pub mod solver;

pub use boundary::{PsBounceBack, ZouHe};
pub use collision::CollisionOperator;
pub use config::Config;
pub use error::{EngineError, Result};
pub use execution::{ExecutionMode, Executor};
pub use geometry::{ConstructionInfo, Geometry, NonFluidNodeType};
pub use gpu::GpuContext;
pub use initializer::{UpdateFn, VelocityInitializer};
pub use lattice::{BoundaryPoint, D2Q9, Fields, NodeType};
pub use output::SnapshotWriter;
pub use solver::Lattice;

pub type Float = f32;
