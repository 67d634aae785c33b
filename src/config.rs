use serde::{Deserialize, Serialize};
use crate::execution::ExecutionMode;
use crate::geometry::{ConstructionInfo, NonFluidNodeType, ObstacleSphere};
use crate::lattice::D2Q9;
use crate::Float;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub domain: DomainConfig,
    pub physics: PhysicsConfig,
    pub simulation: SimulationConfig,
    pub output: OutputConfig,
}

/// Domain extents plus the declarative geometry description the construction
/// builder consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub nx: usize,
    pub ny: usize,
    /// Classify the domain rim as solid walls
    #[serde(default = "default_true")]
    pub perimeter_walls: bool,
    #[serde(default)]
    pub inlets: Vec<IntervalConfig>,
    #[serde(default)]
    pub outlets: Vec<IntervalConfig>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleSphere>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntervalConfig {
    pub from: [usize; 2],
    pub to: [usize; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    pub density: Float,
    /// Peak inlet speed the update functions ramp toward
    pub inlet_velocity: Float,
    /// Time constant of the smoothed start-up ramp
    #[serde(default = "default_ramp_time")]
    pub ramp_time: Float,
    pub collision: CollisionConfig,
    /// Stable relaxation-time window for partially-saturated bounce-back
    #[serde(default = "default_psbb_range")]
    pub psbb_tau_range: [Float; 2],
    #[serde(default = "default_psbb_tolerance")]
    pub psbb_tolerance: Float,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CollisionConfig {
    Bgk {
        tau: Float,
    },
    Trt {
        tau_plus: Float,
        tau_minus: Float,
        /// When set, tau_minus is re-solved from this target after
        /// initialization
        magic_parameter: Option<Float>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub steps: usize,
    /// Macroscopic snapshot interval, 0 disables snapshots
    #[serde(default)]
    pub output_interval: usize,
    /// Distribution checkpoint interval, 0 disables checkpoints
    #[serde(default)]
    pub checkpoint_interval: usize,
    #[serde(default)]
    pub execution: ExecutionMode,
    /// Thread count for the thread-pool mode; defaults to all cores
    #[serde(default)]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_directory: String,
}

fn default_true() -> bool {
    true
}

fn default_ramp_time() -> Float {
    1000.0
}

fn default_psbb_range() -> [Float; 2] {
    [0.52, 10.0]
}

fn default_psbb_tolerance() -> Float {
    0.01
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Assemble the construction description the geometry builder consumes.
    pub fn construction_info(&self) -> ConstructionInfo {
        let mut info = ConstructionInfo::new();
        info.attach_domain_dimensions([self.domain.nx, self.domain.ny]);
        if self.domain.perimeter_walls {
            info.add_perimeter_nodes(NonFluidNodeType::Boundary);
        }
        for interval in &self.domain.inlets {
            info.add_nodes_interval(interval.from, interval.to, NonFluidNodeType::Inlet);
        }
        for interval in &self.domain.outlets {
            info.add_nodes_interval(interval.from, interval.to, NonFluidNodeType::Outlet);
        }
        for sphere in &self.domain.obstacles {
            info.add_obstacle_hyper_sphere(sphere.center, sphere.radius);
        }
        info
    }

    /// Relaxation time governing viscosity (tau for BGK, tau+ for TRT).
    pub fn viscous_tau(&self) -> Float {
        match self.physics.collision {
            CollisionConfig::Bgk { tau } => tau,
            CollisionConfig::Trt { tau_plus, .. } => tau_plus,
        }
    }

    /// Kinematic viscosity implied by the relaxation time.
    pub fn viscosity(&self) -> Float {
        D2Q9::CS2 * (self.viscous_tau() - 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::lattice::NodeType;

    fn cavity_json() -> &'static str {
        r#"{
            "domain": {
                "nx": 32,
                "ny": 32,
                "inlets": [{ "from": [1, 0], "to": [30, 0] }],
                "obstacles": [{ "center": [16, 16], "radius": 4.0 }]
            },
            "physics": {
                "density": 1.0,
                "inlet_velocity": 0.1,
                "collision": { "model": "trt", "tau_plus": 0.9, "tau_minus": 0.7, "magic_parameter": 0.25 }
            },
            "simulation": { "steps": 100, "output_interval": 10, "execution": "parallel_for" },
            "output": { "output_directory": "out" }
        }"#
    }

    #[test]
    fn parses_cavity_config() {
        let config: Config = serde_json::from_str(cavity_json()).unwrap();
        assert_eq!(config.domain.nx, 32);
        assert_eq!(config.simulation.execution, ExecutionMode::ParallelFor);
        assert!(matches!(
            config.physics.collision,
            CollisionConfig::Trt { magic_parameter: Some(_), .. }
        ));
        assert!((config.viscosity() - (0.9 - 0.5) / 3.0).abs() < 1e-6);
    }

    #[test]
    fn construction_info_round_trips_through_builder() {
        let config: Config = serde_json::from_str(cavity_json()).unwrap();
        let geometry = Geometry::build(&config.construction_info()).unwrap();
        assert_eq!(geometry.node_type_at(15, 0), NodeType::Inlet);
        assert_eq!(geometry.node_type_at(0, 0), NodeType::Boundary);
        assert_eq!(geometry.node_type_at(16, 16), NodeType::Obstacle);
    }
}
