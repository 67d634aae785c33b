use std::collections::HashMap;
use log::info;
use serde::{Deserialize, Serialize};
use crate::error::{EngineError, Result};
use crate::lattice::{BoundaryPoint, NodeType};
use crate::Float;

/// Classification a construction step assigns to nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFluidNodeType {
    Boundary,
    Obstacle,
    Inlet,
    Outlet,
}

impl From<NonFluidNodeType> for NodeType {
    fn from(t: NonFluidNodeType) -> Self {
        match t {
            NonFluidNodeType::Boundary => NodeType::Boundary,
            NonFluidNodeType::Obstacle => NodeType::Obstacle,
            NonFluidNodeType::Inlet => NodeType::Inlet,
            NonFluidNodeType::Outlet => NodeType::Outlet,
        }
    }
}

/// Circular obstacle used both to seed obstacle nodes and, later, to derive
/// their fractional occupation weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObstacleSphere {
    pub center: [usize; 2],
    pub radius: Float,
}

/// Declarative description of the domain, accumulated by user code and turned
/// into a classified lattice by [`Geometry::build`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstructionInfo {
    dims: Option<[usize; 2]>,
    perimeter: Option<NonFluidNodeType>,
    intervals: Vec<NodeInterval>,
    spheres: Vec<ObstacleSphere>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct NodeInterval {
    from: [usize; 2],
    to: [usize; 2],
    node_type: NonFluidNodeType,
}

impl ConstructionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-axis lattice extents. Required before `build`.
    pub fn attach_domain_dimensions(&mut self, dims: [usize; 2]) -> &mut Self {
        self.dims = Some(dims);
        self
    }

    /// Classify the whole domain rim. Later interval/sphere steps may
    /// re-classify rim nodes (e.g. carving an inlet out of a wall).
    pub fn add_perimeter_nodes(&mut self, node_type: NonFluidNodeType) -> &mut Self {
        self.perimeter = Some(node_type);
        self
    }

    /// Classify an axis-aligned coordinate interval, inclusive on both ends.
    pub fn add_nodes_interval(
        &mut self,
        from: [usize; 2],
        to: [usize; 2],
        node_type: NonFluidNodeType,
    ) -> &mut Self {
        self.intervals.push(NodeInterval { from, to, node_type });
        self
    }

    /// Seed obstacle nodes within a disc of the given radius.
    pub fn add_obstacle_hyper_sphere(&mut self, center: [usize; 2], radius: Float) -> &mut Self {
        self.spheres.push(ObstacleSphere { center, radius });
        self
    }
}

/// Classified lattice: the node-type grid plus one coordinate list per class.
///
/// The lists are what the policies loop over; validation at build time
/// guarantees they are disjoint and duplicate-free, which the parallel node
/// loops rely on.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub dims: [usize; 2],
    pub node_type: Vec<NodeType>,
    pub fluid_nodes: Vec<BoundaryPoint>,
    pub boundary_nodes: Vec<BoundaryPoint>,
    pub obstacle_nodes: Vec<BoundaryPoint>,
    pub inlet_nodes: Vec<BoundaryPoint>,
    pub outlet_nodes: Vec<BoundaryPoint>,
    pub spheres: Vec<ObstacleSphere>,
}

impl Geometry {
    pub fn build(info: &ConstructionInfo) -> Result<Self> {
        let dims = info.dims.ok_or_else(|| {
            EngineError::InvalidConstruction("domain dimensions not attached".into())
        })?;
        let [nx, ny] = dims;
        if nx < 3 || ny < 3 {
            return Err(EngineError::InvalidConstruction(format!(
                "domain {nx}x{ny} too small for a boundary rim"
            )));
        }

        // Rim classification first; explicit steps afterwards may override it
        // (carving inlets out of a wall), but two explicit steps must agree.
        let mut rim: HashMap<(usize, usize), NodeType> = HashMap::new();
        if let Some(t) = info.perimeter {
            let t = NodeType::from(t);
            for x in 0..nx {
                rim.insert((x, 0), t);
                rim.insert((x, ny - 1), t);
            }
            for y in 0..ny {
                rim.insert((0, y), t);
                rim.insert((nx - 1, y), t);
            }
        }

        let mut explicit: HashMap<(usize, usize), NodeType> = HashMap::new();
        let mut assign = |x: usize, y: usize, t: NodeType| -> Result<()> {
            if x >= nx || y >= ny {
                return Err(EngineError::OutOfDomain { x, y, nx, ny });
            }
            if let Some(prev) = explicit.insert((x, y), t) {
                return Err(EngineError::GeometryInconsistency {
                    x,
                    y,
                    reason: format!("classified as both {prev:?} and {t:?}"),
                });
            }
            Ok(())
        };

        for interval in &info.intervals {
            let t = NodeType::from(interval.node_type);
            for x in interval.from[0]..=interval.to[0] {
                for y in interval.from[1]..=interval.to[1] {
                    assign(x, y, t)?;
                }
            }
        }

        for sphere in &info.spheres {
            let r = sphere.radius.ceil() as i64;
            let (cx, cy) = (sphere.center[0] as i64, sphere.center[1] as i64);
            for x in (cx - r).max(0)..=(cx + r).min(nx as i64 - 1) {
                for y in (cy - r).max(0)..=(cy + r).min(ny as i64 - 1) {
                    let dx = (x - cx) as Float;
                    let dy = (y - cy) as Float;
                    if (dx * dx + dy * dy).sqrt() <= sphere.radius {
                        assign(x as usize, y as usize, NodeType::Obstacle)?;
                    }
                }
            }
        }

        let mut node_type = vec![NodeType::Fluid; nx * ny];
        for ((x, y), t) in rim {
            node_type[x + y * nx] = t;
        }
        for ((x, y), t) in explicit {
            node_type[x + y * nx] = t;
        }

        let mut geometry = Self {
            dims,
            node_type,
            fluid_nodes: Vec::new(),
            boundary_nodes: Vec::new(),
            obstacle_nodes: Vec::new(),
            inlet_nodes: Vec::new(),
            outlet_nodes: Vec::new(),
            spheres: info.spheres.clone(),
        };
        for y in 0..ny {
            for x in 0..nx {
                let point = BoundaryPoint::new(x, y);
                match geometry.node_type[x + y * nx] {
                    NodeType::Fluid => geometry.fluid_nodes.push(point),
                    NodeType::Boundary => geometry.boundary_nodes.push(point),
                    NodeType::Obstacle => geometry.obstacle_nodes.push(point),
                    NodeType::Inlet => geometry.inlet_nodes.push(point),
                    NodeType::Outlet => geometry.outlet_nodes.push(point),
                }
            }
        }

        info!(
            "Built {}x{} lattice: {} fluid, {} boundary, {} obstacle, {} inlet, {} outlet nodes",
            nx,
            ny,
            geometry.fluid_nodes.len(),
            geometry.boundary_nodes.len(),
            geometry.obstacle_nodes.len(),
            geometry.inlet_nodes.len(),
            geometry.outlet_nodes.len()
        );

        Ok(geometry)
    }

    #[inline]
    pub fn node_index(&self, x: usize, y: usize) -> usize {
        x + y * self.dims[0]
    }

    pub fn node_type_at(&self, x: usize, y: usize) -> NodeType {
        self.node_type[self.node_index(x, y)]
    }

    /// Fractional solid occupation for every obstacle node, from the signed
    /// distance to the nearest sphere surface. Deep inside a sphere the
    /// weight saturates at 1, at the surface it falls off linearly to 0 over
    /// one lattice spacing.
    pub fn obstacle_weights(&self) -> Vec<Float> {
        let mut weights = vec![0.0; self.dims[0] * self.dims[1]];
        for point in &self.obstacle_nodes {
            let [x, y] = point.coords;
            let mut best: Float = 0.0;
            for sphere in &self.spheres {
                let dx = x as Float - sphere.center[0] as Float;
                let dy = y as Float - sphere.center[1] as Float;
                let dist = (dx * dx + dy * dy).sqrt();
                let w = (sphere.radius - dist + 0.5).clamp(0.0, 1.0);
                best = best.max(w);
            }
            weights[self.node_index(x, y)] = best;
        }
        weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lid_info() -> ConstructionInfo {
        let mut info = ConstructionInfo::new();
        info.attach_domain_dimensions([10, 10]);
        info.add_perimeter_nodes(NonFluidNodeType::Boundary);
        info.add_nodes_interval([1, 0], [8, 0], NonFluidNodeType::Inlet);
        info
    }

    #[test]
    fn perimeter_and_inlet_classification() {
        let geometry = Geometry::build(&lid_info()).unwrap();
        assert_eq!(geometry.node_type_at(0, 0), NodeType::Boundary);
        assert_eq!(geometry.node_type_at(5, 0), NodeType::Inlet);
        assert_eq!(geometry.node_type_at(5, 5), NodeType::Fluid);
        assert_eq!(geometry.inlet_nodes.len(), 8);
        assert_eq!(geometry.fluid_nodes.len(), 64);
    }

    #[test]
    fn conflicting_classification_is_rejected() {
        let mut info = lid_info();
        info.add_obstacle_hyper_sphere([4, 0], 1.0);
        let err = Geometry::build(&info).unwrap_err();
        assert!(matches!(err, EngineError::GeometryInconsistency { .. }));
    }

    #[test]
    fn duplicate_interval_is_rejected() {
        let mut info = lid_info();
        info.add_nodes_interval([1, 0], [8, 0], NonFluidNodeType::Inlet);
        let err = Geometry::build(&info).unwrap_err();
        assert!(matches!(err, EngineError::GeometryInconsistency { .. }));
    }

    #[test]
    fn out_of_domain_interval_is_rejected() {
        let mut info = lid_info();
        info.add_nodes_interval([0, 9], [0, 12], NonFluidNodeType::Outlet);
        let err = Geometry::build(&info).unwrap_err();
        assert!(matches!(err, EngineError::OutOfDomain { .. }));
    }

    #[test]
    fn missing_dimensions_is_rejected() {
        let info = ConstructionInfo::new();
        let err = Geometry::build(&info).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConstruction(_)));
    }

    #[test]
    fn obstacle_weights_saturate_inside() {
        let mut info = ConstructionInfo::new();
        info.attach_domain_dimensions([20, 20]);
        info.add_perimeter_nodes(NonFluidNodeType::Boundary);
        info.add_obstacle_hyper_sphere([10, 10], 4.0);
        let geometry = Geometry::build(&info).unwrap();
        let weights = geometry.obstacle_weights();

        assert!(!geometry.obstacle_nodes.is_empty());
        // Center node is fully occupied
        assert!((weights[geometry.node_index(10, 10)] - 1.0).abs() < 1e-6);
        // Non-obstacle nodes carry no weight
        assert_eq!(weights[geometry.node_index(1, 1)], 0.0);
        // Every obstacle weight is a valid fraction
        for p in &geometry.obstacle_nodes {
            let w = weights[geometry.node_index(p.coords[0], p.coords[1])];
            assert!((0.0..=1.0).contains(&w));
        }
    }
}
