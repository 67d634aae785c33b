use log::info;
use crate::error::{EngineError, Result};
use crate::execution::Executor;
use crate::geometry::Geometry;
use crate::lattice::{BoundaryPoint, D2Q9, Fields, NodeType, equilibrium};
use crate::Float;

/// Full-way bounce-back at static solid walls: every post-streaming
/// population on a wall node is reflected into its opposite direction,
/// enforcing zero velocity at the wall.
///
/// Updates are computed per node and scattered afterwards, so every execution
/// mode produces the same values.
pub fn bounce_back(executor: &Executor, fields: &mut Fields, nodes: &[BoundaryPoint]) {
    let nx = fields.dims[0];
    let f: &[Float] = &fields.f;

    let updates = executor.map_nodes(nodes, |point| {
        let n = point.coords[0] + point.coords[1] * nx;
        let mut reflected = [0.0 as Float; D2Q9::Q];
        for i in 0..D2Q9::Q {
            reflected[i] = f[n * D2Q9::Q + D2Q9::OPPOSITE[i]];
        }
        (n, reflected)
    });

    for (n, reflected) in updates {
        fields.f[n * D2Q9::Q..(n + 1) * D2Q9::Q].copy_from_slice(&reflected);
    }
}

/// Partially-saturated bounce-back for obstacle nodes with fractional solid
/// occupation `w`: blends the reflected populations with the unmodified
/// fluid-like ones in proportion to `w`.
///
/// Two-call setup, matching its narrower stability window: `initialize` fixes
/// the relaxation time, `allowed_tau` validates it against the documented
/// bounds. Applying the policy before both calls is a precondition violation.
pub struct PsBounceBack {
    tau: Float,
    tolerance: Float,
    range_checked: bool,
}

impl PsBounceBack {
    /// Record the relaxation time the collision operator will run with, plus
    /// the slack allowed when checking it against the stable range.
    pub fn initialize(tau: Float, tolerance: Float) -> Self {
        Self {
            tau,
            tolerance,
            range_checked: false,
        }
    }

    /// Validate the recorded relaxation time against the stable range for
    /// the blended scheme. Must be called once before the first `apply`.
    pub fn allowed_tau(&mut self, min: Float, max: Float) -> Result<()> {
        if self.tau < min - self.tolerance || self.tau > max + self.tolerance {
            return Err(EngineError::UnstableRelaxationTime {
                policy: "partially-saturated bounce-back",
                tau: self.tau,
                min,
                max,
            });
        }
        info!(
            "Partially-saturated bounce-back accepted tau = {} in ({min}, {max})",
            self.tau
        );
        self.range_checked = true;
        Ok(())
    }

    /// Blend bounce-back and fluid-like updates on every obstacle node.
    /// Weight 0 leaves the populations untouched; weight 1 is full
    /// bounce-back.
    pub fn apply(
        &self,
        executor: &Executor,
        fields: &mut Fields,
        nodes: &[BoundaryPoint],
    ) -> Result<()> {
        if !self.range_checked {
            return Err(EngineError::PsBounceBackNotInitialized);
        }

        let nx = fields.dims[0];
        let f: &[Float] = &fields.f;
        let weight: &[Float] = &fields.obstacle_weight;

        let updates = executor.map_nodes(nodes, |point| {
            let n = point.coords[0] + point.coords[1] * nx;
            let w = weight[n];
            let mut blended = [0.0 as Float; D2Q9::Q];
            for i in 0..D2Q9::Q {
                let fluid_like = f[n * D2Q9::Q + i];
                let reflected = f[n * D2Q9::Q + D2Q9::OPPOSITE[i]];
                blended[i] = (1.0 - w) * fluid_like + w * reflected;
            }
            (n, blended)
        });

        for (n, blended) in updates {
            fields.f[n * D2Q9::Q..(n + 1) * D2Q9::Q].copy_from_slice(&blended);
        }
        Ok(())
    }
}

/// Which macroscopic quantity a Zou–He node prescribes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZouHeKind {
    /// Target velocity read from the velocity field (maintained by the
    /// initializer); density follows from the known populations.
    Velocity,
    /// Fixed target density; normal velocity follows from the known
    /// populations, tangential velocity is zero.
    Pressure { target_density: Float },
}

/// Zou–He open boundary for inlet/outlet nodes.
///
/// After streaming, the populations pointing into the domain are unknown at a
/// truncated-domain node. The closure here pins the prescribed macroscopic
/// quantity through the moments of the known populations and reconstructs
/// each unknown population by non-equilibrium bounce-back,
/// `f_i = f_opp + (feq_i - feq_opp)`, at the target state.
pub struct ZouHe {
    kind: ZouHeKind,
    nodes: Vec<BoundaryPoint>,
    /// Inward (toward-fluid) axis-aligned unit normal per node, derived once
    /// from the classification grid.
    normals: Vec<[i32; 2]>,
}

impl ZouHe {
    pub fn new(kind: ZouHeKind) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
            normals: Vec::new(),
        }
    }

    /// One-time registration of the node list; replaces any previous
    /// registration. The inward normal of each node is derived from the
    /// neighboring classifications, and a node with no adjacent fluid cell is
    /// a geometry inconsistency.
    pub fn attach_nodes(&mut self, nodes: &[BoundaryPoint], geometry: &Geometry) -> Result<()> {
        let [nx, ny] = geometry.dims;
        let mut normals = Vec::with_capacity(nodes.len());

        for point in nodes {
            let [x, y] = point.coords;
            let mut normal = None;
            for candidate in [[1i32, 0], [-1, 0], [0, 1], [0, -1]] {
                let tx = x as i32 + candidate[0];
                let ty = y as i32 + candidate[1];
                if tx < 0 || ty < 0 || tx >= nx as i32 || ty >= ny as i32 {
                    continue;
                }
                if geometry.node_type_at(tx as usize, ty as usize) == NodeType::Fluid {
                    normal = Some(candidate);
                    break;
                }
            }
            match normal {
                Some(n) => normals.push(n),
                None => {
                    return Err(EngineError::GeometryInconsistency {
                        x,
                        y,
                        reason: "open-boundary node has no adjacent fluid node".into(),
                    });
                }
            }
        }

        self.nodes = nodes.to_vec();
        self.normals = normals;
        Ok(())
    }

    pub fn nodes(&self) -> &[BoundaryPoint] {
        &self.nodes
    }

    /// Inward normals in node-list order, available after `attach_nodes`.
    pub fn normals(&self) -> &[[i32; 2]] {
        &self.normals
    }

    /// Reconstruct the unknown populations of every registered node.
    pub fn apply(&self, executor: &Executor, fields: &mut Fields) {
        if self.nodes.is_empty() {
            return;
        }

        let nx = fields.dims[0];
        let kind = self.kind;
        let f: &[Float] = &fields.f;
        let velocity: &[Float] = &fields.velocity;

        let descriptors: Vec<(BoundaryPoint, [i32; 2])> = self
            .nodes
            .iter()
            .copied()
            .zip(self.normals.iter().copied())
            .collect();

        let updates = executor.map_nodes(&descriptors, |(point, normal)| {
            let n = point.coords[0] + point.coords[1] * nx;
            let mut local = [0.0 as Float; D2Q9::Q];
            local.copy_from_slice(&f[n * D2Q9::Q..(n + 1) * D2Q9::Q]);

            // Tangent unit vector, the normal rotated a quarter turn
            let tangent = [-normal[1], normal[0]];

            // Moments of the known populations, split by alignment with the
            // inward normal. `tangential_momentum` is the momentum the purely
            // tangential knowns carry along the wall.
            let mut tangent_sum = 0.0;
            let mut outgoing_sum = 0.0;
            let mut tangential_momentum = 0.0;
            for i in 0..D2Q9::Q {
                let c = D2Q9::VELOCITIES[i];
                let cn = c[0] * normal[0] + c[1] * normal[1];
                if cn == 0 {
                    tangent_sum += local[i];
                    tangential_momentum +=
                        (c[0] * tangent[0] + c[1] * tangent[1]) as Float * local[i];
                } else if cn < 0 {
                    outgoing_sum += local[i];
                }
            }

            let (rho, u) = match kind {
                ZouHeKind::Velocity => {
                    let u = [velocity[n * 2], velocity[n * 2 + 1]];
                    let u_n = u[0] * normal[0] as Float + u[1] * normal[1] as Float;
                    let rho = (tangent_sum + 2.0 * outgoing_sum) / (1.0 - u_n);
                    (rho, u)
                }
                ZouHeKind::Pressure { target_density } => {
                    let u_n = 1.0 - (tangent_sum + 2.0 * outgoing_sum) / target_density;
                    let u = [u_n * normal[0] as Float, u_n * normal[1] as Float];
                    (target_density, u)
                }
            };
            let u_t = u[0] * tangent[0] as Float + u[1] * tangent[1] as Float;

            // Non-equilibrium bounce-back for the unknown (incoming)
            // populations, with the transverse correction that redistributes
            // the tangential imbalance of the knowns onto the diagonal
            // unknowns. Without it the reconstructed moment carries only a
            // third of a prescribed tangential velocity. Known populations
            // stay as streamed.
            for i in 0..D2Q9::Q {
                let c = D2Q9::VELOCITIES[i];
                let cn = c[0] * normal[0] + c[1] * normal[1];
                if cn > 0 {
                    let opp = D2Q9::OPPOSITE[i];
                    let ct = (c[0] * tangent[0] + c[1] * tangent[1]) as Float;
                    local[i] = local[opp] + equilibrium(i, rho, u) - equilibrium(opp, rho, u)
                        - ct * (0.5 * tangential_momentum - rho * u_t / 3.0);
                }
            }
            (n, local)
        });

        for (n, local) in updates {
            fields.f[n * D2Q9::Q..(n + 1) * D2Q9::Q].copy_from_slice(&local);
        }
    }
}
