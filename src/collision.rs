use log::info;
use crate::error::{EngineError, Result};
use crate::execution::Executor;
use crate::lattice::{D2Q9, Fields, NodeType, equilibrium};
use crate::Float;

/// Local relaxation operator applied to every fluid node.
///
/// Construction goes through `initialize_bgk`/`initialize_trt`, which reject
/// relaxation times at or below 1/2 (the BGK/TRT stability limit). The
/// orchestrator holds an `Option<CollisionOperator>` so a run without a prior
/// initialization call fails fast instead of colliding with undefined
/// coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionOperator {
    Bgk {
        tau: Float,
    },
    /// Two-relaxation-time: symmetric part relaxed with `tau_plus`,
    /// antisymmetric part with `tau_minus`.
    Trt {
        tau_plus: Float,
        tau_minus: Float,
    },
}

fn check_tau(policy: &'static str, tau: Float) -> Result<()> {
    if tau <= 0.5 || !tau.is_finite() {
        return Err(EngineError::UnstableRelaxationTime {
            policy,
            tau,
            min: 0.5,
            max: Float::INFINITY,
        });
    }
    Ok(())
}

impl CollisionOperator {
    pub fn initialize_bgk(tau: Float) -> Result<Self> {
        check_tau("BGK", tau)?;
        info!("Initialized BGK collision with tau = {tau}");
        Ok(Self::Bgk { tau })
    }

    pub fn initialize_trt(tau_plus: Float, tau_minus: Float) -> Result<Self> {
        check_tau("TRT", tau_plus)?;
        check_tau("TRT", tau_minus)?;
        info!("Initialized TRT collision with tau+ = {tau_plus}, tau- = {tau_minus}");
        Ok(Self::Trt { tau_plus, tau_minus })
    }

    /// Magic parameter Λ = (τ⁺ − 1/2)(τ⁻ − 1/2). BGK is the τ⁺ = τ⁻ case.
    pub fn compute_magic_parameter(&self) -> Float {
        match *self {
            Self::Bgk { tau } => (tau - 0.5) * (tau - 0.5),
            Self::Trt { tau_plus, tau_minus } => (tau_plus - 0.5) * (tau_minus - 0.5),
        }
    }

    /// Fix Λ by solving τ⁻ from the current τ⁺, leaving viscosity (which τ⁺
    /// controls) untouched. Only meaningful for TRT.
    pub fn enforce_magic_parameter(&mut self, lambda: Float) -> Result<()> {
        match self {
            Self::Bgk { .. } => Err(EngineError::InvalidConstruction(
                "magic parameter enforcement requires the TRT operator".into(),
            )),
            Self::Trt { tau_plus, tau_minus } => {
                let solved = 0.5 + lambda / (*tau_plus - 0.5);
                check_tau("TRT", solved)?;
                *tau_minus = solved;
                info!("Enforced magic parameter {lambda}: tau- = {solved}");
                Ok(())
            }
        }
    }

    /// Relax the distributions of every fluid node toward equilibrium,
    /// in place. Non-fluid nodes are left to the boundary policies.
    pub fn collide(&self, executor: &Executor, fields: &mut Fields) {
        let Fields {
            f,
            density,
            velocity,
            node_type,
            ..
        } = fields;
        let operator = *self;
        let density: &[Float] = density;
        let velocity: &[Float] = velocity;
        let node_type: &[NodeType] = node_type;

        executor.for_each_node(f, D2Q9::Q, |n, f_node| {
            if node_type[n] != NodeType::Fluid {
                return;
            }
            let rho = density[n];
            let u = [velocity[n * 2], velocity[n * 2 + 1]];
            let mut feq = [0.0 as Float; D2Q9::Q];
            for i in 0..D2Q9::Q {
                feq[i] = equilibrium(i, rho, u);
            }
            match operator {
                Self::Bgk { tau } => {
                    let omega = 1.0 / tau;
                    for i in 0..D2Q9::Q {
                        f_node[i] += omega * (feq[i] - f_node[i]);
                    }
                }
                Self::Trt { tau_plus, tau_minus } => {
                    let mut pre = [0.0 as Float; D2Q9::Q];
                    pre.copy_from_slice(f_node);
                    for i in 0..D2Q9::Q {
                        let opp = D2Q9::OPPOSITE[i];
                        let f_sym = 0.5 * (pre[i] + pre[opp]);
                        let f_anti = 0.5 * (pre[i] - pre[opp]);
                        let feq_sym = 0.5 * (feq[i] + feq[opp]);
                        let feq_anti = 0.5 * (feq[i] - feq[opp]);
                        f_node[i] = pre[i]
                            - (f_sym - feq_sym) / tau_plus
                            - (f_anti - feq_anti) / tau_minus;
                    }
                }
            }
        });
    }
}
