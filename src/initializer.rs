use std::io::Write;
use crate::error::{EngineError, Result};
use crate::execution::Executor;
use crate::lattice::{BoundaryPoint, Fields};
use crate::Float;

/// One velocity component as a function of time and node position. Pure with
/// respect to engine state: it must not touch the field tensors.
pub type UpdateFn = Box<dyn Fn(Float, BoundaryPoint) -> Float + Send + Sync>;

/// Maintains the time-varying Dirichlet velocity targets at inlet and outlet
/// nodes, feeding the Zou–He velocity boundary.
///
/// Both attach operations are one-time setup calls that replace any previous
/// registration; `update_nodes` is the only per-timestep operation and reads
/// the registered state without growing it.
#[derive(Default)]
pub struct VelocityInitializer {
    inlet_nodes: Vec<BoundaryPoint>,
    outlet_nodes: Vec<BoundaryPoint>,
    inlet_update_functions: Option<[UpdateFn; 2]>,
    outlet_update_functions: Option<[UpdateFn; 2]>,
}

impl VelocityInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the inlet and outlet node lists. Not additive: the previous
    /// registration is discarded entirely.
    pub fn attach_nodes(&mut self, inlet_nodes: &[BoundaryPoint], outlet_nodes: &[BoundaryPoint]) {
        self.inlet_nodes = inlet_nodes.to_vec();
        self.outlet_nodes = outlet_nodes.to_vec();
    }

    /// Register one update function per spatial dimension for each family.
    pub fn attach_update_functions(
        &mut self,
        inlet_update_functions: [UpdateFn; 2],
        outlet_update_functions: [UpdateFn; 2],
    ) {
        self.inlet_update_functions = Some(inlet_update_functions);
        self.outlet_update_functions = Some(outlet_update_functions);
    }

    /// Evaluate the registered functions at `time` for every registered
    /// node, without writing any field. Used directly by the accelerator
    /// path, which uploads the targets instead of scattering them.
    pub fn targets(&self, time: Float, nx: usize) -> Result<Vec<(usize, [Float; 2])>> {
        let mut all = Vec::with_capacity(self.inlet_nodes.len() + self.outlet_nodes.len());
        for (nodes, functions) in [
            (&self.inlet_nodes, &self.inlet_update_functions),
            (&self.outlet_nodes, &self.outlet_update_functions),
        ] {
            if nodes.is_empty() {
                continue;
            }
            let functions = functions.as_ref().ok_or_else(|| {
                EngineError::InvalidConstruction(
                    "velocity update functions referenced before being attached".into(),
                )
            })?;
            for point in nodes {
                let n = point.coords[0] + point.coords[1] * nx;
                all.push((n, [functions[0](time, *point), functions[1](time, *point)]));
            }
        }
        Ok(all)
    }

    /// Refresh the velocity-field targets of every registered inlet node,
    /// then every registered outlet node. Distinct nodes never alias the
    /// same cell, so per-node evaluations are independent and the execution
    /// modes are interchangeable. With nothing registered this is a no-op.
    pub fn update_nodes(
        &self,
        time: Float,
        executor: &Executor,
        fields: &mut Fields,
    ) -> Result<()> {
        let nx = fields.dims[0];
        for (nodes, functions) in [
            (&self.inlet_nodes, &self.inlet_update_functions),
            (&self.outlet_nodes, &self.outlet_update_functions),
        ] {
            if nodes.is_empty() {
                continue;
            }
            let functions = functions.as_ref().ok_or_else(|| {
                EngineError::InvalidConstruction(
                    "velocity update functions referenced before being attached".into(),
                )
            })?;

            let updates = executor.map_nodes(nodes, |point| {
                let n = point.coords[0] + point.coords[1] * nx;
                (n, [functions[0](time, *point), functions[1](time, *point)])
            });
            for (n, target) in updates {
                fields.velocity[n * 2] = target[0];
                fields.velocity[n * 2 + 1] = target[1];
            }
        }
        Ok(())
    }

    /// Diagnostic dump of the registered node coordinates.
    pub fn print_data(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writeln!(writer, "Inlet nodes:")?;
        for (i, point) in self.inlet_nodes.iter().enumerate() {
            writeln!(writer, "Node {}: {} {}", i, point.coords[0], point.coords[1])?;
        }
        writeln!(writer, "Outlet nodes:")?;
        for (i, point) in self.outlet_nodes.iter().enumerate() {
            writeln!(writer, "Node {}: {} {}", i, point.coords[0], point.coords[1])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionMode;

    fn constant_functions(ux: Float, uy: Float) -> [UpdateFn; 2] {
        [
            Box::new(move |_, _| ux),
            Box::new(move |_, _| uy),
        ]
    }

    fn executor() -> Executor {
        Executor::new(ExecutionMode::Sequential, None).unwrap()
    }

    #[test]
    fn constant_update_writes_exactly_the_registered_cells() {
        let mut fields = Fields::new([8, 8]);
        let points = [BoundaryPoint::new(2, 0), BoundaryPoint::new(5, 0)];

        let mut initializer = VelocityInitializer::new();
        initializer.attach_nodes(&points, &[]);
        initializer
            .attach_update_functions(constant_functions(0.2, 0.0), constant_functions(0.0, 0.0));
        initializer
            .update_nodes(0.0, &executor(), &mut fields)
            .unwrap();

        for y in 0..8 {
            for x in 0..8 {
                let expected = if points.contains(&BoundaryPoint::new(x, y)) {
                    [0.2, 0.0]
                } else {
                    [0.0, 0.0]
                };
                assert_eq!(fields.velocity_at(x, y), expected, "node ({x}, {y})");
            }
        }
    }

    #[test]
    fn reattaching_nodes_discards_previous_registration() {
        let mut fields = Fields::new([8, 8]);
        let mut initializer = VelocityInitializer::new();
        initializer.attach_nodes(
            &[BoundaryPoint::new(1, 1), BoundaryPoint::new(2, 2)],
            &[],
        );
        initializer
            .attach_update_functions(constant_functions(0.3, 0.0), constant_functions(0.0, 0.0));

        // Shrink the registration, then update: only the new node is touched
        initializer.attach_nodes(&[BoundaryPoint::new(4, 4)], &[]);
        initializer
            .update_nodes(1.0, &executor(), &mut fields)
            .unwrap();

        assert_eq!(fields.velocity_at(4, 4), [0.3, 0.0]);
        assert_eq!(fields.velocity_at(1, 1), [0.0, 0.0]);
        assert_eq!(fields.velocity_at(2, 2), [0.0, 0.0]);
    }

    #[test]
    fn empty_registration_is_a_noop() {
        let mut fields = Fields::new([4, 4]);
        let initializer = VelocityInitializer::new();
        initializer
            .update_nodes(0.0, &executor(), &mut fields)
            .unwrap();
        assert!(fields.velocity.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn nodes_without_functions_fail_fast() {
        let mut fields = Fields::new([4, 4]);
        let mut initializer = VelocityInitializer::new();
        initializer.attach_nodes(&[BoundaryPoint::new(1, 1)], &[]);
        let err = initializer
            .update_nodes(0.0, &executor(), &mut fields)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConstruction(_)));
    }

    #[test]
    fn all_execution_modes_produce_identical_updates() {
        let points: Vec<BoundaryPoint> = (1..7).map(|x| BoundaryPoint::new(x, 0)).collect();
        let time_dependent: fn() -> [UpdateFn; 2] = || {
            [
                Box::new(|t: Float, p: BoundaryPoint| 0.2 * t + 0.01 * p.coords[0] as Float),
                Box::new(|t: Float, p: BoundaryPoint| -0.1 * t + 0.02 * p.coords[1] as Float),
            ]
        };

        let mut reference: Option<Vec<Float>> = None;
        for mode in [
            ExecutionMode::Sequential,
            ExecutionMode::ThreadPool,
            ExecutionMode::ParallelFor,
        ] {
            let executor = Executor::new(mode, Some(4)).unwrap();
            let mut fields = Fields::new([8, 8]);
            let mut initializer = VelocityInitializer::new();
            initializer.attach_nodes(&points, &[]);
            initializer.attach_update_functions(time_dependent(), time_dependent());
            initializer
                .update_nodes(2.5, &executor, &mut fields)
                .unwrap();

            match &reference {
                None => reference = Some(fields.velocity.clone()),
                Some(expected) => assert_eq!(expected, &fields.velocity, "{mode:?}"),
            }
        }
    }
}
