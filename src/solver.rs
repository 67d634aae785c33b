use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use crate::boundary::{PsBounceBack, ZouHe, ZouHeKind, bounce_back};
use crate::collision::CollisionOperator;
use crate::config::{CollisionConfig, Config};
use crate::error::{EngineError, Result};
use crate::execution::{ExecutionMode, Executor};
use crate::geometry::Geometry;
use crate::gpu::{GpuContext, GpuParams, VelocityTarget};
use crate::initializer::{UpdateFn, VelocityInitializer};
use crate::lattice::{D2Q9, Fields};
use crate::output::{SnapshotWriter, print_lattice_structure};
use crate::Float;

/// Owns the full field state and runs the timestep pipeline.
///
/// Every step executes, in fixed order: initializer update, streaming,
/// boundary fixups, collision, macroscopic recompute. Each phase completes
/// (all parallel work joined) before the next begins, because phase N+1 reads
/// values phase N produced lattice-wide.
pub struct Lattice {
    geometry: Geometry,
    fields: Fields,
    scratch: Vec<Float>,
    mode: ExecutionMode,
    executor: Executor,
    collision: Option<CollisionOperator>,
    psbb: Option<PsBounceBack>,
    zou_he_inlet: ZouHe,
    zou_he_outlet: ZouHe,
    initializer: VelocityInitializer,
    writer: Option<SnapshotWriter>,
    gpu: Option<GpuContext>,
    reference_density: Float,
    step: usize,
}

impl Lattice {
    /// Build a lattice over an already-validated geometry. Fields start at
    /// the reference density and zero velocity, seeded with equilibrium
    /// distributions; open-boundary node lists are registered with the
    /// Zou–He policies and the initializer.
    pub fn new(
        geometry: Geometry,
        mode: ExecutionMode,
        threads: Option<usize>,
        reference_density: Float,
    ) -> Result<Self> {
        let mut fields = Fields::new(geometry.dims);
        fields.node_type.copy_from_slice(&geometry.node_type);
        for rho in fields.density.iter_mut() {
            *rho = reference_density;
        }
        fields.init_equilibrium();
        let scratch = vec![0.0; fields.f.len()];

        let mut zou_he_inlet = ZouHe::new(ZouHeKind::Velocity);
        zou_he_inlet.attach_nodes(&geometry.inlet_nodes, &geometry)?;
        let mut zou_he_outlet = ZouHe::new(ZouHeKind::Pressure {
            target_density: reference_density,
        });
        zou_he_outlet.attach_nodes(&geometry.outlet_nodes, &geometry)?;

        let mut initializer = VelocityInitializer::new();
        initializer.attach_nodes(&geometry.inlet_nodes, &geometry.outlet_nodes);

        let executor = Executor::new(mode, threads)?;

        Ok(Self {
            geometry,
            fields,
            scratch,
            mode,
            executor,
            collision: None,
            psbb: None,
            zou_he_inlet,
            zou_he_outlet,
            initializer,
            writer: None,
            gpu: None,
            reference_density,
            step: 0,
        })
    }

    /// Full configuration-driven setup: geometry construction, execution
    /// strategy, collision operator (with optional magic-parameter
    /// enforcement), PSBB window, and output directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let geometry = Geometry::build(&config.construction_info())?;
        let mut lattice = Self::new(
            geometry,
            config.simulation.execution,
            config.simulation.threads,
            config.physics.density,
        )?;

        let operator = match config.physics.collision {
            CollisionConfig::Bgk { tau } => CollisionOperator::initialize_bgk(tau)?,
            CollisionConfig::Trt {
                tau_plus,
                tau_minus,
                magic_parameter,
            } => {
                let mut operator = CollisionOperator::initialize_trt(tau_plus, tau_minus)?;
                if let Some(lambda) = magic_parameter {
                    operator.enforce_magic_parameter(lambda)?;
                }
                operator
            }
        };
        lattice.initialize_collision(operator);

        if !lattice.geometry.obstacle_nodes.is_empty() {
            let mut psbb =
                PsBounceBack::initialize(config.viscous_tau(), config.physics.psbb_tolerance);
            psbb.allowed_tau(config.physics.psbb_tau_range[0], config.physics.psbb_tau_range[1])?;
            lattice.attach_psbb(psbb);
            lattice.compute_obstacle_weight();
        }

        lattice.set_output_directory(&config.output.output_directory)?;
        Ok(lattice)
    }

    /// One-time attachment of relaxation parameters. Running without this
    /// call is a precondition violation.
    pub fn initialize_collision(&mut self, operator: CollisionOperator) {
        self.collision = Some(operator);
    }

    pub fn attach_psbb(&mut self, psbb: PsBounceBack) {
        self.psbb = Some(psbb);
    }

    /// Forward the per-dimension velocity functions to the initializer.
    pub fn attach_update_functions(
        &mut self,
        inlet_functions: [UpdateFn; 2],
        outlet_functions: [UpdateFn; 2],
    ) {
        self.initializer
            .attach_update_functions(inlet_functions, outlet_functions);
    }

    /// One-time precomputation of the PSBB occupation weights from the
    /// obstacle geometry. Must run before the time loop when obstacles exist.
    pub fn compute_obstacle_weight(&mut self) {
        self.fields.obstacle_weight = self.geometry.obstacle_weights();
    }

    pub fn set_output_directory(&mut self, directory: &str) -> Result<()> {
        std::fs::create_dir_all(directory)?;
        self.writer = Some(SnapshotWriter::new(directory));
        Ok(())
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn print_lattice_structure(
        &self,
        writer: &mut impl std::io::Write,
        verbose: bool,
    ) -> std::io::Result<()> {
        print_lattice_structure(&self.fields, writer, verbose)?;
        if verbose {
            self.initializer.print_data(writer)?;
        }
        Ok(())
    }

    /// Advance the simulation by `num_steps`. Macroscopic snapshots are
    /// written every `output_interval` steps and full distribution
    /// checkpoints every `checkpoint_interval` steps; an interval of zero
    /// disables that output. This is the only entry point that advances
    /// simulation time.
    pub fn perform_lbm(
        &mut self,
        num_steps: usize,
        output_interval: usize,
        checkpoint_interval: usize,
    ) -> Result<()> {
        let collision = self.collision.ok_or(EngineError::CollisionNotInitialized)?;
        if !self.geometry.obstacle_nodes.is_empty() {
            if self.psbb.is_none() {
                return Err(EngineError::PsBounceBackNotInitialized);
            }
            // Every classified obstacle node has occupation >= 1/2, so an
            // all-zero tensor means the weights were never computed and the
            // blend would pass fluid straight through the obstacle.
            if self.fields.obstacle_weight.iter().all(|w| *w == 0.0) {
                return Err(EngineError::InvalidConstruction(
                    "obstacle nodes present but occupation weights are all zero: \
                     call compute_obstacle_weight during setup"
                        .into(),
                ));
            }
        }

        info!(
            "Starting LBM run: {} steps on a {}x{} lattice ({:?} execution)",
            num_steps, self.fields.dims[0], self.fields.dims[1], self.mode
        );

        let progress = ProgressBar::new(num_steps as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} steps ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        if self.mode == ExecutionMode::Accelerator {
            self.ensure_gpu(collision)?;
        }

        for _ in 0..num_steps {
            if self.mode == ExecutionMode::Accelerator {
                self.step_device()?;
            } else {
                self.step_host(&collision)?;
            }
            progress.inc(1);

            let due = |interval: usize| interval > 0 && self.step % interval == 0;
            if due(output_interval) || due(checkpoint_interval) {
                if self.mode == ExecutionMode::Accelerator {
                    if let Some(gpu) = &self.gpu {
                        gpu.read_fields(&mut self.fields)?;
                    }
                }
                if due(output_interval) {
                    if let Some(writer) = &self.writer {
                        let filename = writer.write_snapshot(&self.fields, self.step)?;
                        debug!("Wrote snapshot {filename}");
                    }
                }
                if due(checkpoint_interval) {
                    if let Some(writer) = &self.writer {
                        let filename = writer.write_checkpoint(&self.fields, self.step)?;
                        debug!("Wrote checkpoint {filename}");
                    }
                }
            }
        }
        progress.finish_and_clear();

        if self.mode == ExecutionMode::Accelerator {
            if let Some(gpu) = &self.gpu {
                gpu.read_fields(&mut self.fields)?;
            }
        }

        info!("Completed {} steps (total {})", num_steps, self.step);
        Ok(())
    }

    fn step_host(&mut self, collision: &CollisionOperator) -> Result<()> {
        let time = self.step as Float;

        // (a) refresh boundary velocity targets
        self.initializer
            .update_nodes(time, &self.executor, &mut self.fields)?;

        // (b) streaming
        self.stream();

        // (c) boundary fixups, one classification per loop
        bounce_back(&self.executor, &mut self.fields, &self.geometry.boundary_nodes);
        if let Some(psbb) = &self.psbb {
            psbb.apply(&self.executor, &mut self.fields, &self.geometry.obstacle_nodes)?;
        }
        self.zou_he_inlet.apply(&self.executor, &mut self.fields);
        self.zou_he_outlet.apply(&self.executor, &mut self.fields);

        // (d) collision on fluid nodes
        collision.collide(&self.executor, &mut self.fields);

        // (e) macroscopic recompute
        self.update_macroscopic();

        self.step += 1;
        Ok(())
    }

    /// Pull streaming: every node gathers, per direction, the population
    /// that was travelling toward it. Populations whose upwind neighbor
    /// falls outside the domain stay put; the rim is solid or open-boundary,
    /// so the fixup phase overwrites them anyway.
    fn stream(&mut self) {
        let [nx, ny] = self.fields.dims;
        let f_old: &[Float] = &self.fields.f;

        self.executor.for_each_node(&mut self.scratch, D2Q9::Q, |n, chunk| {
            let x = (n % nx) as i32;
            let y = (n / nx) as i32;
            for i in 0..D2Q9::Q {
                let c = D2Q9::VELOCITIES[i];
                let sx = x - c[0];
                let sy = y - c[1];
                chunk[i] = if sx >= 0 && sy >= 0 && sx < nx as i32 && sy < ny as i32 {
                    f_old[(sx as usize + sy as usize * nx) * D2Q9::Q + i]
                } else {
                    f_old[n * D2Q9::Q + i]
                };
            }
        });
        std::mem::swap(&mut self.fields.f, &mut self.scratch);
    }

    fn update_macroscopic(&mut self) {
        let Fields {
            f,
            density,
            velocity,
            ..
        } = &mut self.fields;
        let f: &[Float] = f;

        self.executor.for_each_moment(density, velocity, |n, rho, u| {
            let (r, v) = Fields::moments(&f[n * D2Q9::Q..(n + 1) * D2Q9::Q]);
            *rho = r;
            u[0] = v[0];
            u[1] = v[1];
        });
    }

    fn ensure_gpu(&mut self, collision: CollisionOperator) -> Result<()> {
        if self.gpu.is_some() {
            return Ok(());
        }

        let (model, tau_plus, tau_minus) = match collision {
            CollisionOperator::Bgk { tau } => (0, tau, tau),
            CollisionOperator::Trt { tau_plus, tau_minus } => (1, tau_plus, tau_minus),
        };
        let num_targets =
            self.geometry.inlet_nodes.len() + self.geometry.outlet_nodes.len();
        let params = GpuParams {
            nx: self.fields.dims[0] as u32,
            ny: self.fields.dims[1] as u32,
            model,
            num_targets: num_targets as u32,
            tau_plus,
            tau_minus,
            target_density: self.reference_density,
            _pad: 0.0,
        };

        let gpu = GpuContext::new(&self.fields, &self.normals_grid(), params, num_targets)?;
        gpu.upload_fields(&self.fields);
        self.gpu = Some(gpu);
        Ok(())
    }

    /// Per-node inward normals for the device boundary pass, zero on nodes
    /// that are not open boundaries.
    fn normals_grid(&self) -> Vec<i32> {
        let mut grid = vec![0i32; self.fields.num_nodes() * 2];
        for policy in [&self.zou_he_inlet, &self.zou_he_outlet] {
            for (point, normal) in policy.nodes().iter().zip(policy.normals()) {
                let n = self.fields.node_index(point.coords[0], point.coords[1]);
                grid[n * 2] = normal[0];
                grid[n * 2 + 1] = normal[1];
            }
        }
        grid
    }

    fn step_device(&mut self) -> Result<()> {
        let time = self.step as Float;
        let nx = self.fields.dims[0];
        let targets: Vec<VelocityTarget> = self
            .initializer
            .targets(time, nx)?
            .into_iter()
            .map(|(index, velocity)| VelocityTarget {
                index: index as u32,
                _pad: 0,
                velocity,
            })
            .collect();

        let gpu = self
            .gpu
            .as_ref()
            .ok_or_else(|| EngineError::AcceleratorUnavailable("context not built".into()))?;
        gpu.step(&targets);
        self.step += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ConstructionInfo, NonFluidNodeType};
    use crate::lattice::BoundaryPoint;

    fn cavity_geometry(size: usize) -> Geometry {
        let mut info = ConstructionInfo::new();
        info.attach_domain_dimensions([size, size]);
        info.add_perimeter_nodes(NonFluidNodeType::Boundary);
        info.add_nodes_interval([1, 0], [size - 2, 0], NonFluidNodeType::Inlet);
        Geometry::build(&info).unwrap()
    }

    fn lid_functions(speed: Float) -> [UpdateFn; 2] {
        [
            Box::new(move |_t: Float, _p: BoundaryPoint| speed),
            Box::new(|_, _| 0.0),
        ]
    }

    fn cavity_lattice(mode: ExecutionMode) -> Lattice {
        let mut lattice = Lattice::new(cavity_geometry(16), mode, Some(2), 1.0).unwrap();
        lattice.initialize_collision(CollisionOperator::initialize_bgk(0.8).unwrap());
        lattice.attach_update_functions(lid_functions(0.05), lid_functions(0.0));
        lattice
    }

    #[test]
    fn uninitialized_collision_fails_fast() {
        let mut lattice = Lattice::new(cavity_geometry(8), ExecutionMode::Sequential, None, 1.0)
            .unwrap();
        let err = lattice.perform_lbm(1, 0, 0).unwrap_err();
        assert!(matches!(err, EngineError::CollisionNotInitialized));
    }

    fn obstacle_geometry() -> Geometry {
        let mut info = ConstructionInfo::new();
        info.attach_domain_dimensions([16, 16]);
        info.add_perimeter_nodes(NonFluidNodeType::Boundary);
        info.add_obstacle_hyper_sphere([8, 8], 2.0);
        Geometry::build(&info).unwrap()
    }

    #[test]
    fn obstacles_require_psbb_setup() {
        let mut lattice =
            Lattice::new(obstacle_geometry(), ExecutionMode::Sequential, None, 1.0).unwrap();
        lattice.initialize_collision(CollisionOperator::initialize_bgk(0.8).unwrap());
        let err = lattice.perform_lbm(1, 0, 0).unwrap_err();
        assert!(matches!(err, EngineError::PsBounceBackNotInitialized));
    }

    #[test]
    fn obstacles_require_weight_computation() {
        let mut lattice =
            Lattice::new(obstacle_geometry(), ExecutionMode::Sequential, None, 1.0).unwrap();
        lattice.initialize_collision(CollisionOperator::initialize_bgk(0.8).unwrap());
        let mut psbb = crate::boundary::PsBounceBack::initialize(0.8, 0.01);
        psbb.allowed_tau(0.52, 10.0).unwrap();
        lattice.attach_psbb(psbb);

        // Weights never computed: the run must refuse rather than stream
        // through the obstacle
        let err = lattice.perform_lbm(1, 0, 0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConstruction(_)));

        lattice.compute_obstacle_weight();
        lattice.perform_lbm(1, 0, 0).unwrap();
    }

    #[test]
    fn from_config_computes_obstacle_weights() {
        let config: Config = serde_json::from_str(
            r#"{
                "domain": {
                    "nx": 16,
                    "ny": 16,
                    "obstacles": [{ "center": [8, 8], "radius": 2.0 }]
                },
                "physics": {
                    "density": 1.0,
                    "inlet_velocity": 0.0,
                    "collision": { "model": "bgk", "tau": 0.8 }
                },
                "simulation": { "steps": 2 },
                "output": { "output_directory": "out/weights_test" }
            }"#,
        )
        .unwrap();

        let mut lattice = Lattice::from_config(&config).unwrap();
        let n = lattice.fields().node_index(8, 8);
        assert!(lattice.fields().obstacle_weight[n] > 0.0);
        lattice.perform_lbm(2, 0, 0).unwrap();
        let _ = std::fs::remove_dir_all("out/weights_test");
    }

    #[test]
    fn cavity_run_conserves_mass() {
        let mut lattice = cavity_lattice(ExecutionMode::Sequential);
        let initial_mass: Float = lattice.fields().f.iter().sum();

        lattice.perform_lbm(50, 0, 0).unwrap();

        let final_mass: Float = lattice.fields().f.iter().sum();
        // Open boundaries exchange a little mass; the cavity stays bounded
        assert!((final_mass - initial_mass).abs() / initial_mass < 0.05);
        assert!(lattice.fields().density.iter().all(|rho| rho.is_finite()));
    }

    #[test]
    fn cavity_develops_lid_driven_flow() {
        let mut lattice = cavity_lattice(ExecutionMode::Sequential);
        lattice.perform_lbm(200, 0, 0).unwrap();

        // Fluid right under the lid moves with it
        let u = lattice.fields().velocity_at(8, 1);
        assert!(u[0] > 0.0, "expected positive x velocity near lid, got {u:?}");
    }

    #[test]
    fn host_execution_modes_agree() {
        let mut reference = cavity_lattice(ExecutionMode::Sequential);
        reference.perform_lbm(20, 0, 0).unwrap();

        for mode in [ExecutionMode::ThreadPool, ExecutionMode::ParallelFor] {
            let mut other = cavity_lattice(mode);
            other.perform_lbm(20, 0, 0).unwrap();
            for (a, b) in reference
                .fields()
                .density
                .iter()
                .zip(&other.fields().density)
            {
                assert!((a - b).abs() < 1e-5, "{mode:?} diverged from sequential");
            }
        }
    }

    #[test]
    fn structure_printout_includes_registered_nodes() {
        let lattice = cavity_lattice(ExecutionMode::Sequential);
        let mut out = Vec::new();
        lattice.print_lattice_structure(&mut out, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Inlet nodes:"));
        assert!(text.contains("inlet: 14"));
    }
}
