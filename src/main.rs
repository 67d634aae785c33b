use lbm_engine::{BoundaryPoint, Config, Float, Lattice, UpdateFn};
use anyhow::Result;
use log::info;
use std::env;
use std::fs::File;
use std::io::BufWriter;

/// Smoothed start-up ramp toward `peak`: u(t) = peak * (1 - exp(-t / ramp_time)).
/// Jumping straight to the target velocity shocks the initial equilibrium
/// state; the ramp keeps early timesteps stable.
fn ramp(peak: Float, ramp_time: Float) -> UpdateFn {
    Box::new(move |t: Float, _: BoundaryPoint| peak * (1.0 - (-t / ramp_time).exp()))
}

fn zero() -> UpdateFn {
    Box::new(|_, _| 0.0)
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <config.json>", args[0]);
        eprintln!("  config.json - JSON file describing the domain, physics and run");
        std::process::exit(1);
    }
    let config_path = &args[1];

    info!("Loading configuration from: {}", config_path);
    let config = Config::from_file(config_path)?;

    info!("Simulation parameters:");
    info!("  Domain: {}x{}", config.domain.nx, config.domain.ny);
    info!("  Inlet velocity: {}", config.physics.inlet_velocity);
    info!("  Kinematic viscosity: {}", config.viscosity());
    info!("  Steps: {}", config.simulation.steps);
    info!("  Execution: {:?}", config.simulation.execution);

    info!("Initializing lattice...");
    let mut lattice = Lattice::from_config(&config)?;
    lattice.attach_update_functions(
        [
            ramp(config.physics.inlet_velocity, config.physics.ramp_time),
            zero(),
        ],
        [zero(), zero()],
    );

    let structure_filename = format!(
        "{}/lattice_structure.txt",
        config.output.output_directory
    );
    let mut structure_file = BufWriter::new(File::create(&structure_filename)?);
    lattice.print_lattice_structure(&mut structure_file, true)?;
    info!("Wrote lattice structure: {}", structure_filename);

    info!("Starting simulation...");
    lattice.perform_lbm(
        config.simulation.steps,
        config.simulation.output_interval,
        config.simulation.checkpoint_interval,
    )?;

    info!("Simulation completed successfully");
    info!("Output files written to: {}", config.output.output_directory);
    info!("To visualize, load the output_*.vtk files in ParaView and use the");
    info!("'Velocity' vector field for streamlines or 'VelocityMagnitude' for contours");

    Ok(())
}
