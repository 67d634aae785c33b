use std::fs::File;
use std::io::{BufWriter, Result, Write};
use crate::lattice::{D2Q9, Fields, NodeType};

/// Writes macroscopic snapshots and distribution checkpoints.
///
/// Both formats are diagnostic text: VTK legacy ASCII for the snapshots (one
/// z-slice, so 2-D fields load directly into ParaView) and a plain dump for
/// the checkpoints. Neither carries a byte-exact contract.
pub struct SnapshotWriter {
    output_directory: String,
}

impl SnapshotWriter {
    pub fn new(output_directory: &str) -> Self {
        Self {
            output_directory: output_directory.to_string(),
        }
    }

    pub fn write_snapshot(&self, fields: &Fields, step: usize) -> Result<String> {
        let [nx, ny] = fields.dims;
        let filename = format!("{}/output_{:06}.vtk", self.output_directory, step);
        let mut file = BufWriter::new(File::create(&filename)?);

        writeln!(file, "# vtk DataFile Version 3.0")?;
        writeln!(file, "LBM Solution - Step {}", step)?;
        writeln!(file, "ASCII")?;
        writeln!(file, "DATASET STRUCTURED_POINTS")?;
        writeln!(file, "DIMENSIONS {} {} 1", nx, ny)?;
        writeln!(file, "ORIGIN 0 0 0")?;
        writeln!(file, "SPACING 1 1 1")?;

        writeln!(file, "POINT_DATA {}", nx * ny)?;

        writeln!(file, "SCALARS Density float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for rho in &fields.density {
            writeln!(file, "{:.6}", rho)?;
        }

        writeln!(file, "VECTORS Velocity float")?;
        for n in 0..fields.num_nodes() {
            writeln!(
                file,
                "{:.6} {:.6} 0.000000",
                fields.velocity[n * 2],
                fields.velocity[n * 2 + 1]
            )?;
        }

        writeln!(file, "SCALARS VelocityMagnitude float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for n in 0..fields.num_nodes() {
            let ux = fields.velocity[n * 2];
            let uy = fields.velocity[n * 2 + 1];
            writeln!(file, "{:.6}", (ux * ux + uy * uy).sqrt())?;
        }

        writeln!(file, "SCALARS NodeType float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for t in &fields.node_type {
            writeln!(file, "{:.1}", *t as u32 as f32)?;
        }

        Ok(filename)
    }

    /// Full distribution-tensor dump, one node per line.
    pub fn write_checkpoint(&self, fields: &Fields, step: usize) -> Result<String> {
        let [nx, ny] = fields.dims;
        let filename = format!("{}/checkpoint_{:06}.txt", self.output_directory, step);
        let mut file = BufWriter::new(File::create(&filename)?);

        writeln!(file, "step {}", step)?;
        writeln!(file, "dimensions {} {}", nx, ny)?;
        for n in 0..fields.num_nodes() {
            write!(file, "{} {}", n % nx, n / nx)?;
            for i in 0..D2Q9::Q {
                write!(file, " {:.8}", fields.f[n * D2Q9::Q + i])?;
            }
            writeln!(file)?;
        }
        Ok(filename)
    }
}

/// Text map of the classification grid, plus per-class counts; `verbose` adds
/// the coordinate lists. Purely observational.
pub fn print_lattice_structure(
    fields: &Fields,
    writer: &mut impl Write,
    verbose: bool,
) -> std::io::Result<()> {
    let [nx, ny] = fields.dims;
    writeln!(writer, "Lattice {}x{}", nx, ny)?;

    let mut counts = [0usize; 5];
    for t in &fields.node_type {
        counts[*t as u32 as usize] += 1;
    }
    writeln!(
        writer,
        "fluid: {}  boundary: {}  obstacle: {}  inlet: {}  outlet: {}",
        counts[0], counts[1], counts[2], counts[3], counts[4]
    )?;

    // y grows downward in the printout
    for y in 0..ny {
        for x in 0..nx {
            let c = match fields.node_type[x + y * nx] {
                NodeType::Fluid => '.',
                NodeType::Boundary => '#',
                NodeType::Obstacle => 'o',
                NodeType::Inlet => 'I',
                NodeType::Outlet => 'O',
            };
            write!(writer, "{}", c)?;
        }
        writeln!(writer)?;
    }

    if verbose {
        for (label, wanted) in [
            ("boundary", NodeType::Boundary),
            ("obstacle", NodeType::Obstacle),
            ("inlet", NodeType::Inlet),
            ("outlet", NodeType::Outlet),
        ] {
            writeln!(writer, "{} nodes:", label)?;
            for (n, t) in fields.node_type.iter().enumerate() {
                if *t == wanted {
                    writeln!(writer, "  ({}, {})", n % nx, n / nx)?;
                }
            }
        }
    }
    Ok(())
}
