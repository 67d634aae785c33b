use crate::Float;

/// D2Q9 Lattice-Boltzmann model constants
pub struct D2Q9;

impl D2Q9 {
    /// Number of discrete velocities
    pub const Q: usize = 9;

    /// Number of spatial dimensions
    pub const DIM: usize = 2;

    /// Index of the rest (zero-velocity) direction
    pub const REST: usize = 0;

    /// Discrete velocities (9 directions in 2D)
    pub const VELOCITIES: [[i32; 2]; 9] = [
        // Center
        [0, 0],
        // Axis neighbors (4)
        [1, 0], [0, 1], [-1, 0], [0, -1],
        // Diagonal neighbors (4)
        [1, 1], [-1, 1], [-1, -1], [1, -1],
    ];

    /// Weights for each direction
    pub const WEIGHTS: [Float; 9] = [
        // Center
        4.0 / 9.0,
        // Axis neighbors (4)
        1.0 / 9.0, 1.0 / 9.0, 1.0 / 9.0, 1.0 / 9.0,
        // Diagonal neighbors (4)
        1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0,
    ];

    /// Opposite directions for bounce-back boundary conditions
    pub const OPPOSITE: [usize; 9] = [0, 3, 4, 1, 2, 7, 8, 5, 6];

    /// Speed of sound squared
    pub const CS2: Float = 1.0 / 3.0;
}

/// Calculate the second-order equilibrium distribution for one direction.
///
/// Shared by collision, Zou–He reconstruction and the field initializer, so
/// it must stay a plain expression over its inputs (no cached or
/// platform-dependent state).
pub fn equilibrium(direction: usize, density: Float, velocity: [Float; 2]) -> Float {
    let weight = D2Q9::WEIGHTS[direction];
    let c = D2Q9::VELOCITIES[direction];

    let cu = c[0] as Float * velocity[0] + c[1] as Float * velocity[1];
    let u2 = velocity[0] * velocity[0] + velocity[1] * velocity[1];

    weight
        * density
        * (1.0 + cu / D2Q9::CS2 + cu * cu / (2.0 * D2Q9::CS2 * D2Q9::CS2)
            - u2 / (2.0 * D2Q9::CS2))
}

/// Per-node classification, fixed at geometry construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NodeType {
    Fluid = 0,
    /// Static solid wall, full bounce-back
    Boundary = 1,
    /// Solid with fractional occupation, partially-saturated bounce-back
    Obstacle = 2,
    Inlet = 3,
    Outlet = 4,
}

/// Integer coordinates of one inlet/outlet lattice node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundaryPoint {
    pub coords: [usize; 2],
}

impl BoundaryPoint {
    pub fn new(x: usize, y: usize) -> Self {
        Self { coords: [x, y] }
    }
}

/// Field tensors of the full lattice.
///
/// All tensors are flat, node-major: everything belonging to one node is
/// contiguous, so per-node chunks of `f` and `velocity` are disjoint slices.
/// The parallel execution strategies depend on that layout.
pub struct Fields {
    /// Per-axis extents, set once at construction
    pub dims: [usize; 2],
    /// Distribution functions, `[node][direction]`, length nx*ny*9
    pub f: Vec<Float>,
    /// Macroscopic density, length nx*ny
    pub density: Vec<Float>,
    /// Macroscopic velocity, `[node][component]`, length nx*ny*2
    pub velocity: Vec<Float>,
    /// Node classification, length nx*ny
    pub node_type: Vec<NodeType>,
    /// Solid-occupation fraction in [0, 1], nonzero only on obstacle nodes
    pub obstacle_weight: Vec<Float>,
}

impl Fields {
    pub fn new(dims: [usize; 2]) -> Self {
        let nodes = dims[0] * dims[1];
        Self {
            dims,
            f: vec![0.0; nodes * D2Q9::Q],
            density: vec![1.0; nodes],
            velocity: vec![0.0; nodes * D2Q9::DIM],
            node_type: vec![NodeType::Fluid; nodes],
            obstacle_weight: vec![0.0; nodes],
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.dims[0] * self.dims[1]
    }

    /// Flat node index for a coordinate pair
    #[inline]
    pub fn node_index(&self, x: usize, y: usize) -> usize {
        x + y * self.dims[0]
    }

    #[inline]
    pub fn f_at(&self, x: usize, y: usize, direction: usize) -> Float {
        self.f[self.node_index(x, y) * D2Q9::Q + direction]
    }

    #[inline]
    pub fn set_f(&mut self, x: usize, y: usize, direction: usize, value: Float) {
        let idx = self.node_index(x, y) * D2Q9::Q + direction;
        self.f[idx] = value;
    }

    #[inline]
    pub fn density_at(&self, x: usize, y: usize) -> Float {
        self.density[self.node_index(x, y)]
    }

    #[inline]
    pub fn velocity_at(&self, x: usize, y: usize) -> [Float; 2] {
        let n = self.node_index(x, y);
        [self.velocity[n * 2], self.velocity[n * 2 + 1]]
    }

    /// Seed every node with the equilibrium distribution for its current
    /// density and velocity.
    pub fn init_equilibrium(&mut self) {
        for n in 0..self.num_nodes() {
            let rho = self.density[n];
            let u = [self.velocity[n * 2], self.velocity[n * 2 + 1]];
            for i in 0..D2Q9::Q {
                self.f[n * D2Q9::Q + i] = equilibrium(i, rho, u);
            }
        }
    }

    /// Recompute density and velocity at one node from its distributions.
    /// Returns (density, velocity).
    #[inline]
    pub fn moments(f: &[Float]) -> (Float, [Float; 2]) {
        let mut rho = 0.0;
        let mut u = [0.0, 0.0];
        for i in 0..D2Q9::Q {
            let c = D2Q9::VELOCITIES[i];
            rho += f[i];
            u[0] += f[i] * c[0] as Float;
            u[1] += f[i] * c[1] as Float;
        }
        if rho > 1e-10 {
            u[0] /= rho;
            u[1] /= rho;
        }
        (rho, u)
    }
}
