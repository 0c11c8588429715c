use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};

use super::driver::ComputeStage;
use super::grid::{CellStateBuffer, GridState};
use super::sequencer::{BufferId, Roles};

// Small lookup table; will be fully inlined and optimized away.
const MOORE: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[inline(always)]
pub fn live_neighbors(source: &CellStateBuffer, x: isize, y: isize) -> u8 {
    MOORE
        .iter()
        .filter(|(dx, dy)| source.read(x + dx, y + dy))
        .count() as u8
}

#[inline(always)]
pub fn next_state(alive: bool, neighbors: u8) -> bool {
    match neighbors {
        2 => alive,
        3 => true,
        _ => false,
    }
}

/// Compute one generation from `source` into `dest`. Every cell of `dest`
/// is overwritten; nothing in it is read.
pub fn transition(source: &CellStateBuffer, dest: &mut CellStateBuffer) {
    let grid = source.grid();
    debug_assert_eq!(grid, dest.grid());
    dest.cells_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, cell)| {
            let (x, y) = grid.coords(i);
            let (x, y) = (x as isize, y as isize);
            *cell = next_state(source.read(x, y), live_neighbors(source, x, y));
        });
}

/// CPU compute stage: owns both generations and evaluates the rule with rayon.
pub struct CpuCompute {
    state: GridState,
}

impl CpuCompute {
    pub fn new(state: GridState) -> Self {
        Self { state }
    }
}

impl ComputeStage for CpuCompute {
    type Buffer = CellStateBuffer;

    fn compute(&mut self, roles: Roles) {
        let (source, dest) = self.state.split(roles);
        transition(source, dest);
    }

    fn buffer(&self, id: BufferId) -> &CellStateBuffer {
        self.state.buffer(id)
    }
}
