use anyhow::{bail, ensure};

use super::patterns::Pattern;
use super::sequencer::{BufferId, Roles};

/// Grid dimensions, fixed for the lifetime of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> anyhow::Result<Grid> {
        ensure!(
            width > 0 && height > 0,
            "grid dimensions must be positive, got {width}x{height}"
        );
        Ok(Grid { width, height })
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// Row-major index with toroidal wrap on both axes.
    #[inline(always)]
    pub fn index(&self, x: isize, y: isize) -> usize {
        let x = x.rem_euclid(self.width as isize) as usize;
        let y = y.rem_euclid(self.height as isize) as usize;
        y * self.width + x
    }

    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }
}

/// One generation: a fixed-length row-major sequence of alive/dead cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellStateBuffer {
    grid: Grid,
    cells: Vec<bool>,
}

impl CellStateBuffer {
    pub fn dead(grid: Grid) -> Self {
        Self {
            grid,
            cells: vec![false; grid.cell_count()],
        }
    }

    pub fn from_cells(grid: Grid, cells: Vec<bool>) -> anyhow::Result<Self> {
        ensure!(
            cells.len() == grid.cell_count(),
            "buffer holds {} cells but a {}x{} grid needs {}",
            cells.len(),
            grid.width,
            grid.height,
            grid.cell_count()
        );
        Ok(Self { grid, cells })
    }

    /// Decode GPU words, where any non-zero word is alive.
    pub fn from_words(grid: Grid, words: &[u32]) -> anyhow::Result<Self> {
        Self::from_cells(grid, words.iter().map(|&w| w != 0).collect())
    }

    pub fn to_words(&self) -> Vec<u32> {
        self.cells.iter().map(|&alive| alive as u32).collect()
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn read(&self, x: isize, y: isize) -> bool {
        self.cells[self.grid.index(x, y)]
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [bool] {
        &mut self.cells
    }

    pub fn population(&self) -> usize {
        self.cells.iter().filter(|&&alive| alive).count()
    }

    pub fn alive_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(i, _)| self.grid.coords(i))
    }
}

/// How the first generation is populated.
#[derive(Clone, Debug, PartialEq)]
pub enum FillPolicy {
    Empty,
    /// Every other cell alive.
    Alternating,
    /// Each cell alive with probability `density`.
    Random { density: f32, seed: Option<u64> },
    Cells(Vec<(usize, usize)>),
    Pattern {
        pattern: Pattern,
        origin: (usize, usize),
    },
}

impl Default for FillPolicy {
    fn default() -> Self {
        FillPolicy::Random {
            density: 0.4,
            seed: None,
        }
    }
}

impl FillPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let FillPolicy::Random { density, .. } = self
            && !(0.0..=1.0).contains(density)
        {
            bail!("density must be between 0 and 1, got {density}");
        }
        Ok(())
    }

    pub fn fill(&self, grid: Grid) -> anyhow::Result<CellStateBuffer> {
        self.validate()?;
        let mut buffer = CellStateBuffer::dead(grid);
        let stamp = |buffer: &mut CellStateBuffer, x: usize, y: usize| {
            let i = grid.index(x as isize, y as isize);
            buffer.cells[i] = true;
        };
        match self {
            FillPolicy::Empty => {}
            FillPolicy::Alternating => {
                for (i, cell) in buffer.cells.iter_mut().enumerate() {
                    *cell = i % 2 == 0;
                }
            }
            FillPolicy::Random { density, seed } => {
                let mut rng = match seed {
                    Some(seed) => fastrand::Rng::with_seed(*seed),
                    None => fastrand::Rng::new(),
                };
                for cell in buffer.cells.iter_mut() {
                    *cell = rng.f32() < *density;
                }
            }
            FillPolicy::Cells(cells) => {
                for &(x, y) in cells {
                    stamp(&mut buffer, x, y);
                }
            }
            FillPolicy::Pattern { pattern, origin } => {
                for &(x, y) in pattern.cells {
                    stamp(&mut buffer, origin.0 + x, origin.1 + y);
                }
            }
        }
        Ok(buffer)
    }
}

/// The two cell-state buffers of a run. Mutation only happens through
/// [`GridState::split`], which hands out one shared and one exclusive
/// reference for a role pair.
#[derive(Clone, Debug)]
pub struct GridState {
    grid: Grid,
    buffers: [CellStateBuffer; 2],
}

impl GridState {
    /// Generation zero goes into A; B starts dead and is fully overwritten
    /// by the first dispatch.
    pub fn new(grid: Grid, fill: &FillPolicy) -> anyhow::Result<Self> {
        let initial = fill.fill(grid)?;
        Ok(Self {
            grid,
            buffers: [initial, CellStateBuffer::dead(grid)],
        })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn buffer(&self, id: BufferId) -> &CellStateBuffer {
        &self.buffers[id.index()]
    }

    pub fn split(&mut self, roles: Roles) -> (&CellStateBuffer, &mut CellStateBuffer) {
        let [a, b] = &mut self.buffers;
        match (roles.read, roles.write) {
            (BufferId::A, BufferId::B) => (a, b),
            (BufferId::B, BufferId::A) => (b, a),
            _ => unreachable!("a buffer cannot be both source and destination"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(Grid::new(0, 4).is_err());
        assert!(Grid::new(4, 0).is_err());
        assert_eq!(Grid::new(3, 5).unwrap().cell_count(), 15);
    }

    #[test]
    fn index_wraps_toroidally() {
        let grid = Grid::new(4, 3).unwrap();
        assert_eq!(grid.index(0, 0), 0);
        assert_eq!(grid.index(3, 2), 11);
        assert_eq!(grid.index(-1, 0), 3);
        assert_eq!(grid.index(0, -1), 8);
        assert_eq!(grid.index(-1, -1), 11);
        assert_eq!(grid.index(4, 3), 0);
        assert_eq!(grid.coords(7), (3, 1));
    }

    #[test]
    fn read_uses_wrapped_coordinates() {
        let grid = Grid::new(5, 5).unwrap();
        let buf = FillPolicy::Cells(vec![(4, 4)]).fill(grid).unwrap();
        assert!(buf.read(4, 4));
        assert!(buf.read(-1, -1));
        assert!(!buf.read(0, 0));
    }

    #[test]
    fn alternating_fill() {
        let grid = Grid::new(4, 2).unwrap();
        let buf = FillPolicy::Alternating.fill(grid).unwrap();
        assert_eq!(buf.population(), 4);
        assert!(buf.read(0, 0));
        assert!(!buf.read(1, 0));
    }

    #[test]
    fn seeded_random_fill_is_reproducible() {
        let grid = Grid::new(16, 16).unwrap();
        let policy = FillPolicy::Random {
            density: 0.4,
            seed: Some(7),
        };
        assert_eq!(policy.fill(grid).unwrap(), policy.fill(grid).unwrap());
    }

    #[test]
    fn random_fill_density_extremes() {
        let grid = Grid::new(8, 8).unwrap();
        let full = FillPolicy::Random {
            density: 1.0,
            seed: Some(1),
        };
        let none = FillPolicy::Random {
            density: 0.0,
            seed: Some(1),
        };
        assert_eq!(full.fill(grid).unwrap().population(), 64);
        assert_eq!(none.fill(grid).unwrap().population(), 0);
    }

    #[test]
    fn rejects_density_out_of_range() {
        let grid = Grid::new(2, 2).unwrap();
        let policy = FillPolicy::Random {
            density: 1.5,
            seed: None,
        };
        assert!(policy.fill(grid).is_err());
    }

    #[test]
    fn pattern_is_stamped_at_origin_with_wrap() {
        let grid = Grid::new(4, 4).unwrap();
        let policy = FillPolicy::Pattern {
            pattern: Pattern::by_name("block").unwrap(),
            origin: (3, 3),
        };
        let buf = policy.fill(grid).unwrap();
        let mut alive: Vec<_> = buf.alive_cells().collect();
        alive.sort();
        assert_eq!(alive, vec![(0, 0), (0, 3), (3, 0), (3, 3)]);
    }

    #[test]
    fn word_conversion_preserves_cells() {
        let grid = Grid::new(3, 1).unwrap();
        let buf = CellStateBuffer::from_words(grid, &[0, 7, 1]).unwrap();
        assert_eq!(buf.cells(), &[false, true, true]);
        assert_eq!(buf.to_words(), vec![0, 1, 1]);
        assert!(CellStateBuffer::from_words(grid, &[0, 1]).is_err());
    }

    #[test]
    fn split_follows_roles() {
        let grid = Grid::new(2, 2).unwrap();
        let mut state = GridState::new(grid, &FillPolicy::Cells(vec![(0, 0)])).unwrap();
        let (read, write) = state.split(Roles::for_step(0));
        assert_eq!(read.population(), 1);
        write.cells_mut()[3] = true;
        assert!(state.buffer(BufferId::B).read(1, 1));

        let (read, _) = state.split(Roles::for_step(1));
        assert!(read.read(1, 1));
    }
}

