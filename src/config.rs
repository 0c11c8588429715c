use anyhow::ensure;

use crate::rendering::{ALIVE_COLOR, BACKGROUND_COLOR};
use crate::sim::{FillPolicy, Grid, GridState};
use crate::util::Color;

/// Everything needed to start a run. Fixed once the run starts; a different
/// grid size means building a new simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct LifeConfig {
    pub width: usize,
    pub height: usize,
    pub fill: FillPolicy,
    /// Generations per second. `None` advances once per displayed frame.
    pub tick_rate: Option<f32>,
    pub alive_color: Color,
    pub background_color: Color,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            fill: FillPolicy::default(),
            tick_rate: Some(5.0),
            alive_color: ALIVE_COLOR,
            background_color: BACKGROUND_COLOR,
        }
    }
}

impl LifeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        Grid::new(self.width, self.height)?;
        self.fill.validate()?;
        if let Some(rate) = self.tick_rate {
            ensure!(
                rate.is_finite() && rate > 0.0,
                "tick rate must be a positive number of generations per second, got {rate}"
            );
        }
        Ok(())
    }

    pub fn grid(&self) -> anyhow::Result<Grid> {
        Grid::new(self.width, self.height)
    }

    pub fn initial_state(&self) -> anyhow::Result<GridState> {
        self.validate()?;
        GridState::new(self.grid()?, &self.fill)
    }
}
