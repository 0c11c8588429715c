use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use wasm_thread as thread;

use arc_swap::ArcSwap;

pub mod clock;
pub mod driver;
pub mod gpucompute;
pub mod grid;
pub mod patterns;
pub mod rule;
pub mod sequencer;

pub use driver::{ComputeStage, FrameDriver, FramePhase, RenderStage};
pub use grid::{CellStateBuffer, FillPolicy, Grid, GridState};
pub use patterns::Pattern;
pub use rule::CpuCompute;
pub use sequencer::{BufferId, Roles, StepSequencer};

#[non_exhaustive]
#[derive(Default, Debug)]
pub struct SimulationStatistics {
    pub average_step_exec_time: Duration,
    pub segments: Vec<(&'static str, Duration)>,
    pub generations: u64,
}

/// A CPU simulation running on its own thread.
pub struct Simulation {
    stop: Arc<AtomicBool>,
    latest: Arc<ArcSwap<CellStateBuffer>>,
    join_handle: thread::JoinHandle<SimulationStatistics>,
}

/// Render stage that hands each finished generation to readers on other
/// threads.
struct Publish {
    latest: Arc<ArcSwap<CellStateBuffer>>,
}

impl RenderStage<CellStateBuffer> for Publish {
    type Error = std::convert::Infallible;

    fn render(&mut self, _id: BufferId, generation: &CellStateBuffer) -> Result<(), Self::Error> {
        self.latest.store(Arc::new(generation.clone()));
        Ok(())
    }
}

impl Simulation {
    /// Spawn a simulation thread. `tick_rate` of `None` runs as fast as
    /// possible.
    pub fn spawn(state: GridState, tick_rate: Option<f32>) -> Simulation {
        let stop = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(ArcSwap::from_pointee(
            state.buffer(BufferId::A).clone(),
        ));
        let driver = FrameDriver::new(
            CpuCompute::new(state),
            Publish {
                latest: Arc::clone(&latest),
            },
        );
        let s = Arc::clone(&stop);
        let join_handle = thread::spawn(move || sim_thread(driver, s, tick_rate));
        Simulation {
            stop,
            latest,
            join_handle,
        }
    }

    /// The most recent completed generation.
    pub fn latest_generation(&self) -> Arc<CellStateBuffer> {
        self.latest.load_full()
    }

    pub fn stop(self) -> SimulationStatistics {
        self.stop.store(true, Ordering::Relaxed);
        self.join_handle.join().expect("failed to join thread")
    }
}

macro_rules! segment_bench_while {
    (while ($cond:expr) { $({$name:literal : $($contents:stmt)*}),+ $(,)? }) => {{
        let mut segments = vec![$(($name, std::time::Duration::new(0, 0))),+];
        let mut cur_segments = Vec::with_capacity(segments.len());
        let mut iter_count: u32 = 0;

        while $cond {
            cur_segments.clear();

            $(
                let segment_start = std::time::Instant::now();
                $($contents)*
                cur_segments.push(segment_start.elapsed());
            )+

            for (idx, item) in cur_segments.iter().enumerate() {
                segments[idx].1 += *item;
            }
            iter_count += 1;
        }

        if iter_count > 0 {
            for s in segments.iter_mut() {
                s.1 /= iter_count;
            }
        }
        segments
    }}
}

fn sim_thread(
    mut driver: FrameDriver<CpuCompute, Publish>,
    stop: Arc<AtomicBool>,
    tick_rate: Option<f32>,
) -> SimulationStatistics {
    let period = tick_rate.filter(|r| *r > 0.0).map(f32::recip);
    let mut end_of_last_step = Instant::now();
    let mut total_time = Duration::new(0, 0);
    #[allow(redundant_semicolons)]
    let segments = segment_bench_while!(
    while (!stop.load(Ordering::Relaxed)) {
        {
            "step":
            let Ok(()) = driver.step();
        },
        {
            "pace":
            total_time += end_of_last_step.elapsed();
            if let Some(period) = period {
                let to_wait = period - end_of_last_step.elapsed().as_secs_f32();
                if to_wait > 0.0 {
                    thread::sleep(Duration::from_secs_f32(to_wait));
                }
            }
            end_of_last_step = Instant::now();
        }
    }
    );
    let generations = driver.step_count();
    log::debug!("simulation thread stopped after {generations} generations");
    SimulationStatistics {
        average_step_exec_time: if generations > 0 {
            total_time / generations as u32
        } else {
            Duration::ZERO
        },
        segments,
        generations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_runner_publishes_generations() {
        let grid = Grid::new(5, 5).unwrap();
        let blinker = FillPolicy::Pattern {
            pattern: Pattern::by_name("blinker").unwrap(),
            origin: (1, 1),
        };
        let state = GridState::new(grid, &blinker).unwrap();
        let initial = state.buffer(BufferId::A).clone();

        let sim = Simulation::spawn(state, None);
        assert_eq!(sim.latest_generation().population(), 3);
        std::thread::sleep(Duration::from_millis(20));
        let latest = sim.latest_generation();
        let stats = sim.stop();

        assert!(stats.generations > 0);
        assert_eq!(latest.population(), 3);
        assert_eq!(stats.segments.len(), 2);
        // the blinker alternates, so every published generation is one of two
        let mut other = CellStateBuffer::dead(grid);
        rule::transition(&initial, &mut other);
        assert!(*latest == initial || *latest == other);
    }
}
