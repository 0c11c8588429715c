use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use lifesim::{
    config::LifeConfig,
    rendering::{self, Discard},
    sim::{
        FillPolicy, FrameDriver, Pattern, Simulation, gpucompute::HeadlessGpu, patterns,
        rule::CpuCompute,
    },
    util::Color,
};

#[derive(Parser, Debug)]
#[command(name = "lifesim", version, about = "Double-buffered Game of Life on the GPU")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a window and run the simulation on the GPU.
    Window {
        /// Generations per second; 0 steps once per frame.
        #[arg(long, default_value_t = 5.0)]
        tick_rate: f32,
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Run a fixed number of generations without a window.
    Run {
        #[arg(long, default_value_t = 100)]
        steps: u64,
        #[arg(long, value_enum, default_value_t = Backend::Cpu)]
        backend: Backend,
        /// Print the final generation.
        #[arg(long)]
        print: bool,
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Run the CPU simulation uncapped on a background thread and report timing.
    Bench {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        #[command(flatten)]
        grid: GridArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Cpu,
    Gpu,
}

#[derive(Args, Debug)]
struct GridArgs {
    #[arg(long, default_value_t = 32)]
    width: usize,
    #[arg(long, default_value_t = 32)]
    height: usize,
    /// Probability that a cell starts alive.
    #[arg(long, default_value_t = 0.4)]
    density: f32,
    /// Seed for a reproducible random fill.
    #[arg(long)]
    seed: Option<u64>,
    /// Start from a named pattern (glider, blinker, block, toad, beacon, r-pentomino).
    #[arg(long, conflicts_with = "pattern_file")]
    pattern: Option<String>,
    /// Start from a plaintext `.`/`#` pattern file.
    #[arg(long)]
    pattern_file: Option<PathBuf>,
    #[arg(long, default_value = "#ff0000")]
    alive_color: Color,
    #[arg(long, default_value = "#000066")]
    background_color: Color,
    #[arg(long, default_value_t = log::LevelFilter::Info)]
    log_level: log::LevelFilter,
}

impl GridArgs {
    /// `tick_rate` of `None` leaves pacing to the caller.
    fn into_config(self, tick_rate: Option<f32>) -> anyhow::Result<LifeConfig> {
        let centered = |extent: (usize, usize)| {
            (
                self.width.saturating_sub(extent.0) / 2,
                self.height.saturating_sub(extent.1) / 2,
            )
        };
        let fill = match (&self.pattern, &self.pattern_file) {
            (Some(name), _) => {
                let Some(pattern) = Pattern::by_name(name) else {
                    let known: Vec<_> = patterns::PATTERNS.iter().map(|p| p.name).collect();
                    bail!("unknown pattern {name:?}, expected one of {}", known.join(", "));
                };
                FillPolicy::Pattern {
                    pattern,
                    origin: centered(pattern.extent()),
                }
            }
            (None, Some(path)) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read pattern file {}", path.display()))?;
                let cells = patterns::parse_rows(&text)
                    .with_context(|| format!("failed to parse pattern file {}", path.display()))?;
                let extent = cells.iter().fold((0, 0), |(w, h), &(x, y)| {
                    (w.max(x + 1), h.max(y + 1))
                });
                let (ox, oy) = centered(extent);
                FillPolicy::Cells(cells.into_iter().map(|(x, y)| (x + ox, y + oy)).collect())
            }
            (None, None) => FillPolicy::Random {
                density: self.density,
                seed: self.seed,
            },
        };
        let config = LifeConfig {
            width: self.width,
            height: self.height,
            fill,
            tick_rate,
            alive_color: self.alive_color,
            background_color: self.background_color,
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Window { tick_rate, grid } => {
            lifesim::init_logging(grid.log_level)?;
            lifesim::run_windowed(grid.into_config((tick_rate > 0.0).then_some(tick_rate))?)
        }
        Command::Run {
            steps,
            backend,
            print,
            grid,
        } => {
            lifesim::init_logging(grid.log_level)?;
            run_headless(grid.into_config(None)?, steps, backend, print)
        }
        Command::Bench { seconds, grid } => {
            lifesim::init_logging(grid.log_level)?;
            run_benchmark(grid.into_config(None)?, seconds)
        }
    }
}

fn run_headless(config: LifeConfig, steps: u64, backend: Backend, print: bool) -> anyhow::Result<()> {
    let state = config.initial_state()?;
    log::info!(
        "running {steps} generations on a {}x{} grid ({backend:?})",
        config.width,
        config.height
    );
    let last = match backend {
        Backend::Cpu => {
            let mut driver = FrameDriver::new(CpuCompute::new(state), Discard);
            for _ in 0..steps {
                let Ok(()) = driver.step();
                log::info!(
                    "generation {}: population {}",
                    driver.step_count(),
                    driver.latest().population()
                );
            }
            driver.latest().clone()
        }
        Backend::Gpu => {
            let mut gpu = pollster::block_on(HeadlessGpu::new(state))?;
            for _ in 0..steps {
                gpu.step()?;
                log::info!(
                    "generation {}: population {}",
                    gpu.step_count(),
                    gpu.latest().population()
                );
            }
            gpu.latest().clone()
        }
    };
    log::info!("final population after {steps} generations: {}", last.population());
    if print {
        print!("{}", rendering::ascii(&last));
    }
    Ok(())
}

fn run_benchmark(config: LifeConfig, seconds: u64) -> anyhow::Result<()> {
    let sim = Simulation::spawn(config.initial_state()?, None);

    for i in (1..=seconds).rev() {
        log::info!("{i}...");
        std::thread::sleep(Duration::from_secs(1));
    }

    let population = sim.latest_generation().population();
    let stats = sim.stop();
    println!(
        "{} generations, average step time {}μs, final population {population}",
        stats.generations,
        stats.average_step_exec_time.as_micros()
    );
    println!("\n\nSegments:\n");
    let longest_name = stats.segments.iter().map(|i| i.0.len()).max().unwrap_or(0);
    for (name, time) in stats.segments {
        println!("{name:<width$} {}μs", time.as_micros(), width = longest_name + 2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    /// Keeps every record at `Info` or above.
    struct Capture(Mutex<Vec<String>>);

    impl log::Log for Capture {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Info
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.0.lock().unwrap().push(record.args().to_string());
            }
        }
        fn flush(&self) {}
    }

    fn capture() -> &'static Capture {
        static CAPTURE: OnceLock<&'static Capture> = OnceLock::new();
        CAPTURE.get_or_init(|| {
            let capture: &'static Capture = Box::leak(Box::new(Capture(Mutex::new(Vec::new()))));
            log::set_logger(capture).unwrap();
            log::set_max_level(log::LevelFilter::Info);
            capture
        })
    }

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("lifesim").chain(args.iter().copied()))
    }

    #[test]
    fn run_reports_every_generation_at_info() {
        let capture = capture();
        let config = LifeConfig {
            width: 7,
            height: 5,
            fill: FillPolicy::Random {
                density: 0.4,
                seed: Some(99),
            },
            tick_rate: None,
            ..Default::default()
        };
        run_headless(config, 3, Backend::Cpu, false).unwrap();

        let lines = capture.0.lock().unwrap();
        for generation in 1..=3 {
            let prefix = format!("generation {generation}: population ");
            assert!(
                lines.iter().any(|l| l.starts_with(&prefix)),
                "missing {prefix:?}"
            );
        }
    }

    #[test]
    fn tick_rate_is_a_window_option() {
        assert!(parse(&["run", "--tick-rate", "3"]).is_err());
        assert!(parse(&["bench", "--tick-rate", "3"]).is_err());

        let Command::Window { tick_rate, grid } = parse(&["window", "--tick-rate", "12"]).unwrap().command
        else {
            panic!("expected the window command");
        };
        assert_eq!(tick_rate, 12.0);
        assert_eq!(grid.into_config(Some(tick_rate)).unwrap().tick_rate, Some(12.0));

        let Command::Run { grid, .. } = parse(&["run", "--steps", "4"]).unwrap().command else {
            panic!("expected the run command");
        };
        assert_eq!(grid.into_config(None).unwrap().tick_rate, None);
    }
}
