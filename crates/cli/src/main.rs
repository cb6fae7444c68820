use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser};
use log::{info, warn};
use num_complex::Complex64;
use pwfft_backend_cpu::CpuDevice;
use pwfft_core::device::Device;
use pwfft_core::{CoefficientMap, Engine, GridShape, PlanarStrategy};

mod config;

use config::{Backend, RunConfig};

#[cfg(test)]
mod _tests_config;

#[derive(Parser, Debug)]
#[command(name = "pwfft", about = "Projection round-trip self-check for the plane-wave FFT engine")]
struct Cli {
    /// Path to a TOML run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Device to run on
    #[arg(long, value_enum)]
    backend: Option<Backend>,
    /// Dense grid as N0xN1xN2 (or a single N for a cube)
    #[arg(long, value_parser = parse_shape)]
    shape: Option<[usize; 3]>,
    /// Fraction of the Nyquist frequency kept along every axis
    #[arg(long)]
    cutoff: Option<f64>,
    /// Number of timed round trips
    #[arg(long)]
    repeat: Option<usize>,
    /// Byte budget for the CPU device, in MiB
    #[arg(long)]
    memory_limit_mb: Option<usize>,
    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
    /// Only log warnings and errors
    #[arg(long)]
    quiet: bool,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_shape(raw: &str) -> Result<[usize; 3], String> {
    let parts = raw
        .split(['x', 'X', ','])
        .map(|part| part.trim().parse::<usize>().map_err(|e| format!("{part:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [n] => Ok([*n; 3]),
        [n0, n1, n2] => Ok([*n0, *n1, *n2]),
        _ => Err(format!("expected N or N0xN1xN2, got {raw:?}")),
    }
}

fn init_logging(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn effective_config(cli: &Cli) -> Result<RunConfig, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("loading config {}", path.display());
            RunConfig::from_file(path)?
        }
        None => RunConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(shape) = cli.shape {
        config.shape = shape;
    }
    if let Some(cutoff) = cli.cutoff {
        config.cutoff = cutoff;
    }
    if let Some(repeat) = cli.repeat {
        config.repeat = repeat;
    }
    if cli.memory_limit_mb.is_some() {
        config.memory_limit_mb = cli.memory_limit_mb;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli);
    let config = effective_config(&cli)?;
    if cli.dump_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let report = match config.backend {
        Backend::Cpu => {
            let mut device = CpuDevice::new();
            if let Some(bytes) = config.memory_limit_bytes() {
                device = device.with_memory_limit(bytes);
            }
            self_check(Engine::with_config(device, config.engine.clone())?, &config)?
        }
        Backend::Cuda => run_cuda(&config)?,
    };
    report.print(&config);

    if report.max_error > TOLERANCE {
        return Err(format!(
            "self-check failed: projection is not idempotent (max error {:.3e})",
            report.max_error
        )
        .into());
    }
    Ok(())
}

#[cfg(feature = "cuda")]
fn run_cuda(config: &RunConfig) -> Result<Report, Box<dyn Error>> {
    if config.memory_limit_mb.is_some() {
        warn!("memory_limit_mb only applies to the cpu backend; ignoring it");
    }
    let device = pwfft_backend_cuda::CudaDevice::try_new(0)?;
    self_check(Engine::with_config(device, config.engine.clone())?, config)
}

#[cfg(not(feature = "cuda"))]
fn run_cuda(_config: &RunConfig) -> Result<Report, Box<dyn Error>> {
    warn!(
        "cuda backend requested; device available: {}",
        pwfft_backend_cuda::is_available()
    );
    Err("this build has no CUDA support; rebuild with `--features cuda`".into())
}

// ============================================================================
// Self-check
// ============================================================================

const TOLERANCE: f64 = 1e-8;

struct Report {
    device: String,
    ngpts: usize,
    nmaps: usize,
    planar: PlanarStrategy,
    timings: Vec<Duration>,
    max_error: f64,
    hits: u64,
    misses: u64,
    transient: u64,
}

impl Report {
    fn print(&self, config: &RunConfig) {
        let [n0, n1, n2] = config.shape;
        println!("device      {}", self.device);
        println!("grid        {n0}x{n1}x{n2} ({} points)", n0 * n1 * n2);
        println!(
            "map         {} coefficients, {} table(s), cutoff {}",
            self.ngpts, self.nmaps, config.cutoff
        );
        println!("planar      {:?}", self.planar);
        if let (Some(best), Some(worst)) = (self.timings.iter().min(), self.timings.iter().max()) {
            let total: Duration = self.timings.iter().sum();
            println!(
                "round trip  best {:.3} ms, mean {:.3} ms, worst {:.3} ms over {} runs",
                best.as_secs_f64() * 1e3,
                total.as_secs_f64() * 1e3 / self.timings.len() as f64,
                worst.as_secs_f64() * 1e3,
                self.timings.len()
            );
        }
        println!("max error   {:.3e}", self.max_error);
        println!(
            "plans       {} hits, {} misses, {} transient",
            self.hits, self.misses, self.transient
        );
    }
}

fn test_field(shape: GridShape) -> Vec<f64> {
    let [n0, n1, n2] = shape.npts;
    let mut field = vec![0.0; shape.len()];
    for i2 in 0..n2 {
        for i1 in 0..n1 {
            for i0 in 0..n0 {
                let (x, y, z) = (
                    i0 as f64 / n0 as f64,
                    i1 as f64 / n1 as f64,
                    i2 as f64 / n2 as f64,
                );
                field[shape.idx(i0, i1, i2)] = (std::f64::consts::TAU * (x + 2.0 * y)).cos()
                    + 0.5 * (std::f64::consts::TAU * 3.0 * z).sin()
                    + 0.1 * ((i0 * 7 + i1 * 13 + i2 * 29) % 11) as f64;
            }
        }
    }
    field
}

/// Gathers a field, scatters it back and gathers again. The gather of
/// the reconstruction must reproduce the first gather up to the combined
/// scale `s_forward * s_backward * N`.
fn self_check<D: Device>(mut engine: Engine<D>, config: &RunConfig) -> Result<Report, Box<dyn Error>> {
    let shape = config.grid();
    let map = if config.hermitian {
        CoefficientMap::hermitian_half(shape, config.cutoff)?
    } else {
        CoefficientMap::spherical(shape, config.cutoff)?
    };
    if map.is_empty() {
        return Err(format!("cutoff {} keeps no coefficients", config.cutoff).into());
    }
    let device = engine.device().name().to_string();
    info!(
        "self-check on {device}: grid {:?}, {} coefficients",
        shape.npts,
        map.ngpts()
    );

    let (s_fwd, s_bwd) = (config.forward_scale(), config.scales.backward);
    let expected_ratio = s_fwd * s_bwd * shape.len() as f64;
    let field = test_field(shape);
    let mut first = vec![Complex64::default(); map.ngpts()];
    let mut second = vec![Complex64::default(); map.ngpts()];
    let mut rebuilt = vec![0.0; shape.len()];

    let mut timings = Vec::with_capacity(config.repeat);
    let mut max_error = 0.0_f64;
    for run in 0..config.repeat {
        let started = Instant::now();
        engine.forward_gather(&field, &mut first, &map, shape, s_fwd)?;
        engine.scatter_backward(&first, &mut rebuilt, &map, shape, s_bwd)?;
        engine.forward_gather(&rebuilt, &mut second, &map, shape, s_fwd)?;
        timings.push(started.elapsed());

        let norm = first.iter().map(|c| c.norm()).fold(0.0, f64::max).max(f64::MIN_POSITIVE);
        let error = first
            .iter()
            .zip(&second)
            .map(|(a, b)| (*a * expected_ratio - *b).norm())
            .fold(0.0, f64::max)
            / (norm * expected_ratio.abs().max(f64::MIN_POSITIVE));
        log::debug!("run {run}: relative error {error:.3e}");
        max_error = max_error.max(error);
    }

    let stats = engine.plan_stats();
    engine.release_plans()?;
    Ok(Report {
        device,
        ngpts: map.ngpts(),
        nmaps: map.nmaps(),
        planar: engine.config().planar,
        timings,
        max_error,
        hits: stats.hits,
        misses: stats.misses,
        transient: stats.transient,
    })
}
