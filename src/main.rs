//! Gray-Scott CLI - Run headless simulations from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::path::{Path, PathBuf};
use std::time::Instant;

use gray_scott::{
    compute::{ComputeBackend, CpuBackend, GridStats, ProgramLibrary, Simulation, WgpuBackend},
    schema::{DEFAULT_CONFIG_PATH, ParameterLibrary, SimulationParameters},
};

struct Options {
    config: Option<PathBuf>,
    preset: Option<String>,
    frames: u64,
    gpu: bool,
    width: Option<u32>,
    height: Option<u32>,
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--example") {
        print_example_config();
        return;
    }
    if args.iter().any(|a| a == "--help") {
        print_usage(&args[0]);
        return;
    }

    let options = parse_args(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage(&args[0]);
        std::process::exit(1);
    });

    let params = resolve_params(&options).unwrap_or_else(|e| {
        eprintln!("Error loading configuration: {}", e);
        std::process::exit(1);
    });

    println!("Gray-Scott Simulation");
    println!("=====================");
    println!("Grid: {}x{}", params.width, params.height);
    println!(
        "Rates: Da={} Db={} F={} k={} dt={}",
        params.diffusion_rate_a,
        params.diffusion_rate_b,
        params.feed_rate,
        params.kill_rate,
        params.time_step
    );
    println!("Boundary: {:?}", params.boundary);
    println!("Steps/frame: {}", params.steps_per_frame);
    println!("Frames: {}", options.frames);
    println!();

    let (width, height) = (params.width, params.height);
    if options.gpu {
        let backend = pollster::block_on(WgpuBackend::headless(width, height)).unwrap_or_else(|e| {
            eprintln!("Error creating GPU backend: {}", e);
            std::process::exit(1);
        });
        println!("Backend: wgpu (offscreen)");
        run(backend, params, options.frames);
    } else {
        println!("Backend: CPU");
        run(CpuBackend::new(width, height), params, options.frames);
    }
}

fn run<B: ComputeBackend>(backend: B, params: SimulationParameters, frames: u64) {
    let mut simulation =
        Simulation::new(backend, params, ProgramLibrary::builtin()).unwrap_or_else(|e| {
            eprintln!("Error building simulation: {}", e);
            std::process::exit(1);
        });

    let initial = read_stats(&mut simulation);
    println!();
    print_stats("Initial state", &initial);

    println!("Running simulation...");
    let start = Instant::now();

    for i in 0..frames {
        simulation.render_frame();

        // Print progress every 10%
        if (i + 1) % (frames / 10).max(1) == 0 {
            let stats = read_stats(&mut simulation);
            let elapsed = start.elapsed().as_secs_f32();
            println!(
                "  Frame {}/{}: B mean={:.6}, active={}, {:.1} steps/s",
                i + 1,
                frames,
                stats.b.mean,
                stats.active_cells,
                simulation.stats().steps as f32 / elapsed
            );
            if stats.is_diverged() {
                eprintln!("  {} cells diverged, stopping", stats.non_finite_cells);
                break;
            }
        }
    }

    let elapsed = start.elapsed();
    let counters = simulation.stats();
    let final_stats = read_stats(&mut simulation);

    println!();
    print_stats("Final state", &final_stats);
    println!(
        "Frames: {} presented, {} skipped",
        counters.frames_presented, counters.frames_skipped
    );
    println!(
        "Time: {:.2}s ({:.1} steps/s)",
        elapsed.as_secs_f32(),
        counters.steps as f32 / elapsed.as_secs_f32()
    );
}

fn read_stats<B: ComputeBackend>(simulation: &mut Simulation<B>) -> GridStats {
    let cells = simulation.read_current().unwrap_or_else(|e| {
        eprintln!("Error reading grid: {}", e);
        std::process::exit(1);
    });
    GridStats::from_cells(&cells)
}

fn print_stats(title: &str, stats: &GridStats) {
    println!("{}:", title);
    println!(
        "  A range: [{:.6}, {:.6}], mean {:.6}",
        stats.a.min, stats.a.max, stats.a.mean
    );
    println!(
        "  B range: [{:.6}, {:.6}], mean {:.6}",
        stats.b.min, stats.b.max, stats.b.mean
    );
    println!("  Active cells: {}", stats.active_cells);
    println!();
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        config: None,
        preset: None,
        frames: 100,
        gpu: false,
        width: None,
        height: None,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} requires a value", arg))
        };
        match arg.as_str() {
            "--config" => options.config = Some(PathBuf::from(value()?)),
            "--preset" => options.preset = Some(value()?),
            "--frames" => options.frames = parse_number(arg, &value()?)?,
            "--gpu" => options.gpu = true,
            "-w" | "--width" => options.width = Some(parse_number(arg, &value()?)?),
            "-h" | "--height" => options.height = Some(parse_number(arg, &value()?)?),
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }

    Ok(options)
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got '{}'", flag, value))
}

/// Pick the parameter set: a named preset from the configuration file (or
/// the built-in presets when there is none), then apply size overrides.
fn resolve_params(options: &Options) -> Result<SimulationParameters, String> {
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    let library = match &options.config {
        Some(path) => ParameterLibrary::load(path).map_err(|e| e.to_string())?,
        None if default_path.exists() => {
            ParameterLibrary::load(default_path).map_err(|e| e.to_string())?
        }
        None => ParameterLibrary::builtin(),
    };

    let mut params = match &options.preset {
        Some(name) => library.get(name).map_err(|e| e.to_string())?,
        None => SimulationParameters::default(),
    };

    if let Some(width) = options.width {
        params.width = width;
    }
    if let Some(height) = options.height {
        params.height = height;
    }
    params.validate().map_err(|e| e.to_string())?;
    Ok(params)
}

fn print_usage(program: &str) {
    eprintln!(
        "Usage: {} [--config PATH] [--preset NAME] [--frames N] [--gpu] [-w W] [-h H]",
        program
    );
    eprintln!();
    eprintln!("Run a headless Gray-Scott simulation and report grid statistics.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config PATH  Configuration library (default: {} if present)", DEFAULT_CONFIG_PATH);
    eprintln!("  --preset NAME  Named configuration to run (default: built-in defaults)");
    eprintln!("  --frames N     Number of frames to run (default: 100)");
    eprintln!("  --gpu          Run on the GPU with an offscreen target");
    eprintln!("  -w W, -h H     Override grid width and height");
    eprintln!("  --example      Print an example configuration library");
}

fn print_example_config() {
    let library = ParameterLibrary::builtin();

    println!("Example configuration ({}):", DEFAULT_CONFIG_PATH);
    match serde_json::to_string_pretty(&library) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example: {}", e),
    }
}
