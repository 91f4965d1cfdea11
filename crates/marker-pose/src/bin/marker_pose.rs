//! marker-pose CLI: replay recorded sessions and solve single marker poses.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use marker_pose::aruco::DictionaryId;
use marker_pose::core::{
    Intrinsics, MarkerGeometry, PoseEstimator, PoseEstimatorParams, Quaternion,
};
use marker_pose::pipeline::{
    CancelSource, CaptureSource, FrameBudget, JsonLinesRenderer, LogRenderer, NeverCancel,
    OverlayRenderer, PoseSession, Renderer, ReplayDetector, ReplaySource, SessionConfig,
};
use nalgebra::Point2;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "marker-pose")]
#[command(about = "Estimate 6-DoF poses of square fiducial markers")]
#[command(version)]
struct Cli {
    /// Log verbosity.
    #[arg(long, value_enum, global = true, default_value_t = LevelArg::Info)]
    log_level: LevelArg,

    /// Emit logs as JSON objects (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded session through the pose pipeline.
    Replay(ReplayArgs),

    /// Estimate the pose of one marker from its four image corners.
    Solve(SolveArgs),

    /// Print or write the default session config.
    DefaultConfig {
        /// Write the config here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// Recording opened as the primary source.
    #[arg(long)]
    recording: PathBuf,

    /// Recording opened if the primary one cannot be.
    #[arg(long)]
    fallback_recording: Option<PathBuf>,

    /// Session config (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the config's dictionary, e.g. DICT_4X4_50.
    #[arg(long)]
    dictionary: Option<DictionaryId>,

    /// Override the config's marker edge length in meters.
    #[arg(long)]
    edge_length: Option<f64>,

    /// Stream per-frame results to this JSON-lines file.
    #[arg(long)]
    jsonl: Option<PathBuf>,

    /// Write one annotated PNG per frame into this directory.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// TTF/OTF font used to print marker ids on the overlay images.
    #[arg(long, requires = "overlay_dir")]
    overlay_font: Option<PathBuf>,

    /// Stop after this many loop iterations.
    #[arg(long)]
    max_frames: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct SolveArgs {
    /// Corners TL TR BR BL as "x,y x,y x,y x,y" in pixels.
    #[arg(long, allow_hyphen_values = true)]
    corners: String,

    #[arg(long)]
    fx: f64,
    #[arg(long)]
    fy: f64,
    #[arg(long)]
    cx: f64,
    #[arg(long)]
    cy: f64,

    /// Distortion coefficients "k1,k2,p1,p2[,k3[,k4,k5,k6]]".
    #[arg(long, allow_hyphen_values = true)]
    dist: Option<String>,

    /// Marker edge length in meters.
    #[arg(long)]
    edge_length: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LevelArg> for LevelFilter {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Off => LevelFilter::Off,
            LevelArg::Error => LevelFilter::Error,
            LevelArg::Warn => LevelFilter::Warn,
            LevelArg::Info => LevelFilter::Info,
            LevelArg::Debug => LevelFilter::Debug,
            LevelArg::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Serialize)]
struct SolveOutput {
    rvec: [f64; 3],
    tvec: [f64; 3],
    quaternion: Quaternion,
    reprojection_rms_px: f64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    init_logging(cli.log_level, cli.json_log)?;

    match cli.command {
        Commands::Replay(args) => run_replay(&args),
        Commands::Solve(args) => run_solve(&args),
        Commands::DefaultConfig { out } => run_default_config(out),
    }
}

#[cfg(feature = "tracing")]
fn init_logging(level: LevelArg, json: bool) -> CliResult<()> {
    tracing_log::LogTracer::init()?;
    let filter = LevelFilter::from(level).to_string().to_lowercase();
    marker_pose::core::init_tracing(json, &filter);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelArg, json: bool) -> CliResult<()> {
    marker_pose::core::init_with_level(level.into())?;
    if json {
        log::warn!("--json-log needs the `tracing` feature; using plain logs");
    }
    Ok(())
}

// ── replay ─────────────────────────────────────────────────────────────

fn load_config(args: &ReplayArgs) -> CliResult<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_json(path)?,
        None => SessionConfig::default(),
    };
    if let Some(dictionary) = args.dictionary {
        config.dictionary = dictionary;
    }
    if let Some(edge) = args.edge_length {
        config.edge_length_m = edge;
    }
    Ok(config)
}

fn run_replay(args: &ReplayArgs) -> CliResult<()> {
    let config = load_config(args)?;
    let detector = ReplayDetector::new();
    let primary = ReplaySource::new(&args.recording, &detector);
    let secondary = args
        .fallback_recording
        .as_ref()
        .map(|path| ReplaySource::new(path, &detector));

    let mut renderers: Vec<Box<dyn Renderer>> = vec![Box::new(LogRenderer)];
    if let Some(path) = &args.jsonl {
        renderers.push(Box::new(JsonLinesRenderer::create(path)?));
    }
    if let Some(dir) = &args.overlay_dir {
        let overlay = match &args.overlay_font {
            Some(font) => OverlayRenderer::new(dir).with_label_font(font)?,
            None => OverlayRenderer::new(dir),
        };
        renderers.push(Box::new(overlay));
    }

    let mut cancel: Box<dyn CancelSource> = match args.max_frames {
        Some(n) => Box::new(FrameBudget::new(n)),
        None => Box::new(NeverCancel),
    };

    let mut session = PoseSession::new(config, detector)?;
    let summary = session.run(
        &primary,
        secondary.as_ref().map(|s| s as &dyn CaptureSource),
        &mut renderers,
        &mut cancel,
    )?;

    if let Some(path) = &args.jsonl {
        info!("results written to {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// ── solve ──────────────────────────────────────────────────────────────

fn parse_floats(text: &str, what: &str) -> CliResult<Vec<f64>> {
    text.split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| CliError::from(format!("invalid {what} value '{v}': {e}")))
        })
        .collect()
}

fn parse_corners(text: &str) -> CliResult<[Point2<f64>; 4]> {
    let points = text
        .split_whitespace()
        .map(|pair| match parse_floats(pair, "corner")?.as_slice() {
            [x, y] => Ok(Point2::new(*x, *y)),
            _ => Err(CliError::from(format!("corner '{pair}' is not of the form x,y"))),
        })
        .collect::<CliResult<Vec<_>>>()?;
    <[Point2<f64>; 4]>::try_from(points)
        .map_err(|p| CliError::from(format!("expected 4 corners, got {}", p.len())))
}

fn run_solve(args: &SolveArgs) -> CliResult<()> {
    let corners = parse_corners(&args.corners)?;
    let distortion = match &args.dist {
        Some(d) => parse_floats(d, "distortion")?,
        None => Vec::new(),
    };
    let intrinsics = Intrinsics::new(args.fx, args.fy, args.cx, args.cy, distortion)?;
    let geometry = MarkerGeometry::new(args.edge_length)?;

    let estimator = PoseEstimator::new(geometry, PoseEstimatorParams::default());
    let estimate = estimator.estimate(&corners, &intrinsics)?;
    let rvec = estimate.pose.rvec();
    let tvec = estimate.pose.translation();
    let out = SolveOutput {
        rvec: [rvec.x, rvec.y, rvec.z],
        tvec: [tvec.x, tvec.y, tvec.z],
        quaternion: estimate.pose.quaternion(),
        reprojection_rms_px: estimate.reprojection_rms_px,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config(out: Option<PathBuf>) -> CliResult<()> {
    let config = SessionConfig::default();
    match out {
        Some(path) => {
            config.write_json(&path)?;
            info!("default config written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}
