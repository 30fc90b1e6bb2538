mod report;

use std::{
    fs,
    io::IsTerminal,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use aim_core::{
    extract_offsets, DevAxis, ExtractConfig, MeasurementStore, Selection, TrialParams,
};
use aim_schema::{MapNote, Pattern, ReplayFrame};
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Parser)]
#[command(name = "aim")]
#[command(about = "Aim precision drilling and analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a trial pattern as JSON.
    Pattern {
        #[command(flatten)]
        trial: TrialArgs,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score a captured replay against its pattern and record the result.
    Analyze {
        /// Pattern JSON written by `pattern`. Regenerated from the trial parameters if omitted.
        #[arg(long)]
        map: Option<PathBuf>,
        /// Replay frames as a JSON array.
        #[arg(long)]
        replay: PathBuf,
        #[arg(long)]
        store: PathBuf,
        #[arg(long, default_value_t = 0)]
        user_id: u64,
        /// Extraction settings JSON; missing fields take their defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        trial: TrialArgs,
    },
    /// Fit deviation models over recorded trials.
    Report {
        #[arg(long)]
        store: PathBuf,
        #[arg(long, default_value_t = 0)]
        user_id: u64,
        #[arg(long, value_enum)]
        by: ReportKind,
        #[arg(long, value_enum, default_value_t = AxisArg::Xy)]
        axis: AxisArg,
        /// Trials averaged per point for angle and bpm reports.
        #[arg(long, default_value_t = 3)]
        best_n: usize,
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

#[derive(Debug, Args)]
struct TrialArgs {
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,
    #[arg(long, default_value_t = 100.0)]
    spacing: f64,
    #[arg(long, default_value_t = 90.0)]
    angle: f64,
    #[arg(long, default_value_t = 0.0)]
    rotation: f64,
    #[arg(long, default_value_t = 3)]
    notes: u32,
    #[arg(long, default_value_t = 20)]
    repeats: u32,
    #[arg(long, default_value_t = 4.0)]
    cs: f64,
    #[arg(long, default_value_t = 8.0)]
    ar: f64,
}

impl From<&TrialArgs> for TrialParams {
    fn from(args: &TrialArgs) -> Self {
        TrialParams {
            bpm: args.bpm,
            spacing: args.spacing,
            angle: args.angle,
            rotation: args.rotation,
            note_count: args.notes,
            repeats: args.repeats,
            cs: args.cs,
            ar: args.ar,
            bpm_step: None,
        }
    }
}

/// Inclusive ranges written as `MIN..MAX`.
#[derive(Debug, Args)]
struct SelectionArgs {
    #[arg(long, value_parser = parse_range)]
    bpm_range: Option<RangeInclusive<f64>>,
    #[arg(long, value_parser = parse_range)]
    spacing_range: Option<RangeInclusive<f64>>,
    #[arg(long, value_parser = parse_range)]
    angle_range: Option<RangeInclusive<f64>>,
    #[arg(long, value_parser = parse_range)]
    rotation_range: Option<RangeInclusive<f64>>,
    #[arg(long, value_parser = parse_count_range)]
    notes_range: Option<RangeInclusive<u32>>,
}

impl From<&SelectionArgs> for Selection {
    fn from(args: &SelectionArgs) -> Self {
        Selection {
            bpm: args.bpm_range.clone(),
            spacing: args.spacing_range.clone(),
            angle: args.angle_range.clone(),
            rotation: args.rotation_range.clone(),
            note_count: args.notes_range.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportKind {
    Velocity,
    Angle,
    Bpm,
    Notes,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AxisArg {
    X,
    Y,
    Xy,
    T,
    AvgX,
    AvgY,
    AvgT,
}

impl From<AxisArg> for DevAxis {
    fn from(axis: AxisArg) -> Self {
        match axis {
            AxisArg::X => DevAxis::X,
            AxisArg::Y => DevAxis::Y,
            AxisArg::Xy => DevAxis::XY,
            AxisArg::T => DevAxis::T,
            AxisArg::AvgX => DevAxis::AvgX,
            AxisArg::AvgY => DevAxis::AvgY,
            AxisArg::AvgT => DevAxis::AvgT,
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Pattern { trial, output } => {
            let params = TrialParams::from(&trial);
            let pattern = params.pattern().context("pattern generation failed")?;
            if pattern.clipped {
                warn!(spacing = params.spacing, angle = params.angle, "pattern was clamped into the playfield");
            }

            let json = serde_json::to_string_pretty(&pattern).context("failed to serialize pattern")?;
            match output {
                Some(path) => fs::write(&path, json)
                    .with_context(|| format!("failed to write: {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        Command::Analyze {
            map,
            replay,
            store,
            user_id,
            config,
            trial,
        } => {
            let params = TrialParams::from(&trial);
            let base = match config {
                Some(path) => read_json::<ExtractConfig>(&path)?,
                None => ExtractConfig::default(),
            };
            let map_notes = match map {
                Some(path) => read_json::<Pattern>(&path)?.to_map_notes(),
                None => params.pattern().context("pattern generation failed")?.to_map_notes(),
            };
            let frames: Vec<ReplayFrame> = read_json(&replay)?;

            analyze(&params, &base, &map_notes, &frames, &store, user_id)?;
        }
        Command::Report {
            store,
            user_id,
            by,
            axis,
            best_n,
            selection,
        } => {
            let store = MeasurementStore::load(&store, user_id)
                .with_context(|| format!("failed to load store: {}", store.display()))?;
            let records = store.select(&Selection::from(&selection));
            let axis = DevAxis::from(axis);

            let series = match by {
                ReportKind::Velocity => aim_core::velocity_report(&records, axis),
                ReportKind::Angle => aim_core::angle_report(&records, axis, best_n),
                ReportKind::Bpm => aim_core::bpm_report(&records, axis, best_n),
                ReportKind::Notes => {
                    report::print_points("notes", &aim_core::notes_report(&records, axis));
                    return Ok(());
                }
            };
            let (kind, group) = by_label(by);
            report::print_series(kind, group, &series);
        }
    }

    Ok(())
}

fn analyze(
    params: &TrialParams,
    base: &ExtractConfig,
    map: &[MapNote],
    frames: &[ReplayFrame],
    store_path: &Path,
    user_id: u64,
) -> anyhow::Result<()> {
    let config = params.extract_config(base);
    let offsets = extract_offsets(map, frames, &config)
        .map_err(|rejection| anyhow::anyhow!("trial rejected: {rejection}"))?;

    report::print_trial(&offsets);

    let mut store = MeasurementStore::load(store_path, user_id)
        .with_context(|| format!("failed to load store: {}", store_path.display()))?;
    store
        .append_trial(params.key(), &offsets.stats)
        .context("failed to record trial")?;
    store
        .save(store_path)
        .with_context(|| format!("failed to save store: {}", store_path.display()))?;

    info!(records = store.len(), "trial recorded");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse: {}", path.display()))
}

fn parse_range(s: &str) -> Result<RangeInclusive<f64>, String> {
    let (lo, hi) = s
        .split_once("..")
        .ok_or_else(|| format!("expected MIN..MAX, got `{s}`"))?;
    let lo: f64 = lo.trim().parse().map_err(|e| format!("bad lower bound: {e}"))?;
    let hi: f64 = hi.trim().parse().map_err(|e| format!("bad upper bound: {e}"))?;
    if lo > hi {
        return Err(format!("empty range `{s}`"));
    }
    Ok(lo..=hi)
}

fn parse_count_range(s: &str) -> Result<RangeInclusive<u32>, String> {
    let (lo, hi) = s
        .split_once("..")
        .ok_or_else(|| format!("expected MIN..MAX, got `{s}`"))?;
    let lo: u32 = lo.trim().parse().map_err(|e| format!("bad lower bound: {e}"))?;
    let hi: u32 = hi.trim().parse().map_err(|e| format!("bad upper bound: {e}"))?;
    if lo > hi {
        return Err(format!("empty range `{s}`"));
    }
    Ok(lo..=hi)
}

/// Report name and the parameter its series are split by.
fn by_label(kind: ReportKind) -> (&'static str, &'static str) {
    match kind {
        ReportKind::Velocity => ("velocity", "angle"),
        ReportKind::Angle => ("angle", "bpm"),
        ReportKind::Bpm => ("bpm", "spacing"),
        ReportKind::Notes => ("notes", "notes"),
    }
}

// Logs go to stderr so stdout stays machine readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).init();
}
