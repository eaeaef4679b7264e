//! datagen: 自己対局データ生成CLI
//!
//! サブコマンドは `gen`（省略時のデフォルト）と `rescore`。
//! 使い方の誤りは終了コード2、`--help` は0で終わる。

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use tools::datagen::{
    load_tablebase, run_rescore, DataGenerator, EpdSeedStream, FilterPreset, RescoreConfig,
    RescoreMode, SeedProvider,
};

/// 置換表の既定サイズ（MB）
const DEFAULT_TT_MB: usize = 128;

/// balancedプリセットの既定コンタクト確率
const DEFAULT_REQUIRE_CAPTURE_PROB: f64 = 0.2;

/// balanced/quietプリセットの既定dedup窓
const DEFAULT_DEDUP: usize = 1_000_000;

#[derive(Parser)]
#[command(
    name = "datagen",
    about = "Atomic chess self-play data generator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate training samples by self-play
    Gen(GenArgs),
    /// Re-evaluate an existing dataset with new search/TB settings
    Rescore(RescoreArgs),
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FilterArg {
    Minimal,
    Balanced,
    Quiet,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RescoreModeArg {
    Search,
    Tb,
    #[value(name = "tb_or_search")]
    TbOrSearch,
}

#[derive(Parser)]
struct GenArgs {
    /// Output .bin path
    #[arg(long)]
    out: PathBuf,

    /// Output format (only bin supported)
    #[arg(long, default_value = "bin")]
    format: String,

    /// Number of samples to write
    #[arg(long)]
    samples: u64,

    /// RNG seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Worker thread count
    #[arg(long, alias = "concurrency", default_value_t = 1)]
    threads: usize,

    /// Progress update every N samples (0 = disable)
    #[arg(long, default_value_t = 2000)]
    progress: u64,

    /// Max plies per game
    #[arg(long, default_value_t = 256)]
    max_moves: i32,

    /// Score threshold to adjudicate the game
    #[arg(long, default_value_t = 6144)]
    eval_limit: i32,

    /// Max search depth per move
    #[arg(long, default_value_t = 6)]
    fixed_depth: i32,

    /// Max search nodes per move
    #[arg(long, default_value_t = 5120)]
    fixed_nodes: u64,

    /// Random prelude min plies (default: 8)
    #[arg(long)]
    plies_min: Option<i32>,

    /// Random prelude max plies (default: 16)
    #[arg(long)]
    plies_max: Option<i32>,

    /// Minimum total pieces (0 = disabled)
    #[arg(long, default_value_t = 0)]
    min_pieces: usize,

    /// Chance to require check/capture positions (0..1)
    #[arg(long)]
    require_capture_prob: Option<f64>,

    /// Dedup window size (records)
    #[arg(long)]
    dedup: Option<usize>,

    /// Dedup window size by MB (overrides --dedup)
    #[arg(long)]
    dedup_hash_mb: Option<usize>,

    /// Position filter preset
    #[arg(long, value_enum, default_value_t = FilterArg::Balanced)]
    filter: FilterArg,

    /// Allow mate-in-one positions
    #[arg(long)]
    allow_mate_in_one: bool,

    /// Disable quiet-only filter in --filter quiet
    #[arg(long)]
    no_quiet_filter: bool,

    /// Include startpos seed
    #[arg(long)]
    startpos: bool,

    /// Load EPD/FEN seeds (repeatable)
    #[arg(long)]
    epd: Vec<PathBuf>,
}

#[derive(Parser)]
struct RescoreArgs {
    /// Input .bin path
    #[arg(long, value_name = "PATH")]
    r#in: PathBuf,

    /// Output .bin path
    #[arg(long)]
    out: PathBuf,

    /// Rescore mode
    #[arg(long, value_enum, default_value_t = RescoreModeArg::Search)]
    mode: RescoreModeArg,

    /// Max nodes per position
    #[arg(long, default_value_t = 200_000)]
    nodes: u64,

    /// Max depth per position (0 = disable)
    #[arg(long, default_value_t = 0)]
    depth: i32,

    /// Worker thread count
    #[arg(long, alias = "concurrency", default_value_t = 1)]
    threads: usize,

    /// Progress update every N samples (0 = disable)
    #[arg(long, default_value_t = 2000)]
    progress: u64,

    /// Atomic TB directory
    #[arg(long)]
    tb_path: Option<PathBuf>,

    /// Max pieces for TB probes (1..6)
    #[arg(long, default_value_t = 6)]
    tb_pieces: usize,
}

fn usage_error(message: &str) -> ExitCode {
    eprintln!("error: {message}");
    ExitCode::from(2)
}

fn run_gen(args: GenArgs) -> ExitCode {
    if args.samples == 0 {
        return usage_error("--samples must be > 0");
    }
    if args.format != "bin" {
        return usage_error("only --format bin is supported");
    }
    if args.max_moves <= 0 {
        return usage_error("--max-moves must be > 0");
    }
    if args.fixed_depth <= 0 {
        return usage_error("--fixed-depth must be > 0");
    }
    if args.fixed_nodes == 0 {
        return usage_error("--fixed-nodes must be > 0");
    }

    // plies-min/max は片方だけ指定されたらもう片方へ寄せる
    let (plies_min, plies_max) = match (args.plies_min, args.plies_max) {
        (None, None) => (8, 16),
        (Some(min), None) => (min, min),
        (None, Some(max)) => (max, max),
        (Some(min), Some(max)) => (min, max),
    };
    if plies_min < 0 || plies_max < 0 {
        return usage_error("--plies-min/max must be >= 0");
    }

    if let Some(prob) = args.require_capture_prob {
        if !(0.0..=1.0).contains(&prob) {
            return usage_error("--require-capture-prob must be between 0 and 1");
        }
    }

    let filter = match args.filter {
        FilterArg::Minimal => FilterPreset::Minimal,
        FilterArg::Balanced => FilterPreset::Balanced,
        FilterArg::Quiet => FilterPreset::Quiet,
    };

    // プリセット依存の既定値
    let require_capture_prob = args.require_capture_prob.unwrap_or(match filter {
        FilterPreset::Balanced => DEFAULT_REQUIRE_CAPTURE_PROB,
        _ => 0.0,
    });

    let dedup_capacity = if let Some(mb) = args.dedup_hash_mb {
        mb * 1024 * 1024 / std::mem::size_of::<u64>()
    } else if let Some(dedup) = args.dedup {
        dedup
    } else {
        match filter {
            FilterPreset::Balanced | FilterPreset::Quiet => DEFAULT_DEDUP,
            FilterPreset::Minimal => 0,
        }
    };

    let mut seeds = Vec::new();
    if args.startpos || args.epd.is_empty() {
        seeds.push(ratomic_core::position::Position::startpos());
    }

    let seed_provider: Option<Arc<dyn SeedProvider>> = if args.epd.is_empty() {
        None
    } else {
        for path in &args.epd {
            if std::fs::File::open(path).is_err() {
                return usage_error(&format!("unable to open epd file: {}", path.display()));
            }
        }
        Some(Arc::new(EpdSeedStream::new(args.epd.clone())))
    };

    let generator = match DataGenerator::new(&args.out, args.samples, DEFAULT_TT_MB, args.progress)
    {
        Ok(generator) => generator,
        Err(err) => {
            eprintln!("error: unable to create output file: {err}");
            return ExitCode::FAILURE;
        }
    };

    let generator = generator
        .set_concurrency(args.threads.max(1))
        .set_ply_limit(args.max_moves)
        .set_eval_limit(args.eval_limit)
        .set_fixed_depth(args.fixed_depth)
        .set_fixed_nodes(args.fixed_nodes)
        .set_random_ply_range(plies_min, plies_max)
        .set_min_pieces(args.min_pieces)
        .set_require_capture_prob(require_capture_prob)
        .set_filter(filter)
        .set_quiet_filter_enabled(!args.no_quiet_filter)
        .set_allow_mate_in_one(args.allow_mate_in_one)
        .set_seed(args.seed)
        .set_seed_provider(seed_provider)
        .set_dedup_capacity(dedup_capacity)
        .set_seeds(seeds);

    if let Err(err) = generator.generate_data() {
        eprintln!("error: data generation failed: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run_rescore_cmd(args: RescoreArgs) -> ExitCode {
    if args.nodes == 0 && args.depth <= 0 {
        return usage_error("--nodes or --depth must be set");
    }
    if args.tb_pieces == 0 || args.tb_pieces > 6 {
        return usage_error("--tb-pieces must be between 1 and 6");
    }

    let mode = match args.mode {
        RescoreModeArg::Search => RescoreMode::Search,
        RescoreModeArg::Tb => RescoreMode::Tb,
        RescoreModeArg::TbOrSearch => RescoreMode::TbOrSearch,
    };

    // オラクルのロード失敗はtbモードでは致命的、tb_or_searchでは探索へ退避
    let tb = match (mode, &args.tb_path) {
        (RescoreMode::Search, _) | (RescoreMode::TbOrSearch, None) => None,
        (RescoreMode::Tb, None) => {
            return usage_error("--tb-path is required for --mode tb");
        }
        (RescoreMode::Tb, Some(path)) => match load_tablebase(path) {
            Ok(tb) => Some(tb),
            Err(err) => {
                eprintln!("error: {err:#}");
                return ExitCode::FAILURE;
            }
        },
        (RescoreMode::TbOrSearch, Some(path)) => match load_tablebase(path) {
            Ok(tb) => Some(tb),
            Err(err) => {
                eprintln!("warning: {err:#}; using search only");
                None
            }
        },
    };

    let config = RescoreConfig {
        in_path: args.r#in,
        out_path: args.out,
        mode,
        nodes: args.nodes,
        depth: args.depth,
        threads: args.threads.max(1),
        progress_every: args.progress,
        tb_pieces: args.tb_pieces,
    };

    match run_rescore(&config, tb) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // サブコマンド省略時は gen として扱う
    let mut argv: Vec<OsString> = std::env::args_os().collect();
    let needs_default = match argv.get(1).map(|arg| arg.to_string_lossy().into_owned()) {
        Some(first) => !matches!(
            first.as_str(),
            "gen" | "rescore" | "--help" | "-h" | "--version" | "-V" | "help"
        ),
        None => true,
    };
    if needs_default {
        argv.insert(1, OsString::from("gen"));
    }

    let cli = Cli::parse_from(argv);
    match cli.command {
        Command::Gen(args) => run_gen(args),
        Command::Rescore(args) => run_rescore_cmd(args),
    }
}
