use anyhow::{Context, Result};
use capture_renamer_core::{
    app_paths, classify, load_config, run_batch, save_config, BatchOptions, BatchReport,
    EntryOutcome, FfprobeProbe, MetadataProbe, TimeShift, TimestampSource,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "capture-renamer-cli")]
#[command(about = "カメラ・ドローンの写真/動画を撮影日時ベースのファイル名に一括リネームします")]
struct Cli {
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Rename(RenameArgs),
    Probe(ProbeArgs),
    Classify(ClassifyArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
}

#[derive(Debug, Args)]
struct RenameArgs {
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long, value_enum)]
    source: Option<SourceArg>,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    hours: i64,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    days: i64,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    months: i32,
    #[arg(long)]
    tag: Option<String>,
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long, default_value_t = false)]
    keep_mtime: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct ClassifyArgs {
    #[arg(required = true)]
    names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    Mtime,
    Metadata,
    Filename,
}

impl From<SourceArg> for TimestampSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Mtime => TimestampSource::FileModificationTime,
            SourceArg::Metadata => TimestampSource::EmbeddedVideoMetadata,
            SourceArg::Filename => TimestampSource::EncodedFilenameDateTime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Rename(args) => cmd_rename(args),
        Commands::Probe(args) => cmd_probe(args),
        Commands::Classify(args) => cmd_classify(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "capture_renamer_core=debug,capture_renamer_cli=debug"
    } else {
        "capture_renamer_core=info,capture_renamer_cli=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_rename(args: RenameArgs) -> Result<()> {
    let mut config = load_config()?;
    let directory = args
        .input
        .clone()
        .or_else(|| config.last_folder.clone())
        .context("--input を指定してください (前回のフォルダも記録されていません)")?;

    let options = BatchOptions {
        directory: directory.clone(),
        timestamp_source: args
            .source
            .map(Into::into)
            .unwrap_or(config.timestamp_source),
        shift: TimeShift {
            hours: args.hours,
            days: args.days,
            months: args.months,
        },
        custom_tag: args.tag.clone().unwrap_or_else(|| config.custom_tag.clone()),
        dry_run: !args.apply,
        sync_modified_time: config.sync_modified_time && !args.keep_mtime,
    };

    let probe = FfprobeProbe::new(&config.ffprobe_path);
    let report = run_batch(&options, &probe)?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            print_table(&report);
        }
    }

    if report.dry_run {
        eprintln!("dry-runモード: 実ファイルは変更していません。適用するには --apply を指定してください。");
    } else {
        eprintln!(
            "適用完了: リネーム {}件 (重複フォルダ {}件) 削除 {}件 失敗 {}件",
            report.stats.renamed,
            report.stats.fallbacks,
            report.stats.deleted,
            report.stats.failed
        );
    }

    config.last_folder = Some(directory);
    if let Err(err) = save_config(&config) {
        tracing::warn!(error = %err, "前回のフォルダを保存できませんでした");
    }

    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> Result<()> {
    let config = load_config()?;
    let probe = FfprobeProbe::new(&config.ffprobe_path);
    let report = probe
        .probe(&args.file)
        .with_context(|| format!("メディア情報を取得できませんでした: {}", args.file.display()))?;
    print!("{}", report.describe(&args.file));
    match report.creation_time() {
        Some(value) => println!("creation_time: {value}"),
        None => println!("creation_time: (なし)"),
    }
    Ok(())
}

fn cmd_classify(args: ClassifyArgs) -> Result<()> {
    for name in &args.names {
        let result = classify(name);
        println!(
            "{} -> {:?} / {} ({:?})",
            name, result.convention, result.suffix, result.rule
        );
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("設定ファイル: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_table(report: &BatchReport) {
    println!("元ファイル -> 新ファイル (状態)");
    for entry in &report.entries {
        let name = entry.path.display();
        match &entry.outcome {
            EntryOutcome::Deleted => println!("{name} -> (削除)"),
            EntryOutcome::Skipped => println!("{name} -> (スキップ)"),
            EntryOutcome::Renamed { plan } => {
                let note = if plan.is_fallback { " [重複]" } else { "" };
                println!(
                    "{} -> {}{} ({:?})",
                    name,
                    plan.final_path.display(),
                    note,
                    plan.classification.convention
                );
            }
            EntryOutcome::Unchanged { .. } => println!("{name} -> (変更なし)"),
            EntryOutcome::Failed { reason } => println!("{name} -> (失敗: {reason})"),
        }
    }

    let stats = &report.stats;
    println!(
        "\n集計: scanned={} renamed={} duplicates={} unchanged={} deleted={} skipped={} failed={}",
        stats.scanned_files,
        stats.renamed,
        stats.fallbacks,
        stats.unchanged,
        stats.deleted,
        stats.skipped,
        stats.failed
    );
}
