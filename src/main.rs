use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use earnings_screener::analysis::strategies::{all_strategies, find_strategy, TargetList};
use earnings_screener::analysis::{OverbuyScreen, ScreeningEngine, StrategyHits, TagFilter, TraceLog};
use earnings_screener::database::DatabaseManager;
use earnings_screener::import;
use earnings_screener::models::{Config, ThresholdProfile, Thresholds};
use earnings_screener::utils::resolve_as_of;
use earnings_screener::watchlist::{
    load_blacklist, merge_release_lists, parse_release_file, publish_filter_list, write_symbol_list, OutputPaths,
    Panel, TagIndex,
};

/// Earnings-driven stock screener
#[derive(Parser)]
#[command(name = "earnings-screener")]
#[command(version)]
#[command(about = "Screen stocks around their earnings dates and maintain watch lists")]
#[command(long_about = "
Reads daily closes, earnings dates and fundamentals from a local SQLite store
and runs the earnings-season, momentum and overbuy screens over them. Results
go to panel groups and plain symbol lists under the output directory.

Examples:
  earnings-screener import prices prices.csv
  earnings-screener season --release Earnings_Release_next.txt --as-of 2024-07-19
  earnings-screener momentum --trace HPE
  earnings-screener overbuy --blacklist-tag gold
")]
struct Cli {
    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Panel JSON file (overrides PANEL_PATH)
    #[arg(long, global = true)]
    panel: Option<PathBuf>,

    /// Blacklist JSON file (overrides BLACKLIST_PATH)
    #[arg(long, global = true)]
    blacklist: Option<PathBuf>,

    /// Symbol tag JSON file (overrides TAGS_PATH)
    #[arg(long, global = true)]
    tags: Option<PathBuf>,

    /// Threshold profile JSON (overrides SCREENER_PROFILE)
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Directory for symbol list outputs (overrides OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load market data into the database
    Import {
        #[command(subcommand)]
        kind: ImportKind,
    },
    /// Earnings-season screen: Next_Week and Notification lists
    Season {
        /// Upcoming-earnings release file, may be repeated
        #[arg(long = "release")]
        release: Vec<PathBuf>,
        /// Replay date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<String>,
        /// Explain every step for one symbol
        #[arg(long)]
        trace: Option<String>,
        /// Print results without writing any file
        #[arg(long)]
        dry_run: bool,
    },
    /// Off-season momentum screen: Earning_Filter list
    Momentum {
        #[arg(long)]
        as_of: Option<String>,
        #[arg(long)]
        trace: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Post-earnings overbuy screen: Short and Short_Shift lists
    Overbuy {
        /// Symbols to check, one per line; defaults to every known symbol
        #[arg(long)]
        symbols: Option<PathBuf>,
        #[arg(long)]
        as_of: Option<String>,
        /// Only keep symbols carrying one of these tags
        #[arg(long = "whitelist")]
        whitelist: Vec<String>,
        /// Drop symbols carrying one of these tags (ignored with --whitelist)
        #[arg(long = "blacklist-tag")]
        blacklist_tags: Vec<String>,
        #[arg(long)]
        trace: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// List the registered strategies and the active thresholds
    Strategies {
        /// Show only this strategy
        name: Option<String>,
    },
    /// Show database statistics
    Stats,
}

#[derive(Subcommand)]
enum ImportKind {
    /// CSV with symbol,date,close,volume
    Prices { file: PathBuf },
    /// CSV with symbol,date,change_pct
    Earnings { file: PathBuf },
    /// CSV with symbol,sector,pe_ratio,market_cap
    Stocks { file: PathBuf },
    /// JSON object of sector -> symbols
    Sectors { file: PathBuf },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("earnings_screener=info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Config {
    let mut config = Config::from_env();
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    if let Some(panel) = &cli.panel {
        config.panel_path = panel.clone();
    }
    if let Some(blacklist) = &cli.blacklist {
        config.blacklist_path = blacklist.clone();
    }
    if let Some(tags) = &cli.tags {
        config.tags_path = Some(tags.clone());
    }
    if let Some(profile) = &cli.profile {
        config.profile_path = Some(profile.clone());
    }
    if let Some(output_dir) = &cli.output_dir {
        config.output_dir = output_dir.clone();
    }
    config
}

fn load_thresholds(config: &Config) -> Result<Thresholds> {
    match &config.profile_path {
        Some(path) => {
            let profile = ThresholdProfile::load(path)?;
            info!(
                "Using threshold profile {} ({})",
                path.display(),
                profile.name.as_deref().unwrap_or("unnamed")
            );
            Ok(profile.into_thresholds())
        }
        None => Ok(Thresholds::default()),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli);
    let thresholds = load_thresholds(&config)?;

    match cli.command {
        Commands::Import { kind } => run_import(&config, kind).await,
        Commands::Season {
            release,
            as_of,
            trace,
            dry_run,
        } => run_season(&config, &thresholds, &release, as_of.as_deref(), trace, dry_run).await,
        Commands::Momentum { as_of, trace, dry_run } => {
            run_momentum(&config, &thresholds, as_of.as_deref(), trace, dry_run).await
        }
        Commands::Overbuy {
            symbols,
            as_of,
            whitelist,
            blacklist_tags,
            trace,
            dry_run,
        } => {
            let filter = TagFilter {
                whitelist,
                blacklist: blacklist_tags,
            };
            run_overbuy(&config, &thresholds, symbols, as_of.as_deref(), filter, trace, dry_run).await
        }
        Commands::Strategies { name } => print_strategies(&thresholds, name.as_deref()),
        Commands::Stats => print_stats(&config).await,
    }
}

async fn run_import(config: &Config, kind: ImportKind) -> Result<()> {
    let db = DatabaseManager::new(&config.database_path).await?;
    let (label, stats) = match kind {
        ImportKind::Prices { file } => ("price bars", import::import_prices(&db, &file).await?),
        ImportKind::Earnings { file } => ("earnings records", import::import_earnings(&db, &file).await?),
        ImportKind::Stocks { file } => ("stocks", import::import_stocks(&db, &file).await?),
        ImportKind::Sectors { file } => ("sector assignments", import::import_sectors(&db, &file).await?),
    };
    println!("✅ Imported {} {} ({} rows read)", stats.rows_written, label, stats.rows_read);
    Ok(())
}

fn print_hits(hits: &[StrategyHits]) {
    for hit in hits {
        println!("  📋 {:<24} -> {:<14} {} hits", hit.strategy, hit.list.to_string(), hit.symbols.len());
    }
}

fn print_trace(trace: &TraceLog) {
    let Some(target) = trace.target() else {
        return;
    };
    let lines = trace.lines();
    if lines.is_empty() {
        println!("\n🔍 Trace: {} was not part of this run", target);
        return;
    }
    println!("\n🔍 Trace for {}:", target);
    for line in &lines {
        println!("   {}", line);
    }
}

async fn run_season(
    config: &Config,
    thresholds: &Thresholds,
    release_files: &[PathBuf],
    as_of: Option<&str>,
    trace: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let as_of = resolve_as_of(as_of)?;
    let mut lists = Vec::new();
    for path in release_files {
        let symbols = parse_release_file(path)?;
        println!("📄 {}: {} symbols", path.display(), symbols.len());
        lists.push(symbols);
    }
    let release = merge_release_lists(&lists);

    let db = DatabaseManager::new(&config.database_path).await?;
    let trace = TraceLog::new(trace);
    let engine = ScreeningEngine::new(&db, thresholds).with_blacklist(load_blacklist(&config.blacklist_path));

    println!("📊 Earnings-season screen as of {}", as_of);
    let report = engine.run_season(&release, as_of, &trace).await?;

    println!("  🔎 {} symbols screened, {} skipped", report.universe_size, report.skipped.len());
    print_hits(&report.hits);
    println!("\n✅ {}: {:?}", TargetList::NextWeek, report.next_week.kept);
    println!("✅ {}: {:?}", TargetList::Notification, report.notification.kept);
    print_trace(&trace);

    if dry_run {
        println!("\n⏩ Dry run, nothing written");
        return Ok(());
    }

    let mut panel = Panel::load(&config.panel_path)?;
    panel.set_group(TargetList::NextWeek.group_name(), &report.next_week.kept);
    panel.set_group(TargetList::Notification.group_name(), &report.notification.kept);
    panel.save(&config.panel_path)?;

    let paths = OutputPaths::new(&config.output_dir);
    write_symbol_list(&paths.next_week_backup(), &report.next_week.kept)?;
    write_symbol_list(&paths.notification_backup(), &report.notification.kept)?;
    println!("💾 Panel {} and lists under {} updated", config.panel_path.display(), config.output_dir.display());
    Ok(())
}

async fn run_momentum(
    config: &Config,
    thresholds: &Thresholds,
    as_of: Option<&str>,
    trace: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let as_of = resolve_as_of(as_of)?;
    let db = DatabaseManager::new(&config.database_path).await?;
    let trace = TraceLog::new(trace);

    let mut panel = Panel::load(&config.panel_path)?;
    let excluded: HashSet<String> = [TargetList::NextWeek, TargetList::Notification]
        .iter()
        .flat_map(|list| panel.group_members(list.group_name()))
        .collect();

    let engine = ScreeningEngine::new(&db, thresholds).with_blacklist(load_blacklist(&config.blacklist_path));

    println!("📊 Momentum screen as of {}", as_of);
    let report = engine.run_momentum(as_of, &excluded, &trace).await?;

    println!("  🔎 {} symbols screened, {} skipped", report.universe_size, report.skipped.len());
    print_hits(&report.hits);
    println!("\n✅ {}: {:?}", TargetList::EarningFilter, report.earning_filter.kept);
    print_trace(&trace);

    if dry_run {
        println!("\n⏩ Dry run, nothing written");
        return Ok(());
    }

    panel.set_group(TargetList::EarningFilter.group_name(), &report.earning_filter.kept);
    panel.save(&config.panel_path)?;

    let paths = OutputPaths::new(&config.output_dir);
    let qualified = report.earning_filter.qualified();
    publish_filter_list(
        &paths.filter_news(),
        &paths.filter_backup(),
        &report.earning_filter.kept,
        &qualified,
    )?;
    if report.earning_filter.kept.is_empty() {
        println!("💾 Nothing qualified, {} removed", paths.filter_news().display());
    } else {
        println!(
            "💾 {} symbols written to {}",
            report.earning_filter.kept.len(),
            paths.filter_news().display()
        );
    }
    println!("💾 {} qualified symbols backed up to {}", qualified.len(), paths.filter_backup().display());
    Ok(())
}

async fn run_overbuy(
    config: &Config,
    thresholds: &Thresholds,
    symbols_file: Option<PathBuf>,
    as_of: Option<&str>,
    filter: TagFilter,
    trace: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let as_of = resolve_as_of(as_of)?;
    let db = DatabaseManager::new(&config.database_path).await?;
    let trace = TraceLog::new(trace);

    let symbols = match &symbols_file {
        Some(path) => parse_release_file(path)?,
        None => db.all_symbols().await?,
    };
    let tags = match &config.tags_path {
        Some(path) => TagIndex::load(path)?,
        None => TagIndex::default(),
    };

    println!("📊 Overbuy screen over {} symbols as of {}", symbols.len(), as_of);
    let report = OverbuyScreen::new(&db, thresholds)
        .run(&symbols, as_of, &tags, &filter, &trace)
        .await?;

    for line in report.lines() {
        println!("  {}", line);
    }
    println!("\n✅ Short: {:?}", report.short());
    println!("✅ Short_Shift: {:?}", report.short_shift());
    print_trace(&trace);

    if dry_run {
        println!("\n⏩ Dry run, nothing written");
        return Ok(());
    }

    let mut panel = Panel::load(&config.panel_path)?;
    panel.set_group("Short", &report.short());
    panel.set_group("Short_Shift", &report.short_shift());
    panel.save(&config.panel_path)?;

    let paths = OutputPaths::new(&config.output_dir);
    write_symbol_list(&paths.overbuy(), &report.lines())?;
    println!("💾 {} candidates written to {}", report.rows.len(), paths.overbuy().display());
    Ok(())
}

fn print_strategies(thresholds: &Thresholds, name: Option<&str>) -> Result<()> {
    let defs = match name {
        Some(name) => vec![find_strategy(name)?],
        None => all_strategies(),
    };
    println!("📋 Registered strategies:");
    for def in defs {
        println!("  {:<24} {:<14} {}", def.name, def.list.to_string(), def.description);
    }
    println!("\n⚙️  Active thresholds:");
    println!("{}", serde_json::to_string_pretty(thresholds)?);
    Ok(())
}

async fn print_stats(config: &Config) -> Result<()> {
    let db = DatabaseManager::new(&config.database_path).await?;
    let stats = db.get_stats().await?;
    println!("📊 Database: {}", config.database_path);
    println!("  Symbols:        {}", stats.total_symbols);
    println!("  Price bars:     {}", stats.total_price_bars);
    println!("  Earnings:       {}", stats.total_earnings);
    match stats.latest_price_date {
        Some(date) => println!("  Latest close:   {}", date),
        None => println!("  Latest close:   none"),
    }
    Ok(())
}
