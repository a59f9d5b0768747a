//! # Monthly return matrix for the configured watch list
//! quantbr returns --csv out/monthly_returns.csv
//!
//! # Benchmark comparison from the FMP API
//! FMP_API_KEY=... quantbr --remote compare
//!
//! # Cache price histories locally, then list the largest index members
//! FMP_API_KEY=... quantbr fetch
//! FMP_API_KEY=... quantbr companies --profile AAPL
//!
//! # Acquisition graph
//! quantbr build-graph
//! quantbr view --focus Facebook

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use quantbr_analytics::config::AppConfig;
use quantbr_analytics::data::{
    gdp_for_year, load_acquisitions, load_market_caps, load_state_gdp, load_ticker_names,
    load_ticker_sectors, write_bars, CsvPriceFeed, FmpClient, PriceFeed, TOP_CONSTITUENTS,
};
use quantbr_analytics::graph::{
    extract_view, resolve_acquisitions, write_resolved, CompanyGraph, CompanyGraphBuilder,
    ResolvedAcquisition, ALL_COMPANIES, DEFAULT_RADIUS,
};
use quantbr_analytics::metrics::{
    compare_against_benchmark, compute_monthly_returns, index_display_name, lookback_start,
};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "quantbr")]
#[command(about = "Market return analytics and acquisition graph builder")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of <SYMBOL>.csv price files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Fetch prices from the FMP API instead of local CSV files
    #[arg(long, global = true)]
    remote: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the monthly return matrix
    Returns {
        /// Comma-separated symbols (defaults to the configured watch list)
        #[arg(long)]
        symbols: Option<String>,

        /// Years of history
        #[arg(long)]
        years: Option<u32>,

        /// Write the matrix as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Keep only months where every symbol has a return
        #[arg(long)]
        dense: bool,

        /// Do not save the JSON matrix
        #[arg(long)]
        no_save: bool,
    },

    /// Download daily prices from the FMP API into the price directory
    Fetch {
        /// Comma-separated symbols (defaults to the watch list plus all indices)
        #[arg(long)]
        symbols: Option<String>,

        /// Years of history
        #[arg(long)]
        years: Option<u32>,
    },

    /// List the leading S&P 500 constituents from the FMP API
    Companies {
        /// Number of constituents to show
        #[arg(long, default_value_t = TOP_CONSTITUENTS)]
        limit: usize,

        /// Also print the profile of one symbol
        #[arg(long)]
        profile: Option<String>,
    },

    /// Compare the benchmark index against the comparison indices
    Compare {
        /// Benchmark symbol
        #[arg(long)]
        benchmark: Option<String>,

        /// Comma-separated comparison symbols
        #[arg(long)]
        indices: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
    },

    /// Resolve acquirers to tickers and write the resolved table
    Resolve {
        /// Output CSV path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build and save the acquisition graph
    BuildGraph {
        /// Output JSON path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the neighbourhood of one company
    View {
        /// Company name, or "All Companies"
        #[arg(long, default_value = ALL_COMPANIES)]
        focus: String,

        /// Hops around the focus company
        #[arg(long, default_value_t = DEFAULT_RADIUS)]
        radius: usize,

        /// Graph artifact to load
        #[arg(long)]
        graph: Option<PathBuf>,
    },

    /// Print state GDP for one year
    Gdp {
        #[arg(long, default_value_t = 2023)]
        year: i32,
    },
}

fn split_symbols(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn make_feed(config: &AppConfig, remote: bool) -> Result<Box<dyn PriceFeed>> {
    if remote {
        let client = FmpClient::new(&config.feed).context("Failed to create FMP client (is FMP_API_KEY set?)")?;
        Ok(Box::new(client))
    } else {
        Ok(Box::new(CsvPriceFeed::new(&config.paths.price_dir)))
    }
}

fn load_resolved(config: &AppConfig) -> Result<Vec<ResolvedAcquisition>> {
    let paths = &config.paths;
    let acquisitions = load_acquisitions(&paths.acquisitions)
        .with_context(|| format!("Failed to read {}", paths.acquisitions.display()))?;
    let names = load_ticker_names(&paths.ticker_to_name)
        .with_context(|| format!("Failed to read {}", paths.ticker_to_name.display()))?;
    let sectors = load_ticker_sectors(&paths.ticker_to_sector)
        .with_context(|| format!("Failed to read {}", paths.ticker_to_sector.display()))?;

    Ok(resolve_acquisitions(&acquisitions, &names, &sectors))
}

fn cmd_returns(
    config: &AppConfig,
    remote: bool,
    symbols: Option<String>,
    years: Option<u32>,
    csv: Option<PathBuf>,
    dense: bool,
    no_save: bool,
) -> Result<()> {
    let feed = make_feed(config, remote)?;
    let symbols = symbols.map(|s| split_symbols(&s)).unwrap_or_else(|| config.symbols.clone());
    let years = years.unwrap_or(config.lookback_years);
    let today = Utc::now().date_naive();

    let mut matrix = compute_monthly_returns(feed.as_ref(), &symbols, years, today);
    if dense {
        matrix = matrix.dense();
    }

    println!("{}", SEPARATOR);
    println!("MONTHLY RETURNS ({} years, {})", years, feed.provider());
    println!("{}", SEPARATOR);

    if matrix.is_empty() {
        println!("No data available");
    } else {
        println!("Symbols: {}", matrix.symbols().join(", "));
        if let (Some(first), Some(last)) = (matrix.months().first(), matrix.months().last()) {
            println!("Months:  {} ({} to {})", matrix.months().len(), first, last);
        }
    }
    for dropped in matrix.dropped() {
        println!("  dropped {}: {}", dropped.symbol, dropped.reason);
    }

    if !no_save {
        let path = &config.paths.return_matrix;
        matrix
            .save(path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        info!("Saved return matrix to {}", path.display());
    }

    if let Some(path) = csv {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        matrix.write_csv(file)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

fn cmd_fetch(config: &AppConfig, symbols: Option<String>, years: Option<u32>) -> Result<()> {
    let client = FmpClient::new(&config.feed).context("Failed to create FMP client (is FMP_API_KEY set?)")?;
    let symbols = symbols.map(|s| split_symbols(&s)).unwrap_or_else(|| {
        let mut all = config.symbols.clone();
        all.push(config.benchmark.clone());
        all.extend(config.comparison_indices.iter().cloned());
        let mut seen = HashSet::new();
        all.retain(|s| seen.insert(s.clone()));
        all
    });
    let start = lookback_start(Utc::now().date_naive(), years.unwrap_or(config.lookback_years));
    let price_dir = &config.paths.price_dir;

    let mut saved = 0usize;
    for symbol in &symbols {
        match client.historical_prices(symbol, start) {
            Ok(bars) if bars.is_empty() => warn!("No prices for {} since {}", symbol, start),
            Ok(bars) => {
                let path = price_dir.join(format!("{}.csv", symbol));
                write_bars(&path, &bars).with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Saved {} bars for {} to {}", bars.len(), symbol, path.display());
                saved += 1;
            }
            Err(e) => warn!("Failed to fetch {}: {}", symbol, e),
        }
    }

    println!(
        "Saved {} of {} symbols to {} ({} API requests)",
        saved,
        symbols.len(),
        price_dir.display(),
        client.request_count()
    );
    Ok(())
}

fn cmd_companies(config: &AppConfig, limit: usize, profile: Option<String>) -> Result<()> {
    let client = FmpClient::new(&config.feed).context("Failed to create FMP client (is FMP_API_KEY set?)")?;
    let constituents = client
        .top_constituents(limit)
        .context("Failed to fetch S&P 500 constituents")?;

    println!("{}", SEPARATOR);
    println!("S&P 500 CONSTITUENTS (first {})", constituents.len());
    println!("{}", SEPARATOR);
    for company in &constituents {
        println!(
            "{:<8} {:<40} {}",
            company.symbol,
            company.name,
            company.sector.as_deref().unwrap_or("-")
        );
    }

    if let Some(symbol) = profile {
        let profile = client
            .company_profile(&symbol)
            .with_context(|| format!("Failed to fetch profile for {}", symbol))?;
        println!("\n{}", SEPARATOR);
        println!("PROFILE {}", profile.symbol);
        println!("{}", SEPARATOR);
        println!("Name:       {}", profile.company_name.as_deref().unwrap_or("-"));
        println!("Exchange:   {}", profile.exchange_short_name.as_deref().unwrap_or("-"));
        println!("Sector:     {}", profile.sector.as_deref().unwrap_or("-"));
        println!("Industry:   {}", profile.industry.as_deref().unwrap_or("-"));
        println!("CEO:        {}", profile.ceo.as_deref().unwrap_or("-"));
        if let Some(cap) = profile.market_cap() {
            println!("Market cap: {}", cap);
        }
        if let Some(price) = profile.price {
            println!("Price:      {:.2}", price);
        }
        if let Some(website) = profile.website.as_deref() {
            println!("Website:    {}", website);
        }
    }

    info!("FMP requests made: {}", client.request_count());
    Ok(())
}

fn cmd_compare(
    config: &AppConfig,
    remote: bool,
    benchmark: Option<String>,
    indices: Option<String>,
    start: Option<String>,
) -> Result<()> {
    let feed = make_feed(config, remote)?;
    let benchmark = benchmark.unwrap_or_else(|| config.benchmark.clone());
    let indices = indices
        .map(|s| split_symbols(&s))
        .unwrap_or_else(|| config.comparison_indices.clone());
    let start = match start {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").context("Invalid start date format")?,
        None => lookback_start(Utc::now().date_naive(), config.lookback_years),
    };

    let comparison = compare_against_benchmark(feed.as_ref(), &benchmark, &indices, start)
        .with_context(|| format!("Failed to load benchmark {}", benchmark))?;

    for pair in &comparison.pairs {
        println!("\n{}", SEPARATOR);
        println!("{}", pair.summary());
    }
    for dropped in &comparison.dropped {
        println!(
            "\nSkipped {}: {}",
            index_display_name(&dropped.symbol),
            dropped.reason
        );
    }
    println!("{}", SEPARATOR);

    Ok(())
}

fn cmd_resolve(config: &AppConfig, output: Option<PathBuf>) -> Result<()> {
    let resolved = load_resolved(config)?;
    let path = output.unwrap_or_else(|| config.paths.resolved_acquisitions.clone());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_resolved(file, &resolved)?;

    println!("Wrote {} resolved acquisitions to {}", resolved.len(), path.display());
    Ok(())
}

fn cmd_build_graph(config: &AppConfig, output: Option<PathBuf>) -> Result<()> {
    let resolved = load_resolved(config)?;
    let market_caps = load_market_caps(&config.paths.market_data)
        .with_context(|| format!("Failed to read {}", config.paths.market_data.display()))?;

    let mut builder = CompanyGraphBuilder::new().with_market_caps(&market_caps);
    builder.extend(&resolved);
    let graph = builder.build();

    let path = output.unwrap_or_else(|| config.paths.company_graph.clone());
    graph
        .save(&path)
        .with_context(|| format!("Failed to save {}", path.display()))?;

    println!(
        "Saved graph with {} companies and {} acquisitions to {}",
        graph.node_count(),
        graph.edge_count(),
        path.display()
    );
    Ok(())
}

fn cmd_view(config: &AppConfig, focus: &str, radius: usize, graph: Option<PathBuf>) -> Result<()> {
    let path = graph.unwrap_or_else(|| config.paths.company_graph.clone());
    let graph = CompanyGraph::load(&path)
        .with_context(|| format!("Failed to load graph {}", path.display()))?;

    let view = extract_view(&graph, focus, radius);

    println!("{}", SEPARATOR);
    println!("{} (radius {})", focus, radius);
    println!("{}", SEPARATOR);

    if view.is_empty() {
        println!("No data available");
        return Ok(());
    }

    for node in view.nodes() {
        let ticker = node.ticker.as_deref().unwrap_or("-");
        println!("{:<40} {:<8} {}", node.name, ticker, node.industry);
    }
    println!();
    for (source, target) in view.edges() {
        println!("{} -> {}", source, target);
    }
    println!("\nIndustries: {}", view.industries().join(", "));

    Ok(())
}

fn cmd_gdp(config: &AppConfig, year: i32) -> Result<()> {
    let path = &config.paths.state_gdp;
    let rows = load_state_gdp(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let Some(snapshot) = gdp_for_year(&rows, year) else {
        println!("No data available for {}", year);
        return Ok(());
    };

    println!("{}", SEPARATOR);
    let bound = |v: Option<f64>| v.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "n/a".to_string());
    println!(
        "STATE GDP {} (scale {} to {})",
        snapshot.year,
        bound(snapshot.min_gdp),
        bound(snapshot.max_gdp)
    );
    println!("{}", SEPARATOR);
    for row in &snapshot.rows {
        let gdp = row
            .gdp
            .map(|v| format!("{:.0}", v))
            .unwrap_or_else(|| "n/a".to_string());
        println!("{:<4} {:<24} {:>14}", row.state, row.geo_name, gdp);
    }

    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quantbr_analytics=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = cli.data_dir {
        config.paths.price_dir = dir;
    }

    match cli.command {
        Commands::Returns {
            symbols,
            years,
            csv,
            dense,
            no_save,
        } => cmd_returns(&config, cli.remote, symbols, years, csv, dense, no_save)?,
        Commands::Fetch { symbols, years } => cmd_fetch(&config, symbols, years)?,
        Commands::Companies { limit, profile } => cmd_companies(&config, limit, profile)?,
        Commands::Compare {
            benchmark,
            indices,
            start,
        } => cmd_compare(&config, cli.remote, benchmark, indices, start)?,
        Commands::Resolve { output } => cmd_resolve(&config, output)?,
        Commands::BuildGraph { output } => cmd_build_graph(&config, output)?,
        Commands::View { focus, radius, graph } => cmd_view(&config, &focus, radius, graph)?,
        Commands::Gdp { year } => cmd_gdp(&config, year)?,
    }

    Ok(())
}
