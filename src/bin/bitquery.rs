//! bitquery command line
//!
//! Usage:
//!   bitquery table.txt --where "a between 2 and 5" --select "a, b" --index a:equality
//!   bitquery table.txt --where "JOIN(a, b, 1)" --join merge --cross-check
//!
//! The table file holds a `name:type` header line followed by one row per
//! line; see `Dataset::load_text`.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use bitquery::{Dataset, IndexSpec, JoinAlgorithm, Query, QueryConfig, Result};

#[derive(Parser, Debug)]
#[command(name = "bitquery")]
#[command(about = "Bitmap-indexed selection and join queries over a text table")]
#[command(version)]
struct Args {
    /// Table file to load
    table: PathBuf,

    /// WHERE clause
    #[arg(short, long = "where")]
    predicate: Option<String>,

    /// Select clause
    #[arg(short, long)]
    select: Option<String>,

    /// Build an index, `column:kind` with kind equality, keywords, binned or binned=N
    #[arg(short, long)]
    index: Vec<String>,

    /// Print hit rows grouped by selected values
    #[arg(short, long)]
    bundles: bool,

    /// Count join pairs with this algorithm (loop, merge, index)
    #[arg(short, long)]
    join: Option<JoinAlgorithm>,

    /// Count join pairs with every algorithm and compare
    #[arg(long)]
    cross_check: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => QueryConfig::from_json_file(path)?,
        None => QueryConfig::default(),
    };
    let name = args
        .table
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("table")
        .to_string();
    let dataset = Arc::new(Dataset::load_text(&name, BufReader::new(File::open(&args.table)?))?);
    for spec in &args.index {
        let (column, kind) = spec.split_once(':').unwrap_or((spec.as_str(), "equality"));
        dataset.build_index(column, kind.parse::<IndexSpec>()?)?;
    }

    let query = Query::new("cli", config);
    query.set_dataset(Arc::clone(&dataset));
    if let Some(select) = &args.select {
        query.set_select_clause(select)?;
    }
    if let Some(predicate) = &args.predicate {
        query.set_where_clause(predicate)?;
    }

    query.estimate()?;
    if let Some((low, high)) = query.hit_count_bounds() {
        println!("estimate: {} .. {} hits", low, high);
    }
    let hits = query.evaluate(args.bundles)?;
    println!("hits: {} of {} rows", hits, dataset.nrows());

    if args.bundles {
        for bundle in query.bundles()? {
            let values: Vec<String> = bundle.values.iter().map(ToString::to_string).collect();
            println!("{}\t{}", values.join(", "), bundle.count());
        }
    }
    if let Some(algorithm) = args.join {
        println!("join pairs ({}): {}", algorithm, query.join_count(algorithm)?);
    }
    if args.cross_check {
        println!("join pairs (all algorithms agree): {}", query.cross_check_joins()?);
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
