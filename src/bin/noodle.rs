//! USD dependency report CLI.
//!
//! Walks one or more root layers and reports every file, material, variant set
//! and clip sequence they depend on, marking what is missing from disk.
//!
//! Directories are searched for USD files; each one is walked as its own root,
//! in parallel.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use walkdir::WalkDir;

use usd_noodle::{export, DefaultResolver, DependencyGraph, DependencyWalker, FileLayerSource, WalkOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
    Dot,
}

/// Map the dependencies of USD assets.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root layers, or directories to search for USD files.
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// Follow `asset` attributes (textures, materials and other files).
    #[arg(long, short = 'a')]
    attributes: bool,

    /// Re-open layers every time instead of caching them for the walk.
    #[arg(long)]
    no_cache: bool,

    /// Directory searched for bare asset names (can be specified multiple times).
    #[arg(long = "search-path", short = 'I', value_name = "DIR")]
    search_paths: Vec<PathBuf>,

    /// Output format.
    #[arg(long, short = 'f', value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Only list offline nodes (text output).
    #[arg(long)]
    offline_only: bool,

    /// Only list nodes whose file name contains this pattern (text output).
    #[arg(long, value_name = "PATTERN")]
    find: Option<String>,

    /// Exit with status 1 when any layer failed to open.
    #[arg(long)]
    fail_on_errors: bool,

    /// Skip files matching these patterns in directories (can be specified multiple times).
    #[arg(long = "skip", short = 'x')]
    skip_patterns: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(long, short = 'v', action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn should_skip(path: &Path, patterns: &[String]) -> bool {
    let path_str = path.to_string_lossy();
    patterns.iter().any(|p| path_str.contains(p))
}

/// Text and package layers; binary `.usdc` files cannot be walked.
fn is_walkable(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(ext.to_lowercase().as_str(), "usda" | "usd" | "usdz")
}

fn collect_roots(paths: &[PathBuf], skip_patterns: &[String]) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .filter(|p| is_walkable(p))
                .filter(|p| !should_skip(p, skip_patterns))
                .collect();
            found.sort();
            roots.extend(found);
        } else if !should_skip(path, skip_patterns) {
            roots.push(path.clone());
        }
    }
    roots
}

fn walk(root: &Path, args: &Args) -> DependencyGraph {
    let resolver = args
        .search_paths
        .iter()
        .fold(DefaultResolver::from_env(), |resolver, dir| resolver.with_search_path(dir));
    let options = WalkOptions::new()
        .walk_attributes(args.attributes)
        .cache_layers(!args.no_cache);

    let mut walker =
        DependencyWalker::new(root.to_string_lossy(), FileLayerSource::new(), resolver).with_options(options);
    walker.start();
    walker.into_graph()
}

fn walk_all(roots: &[PathBuf], args: &Args) -> Result<Vec<DependencyGraph>> {
    if roots.len() == 1 {
        return Ok(vec![walk(&roots[0], args)]);
    }

    let progress = ProgressBar::new(roots.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let graphs = roots
        .par_iter()
        .map(|root| {
            let graph = walk(root, args);
            progress.inc(1);
            graph
        })
        .collect();

    progress.finish_and_clear();
    Ok(graphs)
}

fn status(record: &usd_noodle::NodeRecord) -> &'static str {
    if record.errored {
        "ERROR"
    } else if record.online {
        "ONLINE"
    } else {
        "OFFLINE"
    }
}

fn print_text(root: &Path, graph: &DependencyGraph, args: &Args) {
    println!("================================================================================");
    println!("{}", root.display());
    println!("================================================================================");

    if graph.is_empty() {
        println!("Unable to open root layer");
        for path in graph.errored_paths() {
            println!("  [ERROR] {path}");
        }
        println!();
        return;
    }

    let matching: Option<Vec<&str>> = args.find.as_deref().map(|pattern| graph.find(pattern));
    let filtered = args.offline_only || matching.is_some();

    for (key, record) in graph.nodes() {
        if args.offline_only && record.online {
            continue;
        }
        if matching.as_ref().is_some_and(|keys| !keys.contains(&key)) {
            continue;
        }
        println!(
            "[{:<7}] {:<9} {} ({} incoming)",
            status(record),
            record.kind.as_str(),
            key,
            record.incoming_edge_count
        );
    }

    if !filtered && !graph.edges().is_empty() {
        println!();
        println!("Edges:");
        for edge in graph.edges() {
            println!("  {} -> {} [{}]", edge.source, edge.dest, edge.label);
        }
    }

    if !graph.cycles().is_empty() {
        println!();
        println!("Cycles:");
        for (from, to) in graph.cycles() {
            println!("  {from} -> {to}");
        }
    }

    println!();
    println!("Nodes:    {}", graph.node_count());
    println!("Edges:    {}", graph.edges().len());
    println!("Offline:  {}", graph.offline().len());
    println!("Errored:  {}", graph.errored_paths().len());
    println!();
}

fn run(args: &Args) -> Result<bool> {
    let roots = collect_roots(&args.paths, &args.skip_patterns);
    if roots.is_empty() {
        anyhow::bail!("No USD files found in: {:?}", args.paths);
    }

    let start = Instant::now();
    let graphs = walk_all(&roots, args)?;
    log::info!("Walked {} roots in {:.2?}", roots.len(), start.elapsed());

    match args.format {
        Format::Text => {
            for (root, graph) in roots.iter().zip(&graphs) {
                print_text(root, graph, args);
            }
        }
        Format::Json => {
            let output = if graphs.len() == 1 {
                export::to_json(&graphs[0])?
            } else {
                let values = graphs
                    .iter()
                    .map(export::to_json_value)
                    .collect::<serde_json::Result<Vec<_>>>()?;
                serde_json::to_string_pretty(&values)?
            };
            println!("{output}");
        }
        Format::Dot => {
            for graph in &graphs {
                print!("{}", export::to_dot(graph));
            }
        }
    }

    let errored = graphs.iter().any(|graph| !graph.errored_paths().is_empty());
    Ok(!(args.fail_on_errors && errored))
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
