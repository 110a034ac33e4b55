//! covgen CLI - Generate a covering test suite from JSON configuration.

use std::fs;
use std::path::PathBuf;

use covgen::{
    CommandExecutor, SearchConfig, SearchEngine,
    compute::{catalog::Catalog, chromosome::render_module, coverage::MirAnalysis},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_config();
        return;
    }

    if args.len() < 4 {
        eprintln!("Usage: {} <config.json> <hir.json> <mir_dir> [output.rs]", args[0]);
        eprintln!();
        eprintln!("Generate unit tests for an instrumented crate.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to search configuration file");
        eprintln!("  hir.json     Callable and type catalog of the crate under test");
        eprintln!("  mir_dir      Directory of dependency graph files (mir*.json)");
        eprintln!("  output.rs    Where to write the final suite (default: covgen_tests.rs)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let output_path = PathBuf::from(args.get(4).map(String::as_str).unwrap_or("covgen_tests.rs"));

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: SearchConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    let catalog = Catalog::load(&args[2]).unwrap_or_else(|e| {
        eprintln!("Error loading catalog: {}", e);
        std::process::exit(1);
    });

    let analysis = MirAnalysis::load_dir(&args[3]).unwrap_or_else(|e| {
        eprintln!("Error loading dependency graphs: {}", e);
        std::process::exit(1);
    });

    println!("covgen Test Generation");
    println!("======================");
    println!("Crate: {}", catalog.name());
    println!("Callables: {}", catalog.callables().len());
    println!("Targets: {}", analysis.targets().len());
    println!("Algorithm: {:?}", config.algorithm);
    println!(
        "Population: {}, generations: {}",
        config.population.size, config.population.max_generations
    );
    println!();

    let output = config.output.clone();
    let executor = CommandExecutor::new(config.execution.clone(), config.output.clone());
    let mut engine = SearchEngine::new(config, catalog, analysis, executor).unwrap_or_else(|e| {
        eprintln!("Error creating search: {}", e);
        std::process::exit(1);
    });

    let result = engine
        .run_with_callback(|progress| {
            println!(
                "  Generation {}/{}: {}/{} targets ({:.1}%), {} active, archive {}",
                progress.generation,
                progress.max_generations,
                progress.covered_targets,
                progress.total_targets,
                progress.coverage,
                progress.active_targets,
                progress.archive_size
            );
        })
        .unwrap_or_else(|e| {
            eprintln!("Search failed: {}", e);
            std::process::exit(1);
        });

    if let Err(e) = fs::write(&output_path, render_module(&result.tests, &output)) {
        eprintln!("Error writing {}: {}", output_path.display(), e);
        std::process::exit(1);
    }

    let stats = &result.stats;
    println!();
    println!("Finished: {:?}", stats.stop_reason);
    println!(
        "  Coverage: {}/{} targets ({:.1}%)",
        stats.covered_targets, stats.total_targets, stats.coverage
    );
    println!("  Generations: {}", stats.generations);
    println!(
        "  Executions: {} ({} failed)",
        stats.total_executions, stats.failed_executions
    );
    println!("  Time: {:.2}s", stats.elapsed_seconds);
    println!("  Wrote {} tests to {}", result.tests.len(), output_path.display());
}

fn print_example_config() {
    let config = SearchConfig::default();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing config: {}", e),
    }
}
