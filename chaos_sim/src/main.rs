//! Chaos Sensor Simulator CLI
//!
//! Run deterministic property scenarios against the chaos sensor.

use chaos_core::DEFAULT_SEED;
use chaos_sim::{ScenarioId, ScenarioResult, ScenarioRunner};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Chaos Sensor Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "chaos-sim")]
#[command(about = "Run deterministic simulation scenarios for the chaos sensor", long_about = None)]
struct Args {
    /// Sensor seed (default 42); any u64, including 0, is used as given
    #[arg(short, long, conflicts_with = "random_seed")]
    seed: Option<u64>,
    
    /// Seed from the system clock instead (the seed is logged)
    #[arg(long)]
    random_seed: bool,
    
    /// Scenario to run (determinism, range, fidelity, one_to_one, rapid_fire,
    /// concurrent_delivery, publish_failure, tick_delay, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,
    
    /// Ticks per scenario
    #[arg(short, long, default_value = "100")]
    ticks: usize,
    
    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    
    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

/// Picks the base seed: an explicit seed wins, then the clock if asked for.
fn resolve_seed(seed: Option<u64>, random: bool) -> u64 {
    match seed {
        Some(seed) => seed,
        None if random => std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .and_then(|d| u64::try_from(d.as_nanos()).ok())
            .unwrap_or(DEFAULT_SEED),
        None => DEFAULT_SEED,
    }
}

fn main() {
    let args = Args::parse();
    
    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    // Keep stdout clean for --json
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
    
    if !args.json {
        info!("Chaos Sensor Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
    
    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(2);
            }
        }
    };
    
    let base_seed = resolve_seed(args.seed, args.random_seed);
    if args.random_seed && !args.json {
        info!("Random base seed: {}", base_seed);
    }
    
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_ticks(args.ticks);
        
        for scenario in &scenarios {
            let result = runner.run(*scenario);
            
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED - {} ticks, {} readings",
                        scenario.name(), seed, result.total_ticks, result.total_readings);
                } else {
                    error!("✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            
            all_results.push(result);
        }
    }
    
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;
    
    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "readings": r.total_readings,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", summary);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            
            for result in all_results.iter().filter(|r| !r.passed) {
                error!("  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
    
    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_seed_zero_is_used_as_given() {
        let args = Args::parse_from(["chaos-sim", "--seed", "0"]);
        assert_eq!(args.seed, Some(0));
        assert_eq!(resolve_seed(args.seed, args.random_seed), 0);
    }
    
    #[test]
    fn test_default_seed() {
        let args = Args::parse_from(["chaos-sim"]);
        assert_eq!(resolve_seed(args.seed, args.random_seed), DEFAULT_SEED);
    }
    
    #[test]
    fn test_random_seed_conflicts_with_explicit_seed() {
        let result = Args::try_parse_from(["chaos-sim", "--seed", "7", "--random-seed"]);
        assert!(result.is_err());
    }
    
    #[test]
    fn test_explicit_seed_wins() {
        assert_eq!(resolve_seed(Some(u64::MAX), true), u64::MAX);
    }
}
