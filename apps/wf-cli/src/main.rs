use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use wf_network::{Network, NetworkBuilder, TimeOptions};
use wf_results::{ReportStore, RunReport};
use wf_sim::{SimOptions, run_simulation};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "wf-cli")]
#[command(about = "Waterflow CLI - pressure-driven hydraulic network simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in demo network and print the report tables
    Demo {
        /// Simulation duration in hours (0 for a single-period run)
        #[arg(long, default_value_t = 24)]
        hours: u64,
        /// Directory to store the report JSON in (optional)
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
    /// Print a previously stored report
    Show {
        /// Directory the report was stored in
        store: PathBuf,
        /// Report name
        name: String,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Demo { hours, store } => cmd_demo(hours, store.as_deref()),
        Commands::Show { store, name } => cmd_show(&store, &name),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// A small gravity-fed system: one reservoir and one elevated tank
/// feeding two junctions, with a simple diurnal demand pattern.
fn demo_network(hours: u64) -> CliResult<Network> {
    let network = NetworkBuilder::new()
        .pattern("diurnal", vec![0.6, 0.8, 1.3, 1.4, 1.0, 0.7])
        .reservoir("source", 60.0)
        .tank("tower", 35.0, 4.0, 0.5, 8.0, 12.0)
        .junction("town", 5.0, 0.015, Some("diurnal"))
        .junction("hill", 25.0, 0.008, Some("diurnal"))
        .pipe("main", "source", "town", 2500.0, 0.35, 130.0)
        .pipe("feeder", "town", "hill", 1200.0, 0.2, 120.0)
        .pipe("tower-line", "tower", "hill", 600.0, 0.25, 125.0)
        .times(TimeOptions {
            duration: hours * 3600,
            ..Default::default()
        })
        .build()?;
    Ok(network)
}

fn cmd_demo(hours: u64, store: Option<&Path>) -> CliResult<()> {
    let network = demo_network(hours)?;
    let report = run_simulation(&network, &SimOptions::default())?;
    print_report(&report);

    if let Some(dir) = store {
        let store = ReportStore::new(dir.to_path_buf())?;
        store.save_report("demo", &report)?;
        println!("\nReport stored as '{}'", dir.join("demo.json").display());
    }
    Ok(())
}

fn cmd_show(store: &Path, name: &str) -> CliResult<()> {
    let store = ReportStore::new(store.to_path_buf())?;
    let report = store.load_report(name)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    for time_s in report.times() {
        println!("=== t = {}:{:02} h ===", time_s / 3600, (time_s % 3600) / 60);
        println!(
            "{:<12} {:>10} {:>10} {:>10} {:>12} {:>8}",
            "node", "head m", "press m", "demand", "consumption", "sat %"
        );
        for row in report.nodes_at(time_s) {
            println!(
                "{:<12} {:>10.3} {:>10.3} {:>10.5} {:>12.5} {:>8.1}",
                row.node_id,
                row.head_m,
                row.pressure_m,
                row.demand_m3_s,
                row.consumption_m3_s,
                row.percent_satisfied
            );
        }
        println!(
            "{:<12} {:>10} {:>10} {:>12} {:>10}",
            "link", "flow m3/s", "vel m/s", "headloss m", "f"
        );
        for row in report.links_at(time_s) {
            println!(
                "{:<12} {:>10.5} {:>10.3} {:>12.4} {:>10.4}",
                row.link_id, row.flow_m3_s, row.velocity_m_s, row.headloss_m, row.friction_factor
            );
        }
    }

    let diag = &report.diagnostics;
    println!(
        "\n{} hydraulic steps, success: {}, {:.3} s",
        diag.hydraulic_steps.len(),
        diag.success,
        diag.total_elapsed_s
    );
    for step in diag.degraded_steps() {
        println!("  degraded at t={}s: {}", step.time_s, step.messages.join("; "));
    }
}
