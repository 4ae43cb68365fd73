use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

use retrofit_cli::export::export_run;
use retrofit_cli::load_scenario;
use retrofit_cli::summary::render_summary;
use retrofit_core::runner::run;

#[derive(Parser)]
#[command(
    name = "retrofit-sim",
    about = "Discrete-event simulator for pop-up DAC retrofit workshops",
    long_about = "Runs a retrofit workshop scenario from a JSON file and writes\n\
                  the result tables (events, wagon journeys, workshop metrics,\n\
                  locomotive utilization, track capacity, rejections) as CSV."
)]
struct Cli {
    /// Scenario JSON file
    scenario: PathBuf,
    /// Directory for the CSV result tables
    #[arg(long, default_value = "results")]
    output: PathBuf,
    /// Override the simulated horizon (minutes from scenario start)
    #[arg(long)]
    horizon_min: Option<f64>,
    /// Suppress the run summary on stdout
    #[arg(long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut scenario = match load_scenario(&cli.scenario) {
        Ok(scenario) => scenario,
        Err(err) => {
            eprintln!("error: {err}");
            exit(2);
        }
    };
    if let Some(horizon_min) = cli.horizon_min {
        scenario.end_time = scenario.start_time + horizon_min;
    }

    let result = match run(&scenario) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("error: invalid scenario: {err}");
            exit(2);
        }
    };

    // Export whatever was recorded, even for an aborted run: the log is
    // complete up to the failure.
    if let Err(err) = export_run(&result, &cli.output) {
        eprintln!("error: export failed: {err}");
        exit(2);
    }

    if !cli.quiet {
        print!("{}", render_summary(&result));
        println!("results written to {}", cli.output.display());
    }

    if let Some(cause) = &result.final_state.aborted {
        eprintln!("error: simulation aborted: {cause}");
        exit(1);
    }
}
