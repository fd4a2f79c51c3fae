mod analyze_safety;
mod dataset;
mod plot;
mod stats;

use std::env;
use std::path::PathBuf;

pub struct AnalyzeOptions {
    pub csv_path: String,     // default data/drug_safety.csv
    pub figs_dir: PathBuf,    // default docs
    pub results_dir: PathBuf, // default results
    pub make_plot: bool,      // default true
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions {
            csv_path: "data/drug_safety.csv".to_string(),
            figs_dir: PathBuf::from("docs"),
            results_dir: PathBuf::from("results"),
            make_plot: true,
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "help" || a == "-h" || a == "--help") {
        print_usage();
        return;
    }

    let opts = parse_options(&args);
    if let Err(e) = analyze_safety::run_cli(&opts) {
        eprintln!("Error: {}", e);
    }
}

fn parse_options(args: &[String]) -> AnalyzeOptions {
    let mut opts = AnalyzeOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--figs-dir" | "-f" => {
                if i + 1 < args.len() {
                    opts.figs_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--results-dir" | "-r" => {
                if i + 1 < args.len() {
                    opts.results_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--no-plot" => {
                opts.make_plot = false;
            }
            other if !other.starts_with('-') => {
                opts.csv_path = other.to_string();
            }
            _ => {}
        }
        i += 1;
    }
    opts
}

fn print_usage() {
    println!("drug-safety: hypothesis tests for clinical drug safety data");
    println!();
    println!("USAGE:");
    println!("  drug-safety [file.csv] [options]");
    println!();
    println!("OPTIONS:");
    println!("  -f, --figs-dir <dir>     Directory for the age histogram (default: docs)");
    println!("  -r, --results-dir <dir>  Directory for the report (default: results)");
    println!("  --no-plot                Skip histogram generation");
    println!();
    println!("CSV FORMAT:");
    println!("  trx,adverse_effects,num_effects,age");
    println!("  trx: Drug | Placebo");
    println!("  adverse_effects: yes/no (yes, true, 1 are truthy)");
    println!();
    println!("EXAMPLES:");
    println!("  drug-safety                        Analyze data/drug_safety.csv");
    println!("  drug-safety trial.csv --no-plot");
}
