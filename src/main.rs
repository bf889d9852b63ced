use anyhow::Context;
use clap::Parser;
use hamlcop_lib::analyzer::{AutocorrectMode, ExternalToolAnalyzer};
use hamlcop_lib::config::Config;
use hamlcop_lib::exit_codes;
use hamlcop_lib::session::SessionOptions;
use std::path::PathBuf;
use std::sync::Arc;

mod file_processor;
mod formatter;

use formatter::TextFormatter;

#[derive(Parser, Debug)]
#[command(
    name = "hamlcop",
    author,
    version,
    about = "Runs a Ruby analyzer over the code embedded in HAML templates"
)]
struct Cli {
    /// HAML files to lint
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Apply the analyzer's safe corrections
    #[arg(short = 'a', long, conflicts_with = "autocorrect_all")]
    autocorrect: bool,

    /// Apply all of the analyzer's corrections, unsafe ones included
    #[arg(short = 'A', long)]
    autocorrect_all: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode: no summary line
    #[arg(short, long)]
    quiet: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

impl Cli {
    fn autocorrect_mode(&self) -> Option<AutocorrectMode> {
        if self.autocorrect_all {
            Some(AutocorrectMode::All)
        } else if self.autocorrect {
            Some(AutocorrectMode::Safe)
        } else {
            None
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_codes::exit::tool_error();
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let (config, config_path) = Config::load(cli.config.as_deref(), &cwd)?;
    if let Some(path) = &config_path {
        log::debug!("Using configuration from {}", path.display());
    }

    let analyzer = ExternalToolAnalyzer::new(config.analyzer.command.clone(), Arc::new(config.analyzer.config_store()))
        .with_ignored_autocorrect_rules(config.analyzer.ignored_autocorrect_rules.clone());
    let options = SessionOptions {
        autocorrect: cli.autocorrect_mode(),
        ignored_rules: config.analyzer.ignored_rules.clone(),
    };

    let outcomes = file_processor::process_files(&cli.files, &analyzer, &options, config.debug);

    let formatter = TextFormatter::new(!cli.no_color);
    let mut total_lints = 0;
    let mut total_corrected = 0;
    let mut failed = false;
    for outcome in &outcomes {
        let path = outcome.path.display().to_string();
        match &outcome.result {
            Ok(report) => {
                for lint in &report.lints {
                    println!("{}", formatter.format_lint(&path, lint));
                }
                total_lints += report.lints.len();
                total_corrected += report.lints.iter().filter(|lint| lint.corrected).count();
                for skipped in &report.skipped {
                    log::debug!("{path}: {skipped}");
                }
                if outcome.written {
                    log::debug!("Wrote corrections to {path}");
                }
            }
            Err(e) => {
                eprintln!("{path}: {e:#}");
                failed = true;
            }
        }
    }

    if !cli.quiet {
        println!("\n{}", formatter.summary(outcomes.len(), total_lints, total_corrected));
    }

    Ok(if failed {
        exit_codes::TOOL_ERROR
    } else if total_lints > total_corrected {
        exit_codes::VIOLATIONS_FOUND
    } else {
        exit_codes::SUCCESS
    })
}
