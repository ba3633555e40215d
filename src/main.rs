use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use buildtrace::{match_tags, Analyzer, AnalyzerOptions, CommitFinderOutcome};

#[derive(Parser)]
#[command(name = "buildtrace")]
#[command(about = "Dataflow analysis of CI build pipelines")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a GitHub Actions workflow file
    Analyze {
        /// Workflow YAML file
        #[arg(long)]
        workflow: PathBuf,

        /// Repository checkout the workflow belongs to (for resolving
        /// scripts invoked by path)
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Output the fact report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a bash script in isolation
    Script {
        /// Script file
        path: PathBuf,

        /// Output the fact report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Match an artifact version against a list of tags
    MatchTags {
        /// Artifact name
        #[arg(long)]
        name: String,

        /// Artifact version
        #[arg(long)]
        version: String,

        /// File with one tag per line
        #[arg(long)]
        tags: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Analyze {
            workflow,
            repo,
            json,
        } => {
            let mut analyzer = Analyzer::new(AnalyzerOptions {
                repo_path: repo,
                ..Default::default()
            });
            match analyzer.analyze_workflow_file(&workflow) {
                Ok(report) => {
                    print_report(&report, json);
                    ExitCode::SUCCESS
                }
                Err(error) => {
                    eprintln!("error: {error}");
                    ExitCode::FAILURE
                }
            }
        }

        Command::Script { path, json } => {
            let mut analyzer = Analyzer::new(AnalyzerOptions::default());
            match analyzer.analyze_script_file(&path) {
                Ok(report) => {
                    print_report(&report, json);
                    ExitCode::SUCCESS
                }
                Err(error) => {
                    eprintln!("error: {error}");
                    ExitCode::FAILURE
                }
            }
        }

        Command::MatchTags {
            name,
            version,
            tags,
        } => {
            let content = match std::fs::read_to_string(&tags) {
                Ok(content) => content,
                Err(error) => {
                    eprintln!("error: cannot read {}: {error}", tags.display());
                    return ExitCode::FAILURE;
                }
            };
            let tag_list: Vec<&str> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
            let (matched, outcome) = match_tags(&tag_list, &name, &version);
            match outcome {
                CommitFinderOutcome::Matched => {
                    for tag in matched {
                        println!("{tag}");
                    }
                    ExitCode::SUCCESS
                }
                other => {
                    eprintln!("no match: {other:?}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn print_report(report: &buildtrace::FactReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{out}"),
            Err(error) => eprintln!("error: {error}"),
        }
        return;
    }
    let print_section = |title: &str, lines: &[String]| {
        if lines.is_empty() {
            return;
        }
        println!("{title}:");
        for line in lines {
            println!("  {line}");
        }
    };
    print_section("installed packages", &report.installed_packages);
    print_section("artifacts", &report.artifacts);
    print_section("releases", &report.releases);
    print_section("variables", &report.variables);
    print_section("environment", &report.env_vars);
    println!(
        "builds: {}  checkouts: {}  echoes: {}",
        report.maven_builds, report.checkouts, report.echoes
    );
}
