use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(
    name = "ccmigrate",
    version,
    about = "Keep Claude Code project session folders in sync with moved project directories"
)]
struct Cli {
    /// Print the report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge moved projects' session folders and rewrite their cwd fields.
    ///
    /// Run with --apply only while Claude Code is stopped.
    Migrate(MigrateArgs),
    /// Print the project directory name for each path.
    Encode {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// List project folders whose recorded cwd no longer matches the disk.
    Drift,
    /// Summarize past apply runs and their audit logs.
    Runs,
    /// Show resolved paths, config and env overrides.
    Status,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Base move ledger CSV (src,dst,kind,reason).
    #[arg(long)]
    moves: Option<PathBuf>,

    /// Corrections ledger CSV; overrides --moves.
    #[arg(long)]
    corrections: Option<PathBuf>,

    /// Manual mapping for a moved directory; overrides both ledgers. Repeatable.
    #[arg(long, num_args = 2, value_names = ["SRC", "DST"])]
    pair: Vec<String>,

    /// Apply changes (default is dry-run).
    #[arg(long)]
    apply: bool,

    /// Move symlinks under the projects dir into a hidden archive dir.
    #[arg(long)]
    archive_project_symlinks: bool,
}

fn pairs_from_flat(values: &[String]) -> Vec<(String, String)> {
    values
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Migrate(args) => commands::migrate::run(&commands::migrate::MigrateOptions {
            moves: args.moves,
            corrections: args.corrections,
            pairs: pairs_from_flat(&args.pair),
            apply: args.apply,
            archive_project_symlinks: args.archive_project_symlinks,
        })?,
        Command::Encode { paths } => commands::encode::run(&paths)?,
        Command::Drift => commands::drift::run()?,
        Command::Runs => commands::runs::run()?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
