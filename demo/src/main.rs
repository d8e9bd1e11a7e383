//! bastion directive runtime: demo CLI
//!
//! Runs one or all of the demo scenarios against schemas annotated with
//! `@hasPermissions` and `@range`, printing the GraphQL-style responses.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- --grant user:email mask-email
//!   cargo run -p demo -- --settings demo/bastion.toml --grant billing:read whole-object
//!   cargo run -p demo -- validate-input
//!   cargo run -p demo -- print-sdl

mod scenarios;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bastion_contracts::error::BastionResult;
use bastion_core::Settings;

use scenarios::Grant;

// ── CLI definition ────────────────────────────────────────────────────────────

/// bastion: declarative field authorization and input validation demo.
///
/// Each subcommand declares a small schema, runs a query as the caller given
/// by `--grant`, and prints the response.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "bastion directive runtime demo",
    long_about = "Runs bastion demo scenarios showing permission checks, masked fields,\n\
                  whole-object annotations and input validation."
)]
struct Cli {
    /// Settings file (TOML) with `verbosity` and `inheritance`.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Comma-separated permissions granted to the caller. Omit for a caller
    /// with no permission set at all.
    #[arg(long, global = true, value_delimiter = ',')]
    grant: Option<Vec<String>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Masked email (RESOLVER policy) next to a hidden field (THROW policy).
    MaskEmail,
    /// Object-level annotation with a field-level override.
    WholeObject,
    /// Range validation on arguments and input object fields.
    ValidateInput,
    /// Print the directive SDL a host adds to its type definitions.
    PrintSdl,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug to see directive compilation and enforcement.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = load_settings(cli.settings.as_deref()).and_then(|settings| {
        let granted = cli.grant.as_deref();
        match cli.command {
            Command::RunAll => run_all(&settings, granted),
            Command::MaskEmail => scenarios::mask_email(&settings, granted),
            Command::WholeObject => scenarios::whole_object(&settings, granted),
            Command::ValidateInput => scenarios::validate_input(&settings, granted),
            Command::PrintSdl => scenarios::print_sdl(&settings),
        }
    });

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_settings(path: Option<&Path>) -> BastionResult<Settings> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Ok(Settings::default()),
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_all(settings: &Settings, granted: Grant<'_>) -> BastionResult<()> {
    scenarios::mask_email(settings, granted)?;
    scenarios::whole_object(settings, granted)?;
    scenarios::validate_input(settings, granted)?;
    scenarios::print_sdl(settings)?;
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("bastion: Directive Runtime");
    println!("Authorization & Validation Demo");
    println!("===============================");
    println!();
    println!("Per field call:");
    println!("  [1] Arguments are coerced, then every annotated input value is checked");
    println!("  [2] Field and type annotations run in declared order");
    println!("  [3] THROW failures null the field and add an error; the resolver never runs");
    println!("  [4] RESOLVER failures reach the resolver through its resolve info");
    println!();
}
