//! CLI command definitions and dispatch.

pub mod build_push;
pub mod refresh_suite;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use taintbox_common::constants::BIN_NAME;

/// Exit status when some case failed, was skipped, or was rejected.
pub const EXIT_CASE_FAILURES: u8 = 1;

/// Exit status when the run could not proceed at all.
pub const EXIT_RUN_ERROR: u8 = 2;

/// taintbox — payload-carrying image builder for LLM security testing.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build (and optionally push) one image per test case.
    BuildPush(build_push::BuildPushArgs),
    /// Regenerate the external suite from the prompt manifest.
    RefreshSuite(refresh_suite::RefreshSuiteArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command could not run to completion.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let clean = match cli.command {
        Command::BuildPush(args) => build_push::execute(args)?,
        Command::RefreshSuite(args) => refresh_suite::execute(args)?,
    };
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_CASE_FAILURES)
    })
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_named_after_the_binary() {
        let cmd = Cli::command();
        cmd.clone().debug_assert();
        assert_eq!(cmd.get_name(), BIN_NAME);
    }
}
