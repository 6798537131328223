//! Command-line interface definitions for the `letsbake` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `letsbake` binary.
#[derive(Debug, Parser)]
#[command(
    name = "letsbake",
    about = "Bake LetsCloud images from a throwaway build instance",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create an instance, provision it over SSH, and capture the result.
    #[command(
        name = "build",
        about = "Create an instance, provision it over SSH, and capture the result"
    )]
    Build(BuildCommand),
}

/// Arguments for the `letsbake build` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct BuildCommand {
    /// Shell command to run on the instance; repeat to run several, in order.
    #[arg(long = "provision", value_name = "COMMAND")]
    pub(crate) provision: Vec<String>,
    /// Local script whose contents run on the instance after the commands.
    #[arg(long = "provision-script", value_name = "PATH")]
    pub(crate) provision_script: Vec<String>,
    /// Enable debug logging.
    #[arg(long)]
    pub(crate) debug: bool,
}
