//! Command-line interface definitions for the `aerolog` binary.
//!
//! This module centralises the clap parser structures so both the main
//! binary and the build script can reuse them when generating the manual
//! page.

use clap::{Parser, ValueEnum};

/// Top-level CLI for the `aerolog` binary.
#[derive(Debug, Parser)]
#[command(
    name = "aerolog",
    about = "Drive the emulator-hosted pilot app and collect flight logs",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run the full login-and-collect pipeline.
    #[command(name = "run", about = "Run the full login-and-collect pipeline")]
    Run(RunCommand),
    /// Start the emulator instance and wait for the device link.
    #[command(name = "start-instance", about = "Start the emulator instance")]
    StartInstance,
    /// Stop the emulator instance.
    #[command(name = "stop-instance", about = "Stop the emulator instance")]
    StopInstance,
    /// Query the emulator instance state.
    #[command(name = "instance-status", about = "Query the emulator instance state")]
    InstanceStatus(StatusCommand),
    /// Print the configured artifact storage paths.
    #[command(name = "artifact-paths", about = "Print artifact storage paths")]
    ArtifactPaths,
    /// Solve a challenge image without touching the device.
    #[command(name = "solve-captcha", about = "Solve a challenge image directly")]
    SolveCaptcha(SolveCommand),
}

/// Arguments for the `aerolog run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Account login identifier, normally an email address.
    #[arg(long, value_name = "LOGIN")]
    pub(crate) login: String,
    /// Account password.
    #[arg(long, value_name = "PASSWORD")]
    pub(crate) password: String,
    /// Do not start the instance before the run.
    #[arg(long)]
    pub(crate) skip_instance_start: bool,
    /// Do not stop the instance after the run.
    #[arg(long)]
    pub(crate) skip_instance_stop: bool,
    /// Acknowledge immediately and POST the success payload here.
    #[arg(long, value_name = "URL", requires = "callback_error")]
    pub(crate) callback_ok: Option<String>,
    /// Acknowledge immediately and POST the error payload here.
    #[arg(long, value_name = "URL", requires = "callback_ok")]
    pub(crate) callback_error: Option<String>,
}

/// Status query kinds accepted by `instance-status`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum StatusKindArg {
    /// Resolve whether the instance exists at all.
    Exists,
    /// Check for the `running` state.
    Running,
    /// Check for the `stopped` state.
    Stopped,
}

/// Arguments for the `aerolog instance-status` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct StatusCommand {
    /// Which state to query.
    #[arg(long, value_enum, default_value = "exists")]
    pub(crate) kind: StatusKindArg,
}

/// Arguments for the `aerolog solve-captcha` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct SolveCommand {
    /// Path to the challenge image file to encode and submit.
    #[arg(long, value_name = "PATH")]
    pub(crate) image_file: String,
}
