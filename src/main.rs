//! Binary entry point for the Aerolog CLI.

use std::env;
use std::io::{self, Write};
use std::process;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Parser;
use thiserror::Error;

use aerolog::{
    ArtifactConfig, CaptchaConfig, ChallengeStore, Credentials, DeviceConfig,
    HttpArtifactCollector, HttpCaptchaSolver, HttpInstanceProvider, InstanceConfig, Pipeline,
    RunMode, RunReport, RunState, SkipDirective, StatusKind, TcpDeviceLink, WireDriver, WriterSink,
};

mod cli;

use cli::{Cli, RunCommand, SolveCommand, StatusCommand, StatusKindArg};

type ServicePipeline = Pipeline<
    HttpInstanceProvider,
    TcpDeviceLink,
    WireDriver,
    HttpCaptchaSolver,
    HttpArtifactCollector,
>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let parsed = Cli::parse();
    let exit_code = match dispatch(parsed).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(parsed: Cli) -> Result<i32, CliError> {
    match parsed {
        Cli::Run(command) => run_pipeline(command).await,
        Cli::StartInstance => {
            let pipeline = build_pipeline()?;
            let mut run = service_run_state();
            let mut sink = stdout_sink();
            Ok(exit_code(&pipeline.start_instance(&mut run, &mut sink).await))
        }
        Cli::StopInstance => {
            let pipeline = build_pipeline()?;
            let mut run = service_run_state();
            let mut sink = stdout_sink();
            Ok(exit_code(&pipeline.stop_instance(&mut run, &mut sink).await))
        }
        Cli::InstanceStatus(command) => instance_status(command).await,
        Cli::ArtifactPaths => {
            let pipeline = build_pipeline()?;
            let mut run = service_run_state();
            let mut sink = stdout_sink();
            Ok(exit_code(&pipeline.artifact_paths(&mut run, &mut sink).await))
        }
        Cli::SolveCaptcha(command) => solve_captcha(command).await,
    }
}

async fn run_pipeline(command: RunCommand) -> Result<i32, CliError> {
    if let Some(result) = fake_run_from_env() {
        return result;
    }

    let pipeline = build_pipeline()?;
    let credentials = Credentials {
        login: command.login,
        password: command.password,
    };
    let mode = match (command.callback_ok, command.callback_error) {
        (Some(success_endpoint), Some(error_endpoint)) => RunMode::FireAndAcknowledge {
            success_endpoint,
            error_endpoint,
        },
        _ => RunMode::Synchronous,
    };
    let mut skips = Vec::new();
    if command.skip_instance_start {
        skips.push(SkipDirective::InstanceStart);
    }
    if command.skip_instance_stop {
        skips.push(SkipDirective::InstanceStop);
    }

    let mut run = RunState::new(credentials, mode).with_skips(skips);
    let mut sink = stdout_sink();
    Ok(exit_code(&pipeline.execute(&mut run, &mut sink).await))
}

async fn instance_status(command: StatusCommand) -> Result<i32, CliError> {
    let pipeline = build_pipeline()?;
    let kind = match command.kind {
        StatusKindArg::Exists => StatusKind::Exists,
        StatusKindArg::Running => StatusKind::Running,
        StatusKindArg::Stopped => StatusKind::Stopped,
    };
    let mut run = service_run_state();
    let mut sink = stdout_sink();
    Ok(exit_code(
        &pipeline.instance_status(&mut run, kind, &mut sink).await,
    ))
}

async fn solve_captcha(command: SolveCommand) -> Result<i32, CliError> {
    let pipeline = build_pipeline()?;
    let bytes = std::fs::read(&command.image_file).map_err(|err| CliError::Io {
        path: command.image_file.clone(),
        message: err.to_string(),
    })?;
    let encoded = BASE64.encode(&bytes);
    let mut run = service_run_state();
    let mut sink = stdout_sink();
    Ok(exit_code(
        &pipeline.solve_captcha(&mut run, &encoded, &mut sink).await,
    ))
}

fn build_pipeline() -> Result<ServicePipeline, CliError> {
    let instance_config =
        InstanceConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    instance_config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let device_config =
        DeviceConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let profile = device_config
        .as_profile()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let captcha_config =
        CaptchaConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    captcha_config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let artifact_config =
        ArtifactConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    artifact_config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let provider = HttpInstanceProvider::new(
        instance_config.control_plane_url.clone(),
        instance_config.instance_id.clone(),
    )
    .map_err(|err| CliError::Config(err.to_string()))?;
    let link = TcpDeviceLink::new(instance_config.device_bridge_address.clone());
    let driver = WireDriver::new(
        device_config.automation_url.clone(),
        device_config.automation_restart_url.clone(),
    );
    let solver = HttpCaptchaSolver::new(captcha_config.solver_url.clone());
    let collector = HttpArtifactCollector::new(artifact_config.collector_url.clone());
    let store = ChallengeStore::new(captcha_config.storage_root_path());

    Ok(Pipeline::new(
        provider, link, driver, solver, collector, profile, store,
    ))
}

fn service_run_state() -> RunState {
    RunState::new(
        Credentials {
            login: String::new(),
            password: String::new(),
        },
        RunMode::Synchronous,
    )
}

fn stdout_sink() -> WriterSink<io::Stdout> {
    WriterSink::new(io::stdout())
}

const fn exit_code(report: &RunReport) -> i32 {
    if report.is_error() { 1 } else { 0 }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

fn fake_run_from_env() -> Option<Result<i32, CliError>> {
    let mode = env::var("AEROLOG_FAKE_RUN_MODE").ok()?;
    match mode.as_str() {
        "ok" => {
            writeln!(io::stdout(), r#"{{"status":"ok","log":[]}}"#).ok();
            Some(Ok(0))
        }
        "error" => {
            writeln!(
                io::stdout(),
                r#"{{"status":"error","error":"provider","message":"fake","stage":"idle","log":[]}}"#
            )
            .ok();
            Some(Ok(1))
        }
        "config" => Some(Err(CliError::Config(String::from("fake")))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_report_status() {
        assert_eq!(exit_code(&RunReport::ack()), 0);
        assert_eq!(
            exit_code(&RunReport::Error(aerolog::run::ErrorReport {
                error: String::from("provider"),
                secondary_error: None,
                message: String::from("boom"),
                stage: aerolog::Stage::Idle,
                log: Vec::new(),
            })),
            1
        );
    }

    #[test]
    fn write_error_renders_the_message() {
        let mut buf = Vec::new();
        write_error(&mut buf, &CliError::Config(String::from("missing key")));
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert!(
            rendered.contains("configuration error: missing key"),
            "rendered: {rendered}"
        );
    }
}
