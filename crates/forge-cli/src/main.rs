//! `forge` command line

mod config;

use crate::config::ForgeConfig;
use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use forge_backend::HttpBackend;
use forge_core::{CredentialRef, GenerationRequest, JsonHistorySink, Orchestrator};
use forge_policy::{PolicyEngine, PolicyError};
use forge_validator::{
    cancel_pair, CancelToken, ComplianceValidator, ProcessSandbox, ValidationContext,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("forge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate, police and validate MCP server modules")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file (defaults to ./forge.toml if present)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("generate")
                .about("Run the generate-validate-refine loop for one target")
                .arg(
                    Arg::new("target")
                        .long("target")
                        .required(true)
                        .help("Target service identifier, e.g. github"),
                )
                .arg(
                    Arg::new("description")
                        .long("description")
                        .required(true)
                        .help("Natural-language description of the capabilities wanted"),
                )
                .arg(
                    Arg::new("max-attempts")
                        .long("max-attempts")
                        .value_parser(value_parser!(u32))
                        .help("Attempt budget (overrides [orchestrator] max_attempts)"),
                )
                .arg(
                    Arg::new("credential")
                        .long("credential")
                        .value_name("ENV=VALUE")
                        .action(ArgAction::Append)
                        .value_parser(parse_credential)
                        .help("Credential reference exposed to the module as ENV"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the accepted module here"),
                )
                .arg(
                    Arg::new("history-dir")
                        .long("history-dir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Persist attempt histories under this directory"),
                )
                .arg(
                    Arg::new("stop-on-repeated-failure")
                        .long("stop-on-repeated-failure")
                        .action(ArgAction::SetTrue)
                        .help("Give up after two identical consecutive failures"),
                )
                .arg(no_sandbox_arg()),
        )
        .subcommand(
            Command::new("check")
                .about("Run the policy guardrails over a module")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("validate")
                .about("Run the compliance validator over a module")
                .arg(file_arg())
                .arg(
                    Arg::new("target")
                        .long("target")
                        .default_value("local")
                        .help("Target identifier used in logs"),
                )
                .arg(
                    Arg::new("credential-env")
                        .long("credential-env")
                        .value_name("ENV")
                        .action(ArgAction::Append)
                        .help("Variable given a placeholder value inside the sandbox"),
                )
                .arg(no_sandbox_arg()),
        )
}

fn file_arg() -> Arg {
    Arg::new("file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Python module to inspect")
}

fn no_sandbox_arg() -> Arg {
    Arg::new("no-sandbox")
        .long("no-sandbox")
        .action(ArgAction::SetTrue)
        .help("Skip the out-of-process stage")
}

fn parse_credential(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err("expected ENV=VALUE".to_string()),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let config = ForgeConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some(("generate", args)) => generate(config, args).await,
        Some(("check", args)) => check(&config, args),
        Some(("validate", args)) => validate(&config, args).await,
        _ => bail!("unknown subcommand"),
    }
}

fn build_validator(config: &ForgeConfig, no_sandbox: bool) -> Result<ComplianceValidator> {
    let validator = ComplianceValidator::new(Arc::new(config.validator.clone()));
    if no_sandbox || !config.sandbox.enabled {
        tracing::info!("Sandbox stage disabled");
        return Ok(validator);
    }
    let sandbox = ProcessSandbox::new(config.sandbox.process.clone())
        .context("invalid [sandbox] configuration")?;
    Ok(validator.with_sandbox(Arc::new(sandbox)))
}

fn cancel_on_ctrl_c() -> CancelToken {
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            handle.cancel();
        }
    });
    token
}

fn read_module(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn generate(mut config: ForgeConfig, args: &ArgMatches) -> Result<ExitCode> {
    let target = args.get_one::<String>("target").context("--target is required")?;
    let description = args
        .get_one::<String>("description")
        .context("--description is required")?;

    if args.get_flag("stop-on-repeated-failure") {
        config.orchestrator.stop_on_repeated_failure = true;
    }
    let max_attempts = args
        .get_one::<u32>("max-attempts")
        .copied()
        .unwrap_or(config.orchestrator.max_attempts);

    let mut request =
        GenerationRequest::new(target.clone(), description.clone()).with_max_attempts(max_attempts);
    for (name, value) in args
        .get_many::<(String, String)>("credential")
        .into_iter()
        .flatten()
    {
        request = request.with_credential(name.clone(), CredentialRef::new(value.clone()));
    }

    let backend_config = config.backend.clone().with_env_overrides();
    tracing::info!(
        "Using backend {} at {}",
        backend_config.model,
        backend_config.endpoint
    );
    let backend = HttpBackend::new(backend_config).context("failed to create backend")?;
    let policy = PolicyEngine::new(Arc::new(config.policy.clone()))
        .context("invalid [policy] configuration")?;
    let validator = build_validator(&config, args.get_flag("no-sandbox"))?;

    let mut orchestrator = Orchestrator::new(Arc::new(backend), policy, validator)
        .with_config(config.orchestrator.clone())
        .with_platforms(config.platform_catalog());
    let history_dir = args
        .get_one::<PathBuf>("history-dir")
        .cloned()
        .or_else(|| config.history_dir.clone());
    if let Some(dir) = history_dir {
        orchestrator = orchestrator.with_sink(Arc::new(JsonHistorySink::new(dir)));
    }

    let cancel = cancel_on_ctrl_c();
    let result = orchestrator
        .run(request, &cancel)
        .await
        .with_context(|| format!("generation for {target} failed"))?;

    if let (Some(out), Some(source)) = (args.get_one::<PathBuf>("out"), result.accepted_source()) {
        std::fs::write(out, source)
            .with_context(|| format!("failed to write {}", out.display()))?;
        tracing::info!("Wrote accepted module to {}", out.display());
    }

    print_json(&serde_json::to_value(&result)?)?;
    Ok(exit_code(result.success))
}

fn check(config: &ForgeConfig, args: &ArgMatches) -> Result<ExitCode> {
    let path = args.get_one::<PathBuf>("file").context("file is required")?;
    let source = read_module(path)?;
    let engine = PolicyEngine::new(Arc::new(config.policy.clone()))
        .context("invalid [policy] configuration")?;

    match engine.sanitize_and_validate(&source) {
        Ok(sanitized) => {
            print_json(&json!({
                "accepted": true,
                "changed": sanitized.changed(),
                "applied_fixes": sanitized.applied_fixes,
                "violations": sanitized.violations,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(PolicyError::Rejected { violations }) => {
            tracing::warn!("{}: {} violation(s)", path.display(), violations.len());
            print_json(&json!({ "accepted": false, "violations": violations }))?;
            Ok(ExitCode::FAILURE)
        }
        Err(err @ PolicyError::Unparseable(_)) => {
            print_json(&json!({ "accepted": false, "error": err.to_string() }))?;
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err).context("policy engine failed"),
    }
}

async fn validate(config: &ForgeConfig, args: &ArgMatches) -> Result<ExitCode> {
    let path = args.get_one::<PathBuf>("file").context("file is required")?;
    let target = args.get_one::<String>("target").context("--target is required")?;
    let source = read_module(path)?;

    let validator = build_validator(config, args.get_flag("no-sandbox"))?;
    let placeholders = args
        .get_many::<String>("credential-env")
        .into_iter()
        .flatten()
        .cloned();
    let context = ValidationContext::new(target.clone()).with_credential_env(placeholders);

    let cancel = cancel_on_ctrl_c();
    let report = validator
        .validate(&source, &context, &cancel)
        .await
        .with_context(|| format!("validation of {} did not complete", path.display()))?;

    print_json(&serde_json::to_value(&report)?)?;
    Ok(exit_code(report.passed()))
}
