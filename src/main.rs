//! DevOps Router - command-line front end
//!
//! Drives one target deployment through the capability-aware operation router.

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use devops_router::{
    CallContext, Config, Credentials, OperationRouter, Params,
    cli::{AqlCommand, Cli, Command},
    integrity::{compute_sha256, verify_sha256},
    query::validate_aql_query,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Offline subcommands need neither config nor network
    match &cli.command {
        Command::Aql(AqlCommand::Validate { query }) => return run_aql_validate(query),
        Command::Checksum { file, expect } => return run_checksum(file, expect.as_deref()).await,
        _ => {}
    }

    let Some(router) = build_router(&cli) else {
        return ExitCode::FAILURE;
    };
    let ctx = call_context(&cli);

    match cli.command {
        Command::Health => {
            let report = router.health_report(&ctx).await;
            let healthy = report.healthy;
            print_json(&report);
            if healthy {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Capabilities { refresh } => {
            if refresh {
                router.invalidate_capability_cache();
            }
            match router.capability_report(&ctx).await {
                Ok(report) => {
                    print_json(&report);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ Capability discovery failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Ops { permitted } => run_ops(&router, &ctx, permitted).await,
        Command::Exec { operation, params } => run_exec(&router, &ctx, &operation, &params).await,
        Command::Aql(_) | Command::Checksum { .. } => ExitCode::SUCCESS,
    }
}

/// Load configuration, apply CLI overrides and build the router
fn build_router(cli: &Cli) -> Option<OperationRouter> {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            eprintln!("❌ {e}");
            return None;
        }
    };
    if let Some(ref base_url) = cli.base_url {
        config.target.base_url.clone_from(base_url);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        provider = %config.target.provider,
        base_url = %config.target.base_url,
        auth = config.target.auth_type.as_str(),
        "Starting DevOps Router"
    );

    match OperationRouter::from_config(config) {
        Ok(router) => Some(router),
        Err(e) => {
            error!("Failed to create router: {e}");
            eprintln!("❌ {e}");
            None
        }
    }
}

/// Credentials from flags or environment
fn call_context(cli: &Cli) -> CallContext {
    let credentials = Credentials {
        token: cli.token.clone(),
        api_key: cli.api_key.clone(),
        username: cli.username.clone(),
        password: cli.password.clone(),
    };
    let ctx = CallContext::new();
    if credentials.is_usable() {
        ctx.with_credentials(credentials)
    } else {
        ctx
    }
}

async fn run_ops(router: &OperationRouter, ctx: &CallContext, permitted: bool) -> ExitCode {
    if permitted {
        match router.discover_permissions(ctx).await {
            Ok(perms) => info!(
                username = perms.username().unwrap_or("<unknown>"),
                is_admin = perms.is_admin,
                "Permissions discovered"
            ),
            Err(e) => {
                eprintln!("❌ Permission discovery failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let mappings = router.operation_mappings();
    println!("{} operation(s):\n", mappings.len());
    for (name, mapping) in &mappings {
        if mapping.is_internal() {
            println!("  {name:<32} INTERNAL");
        } else {
            println!("  {name:<32} {:<7} {}", mapping.method, mapping.path_template);
        }
    }
    ExitCode::SUCCESS
}

async fn run_exec(router: &OperationRouter, ctx: &CallContext, operation: &str, raw: &str) -> ExitCode {
    let params: Params = match serde_json::from_str(raw) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("❌ Invalid JSON parameters (expected an object): {e}");
            return ExitCode::FAILURE;
        }
    };

    match router.execute_operation(ctx, operation, params).await {
        Ok(result) => {
            let denied = result.get("error").and_then(|e| e.as_str()) == Some("operation_unavailable");
            print_json(&result);
            if denied {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_aql_validate(query: &str) -> ExitCode {
    match validate_aql_query(query) {
        Ok(()) => {
            println!("✅ valid");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Invalid query: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_checksum(file: &std::path::Path, expect: Option<&str>) -> ExitCode {
    let data = match tokio::fs::read(file).await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("❌ Failed to read {}: {e}", file.display());
            return ExitCode::FAILURE;
        }
    };

    let Some(expected) = expect else {
        println!("{}  {}", compute_sha256(&data), file.display());
        return ExitCode::SUCCESS;
    };
    match verify_sha256(&data, expected) {
        Ok(()) => {
            println!("✅ {}: OK", file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {}: {e}", file.display());
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("❌ Failed to serialize output: {e}"),
    }
}
