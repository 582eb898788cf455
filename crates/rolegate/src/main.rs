//! # Rolegate Binary
//!
//! Loads a seed document into an in-memory RBAC graph and answers one query
//! against it. Useful for trying out role layouts and for scripting checks.

mod seed;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rolegate_config::{Config, load_or_default, validation};
use rolegate_core::{
    CallContext, Cascade, MaintenanceWorker, RbacService, RoleFanout, shared_storage,
};
use rolegate_observe::TracingConfig;
use rolegate_store::MemoryBackend;
use rolegate_types::EntityKind;
use serde::Serialize;

use crate::seed::Seed;

#[derive(Parser, Debug)]
#[command(name = "rolegate")]
#[command(about = "Role-based authorization over a key-value graph", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "ROLEGATE_CONFIG", default_value = "rolegate.yaml")]
    config: PathBuf,

    /// Seed document (users, roles, permissions, assignments)
    #[arg(short, long)]
    seed: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Does the user hold the permission?
    Check {
        user: String,
        permission: String,
        /// Answer from stored effective permissions when available
        #[arg(long)]
        cached: bool,
    },
    /// Roles assigned to a user
    Roles { user: String },
    /// Permissions granted to a role
    Permissions { role: String },
    /// Users holding a role
    Members { role: String },
    /// Every user, role or permission
    List { kind: EntityKind },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_or_default(&args.config);
    if let Err(e) = validation::validate(&config) {
        bail!("Configuration validation error: {}", e);
    }

    rolegate_observe::init(
        TracingConfig::builder().filter(config.logging.clone()).json(config.json_logs).build(),
    )?;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(run(args, config))
}

async fn run(args: Args, config: Config) -> Result<()> {
    let cascade =
        Cascade::new(config.cascade.max_transaction_items, config.cascade.sweep_batch_size);
    let mut service = RbacService::builder()
        .storage(shared_storage(MemoryBackend::new(), config.storage.page_size))
        .fanout(RoleFanout::new(config.resolver.max_concurrency))
        .maybe_resolver_timeout(config.resolver.timeout())
        .cascade(cascade)
        .effective_permissions(config.effective_permissions.enabled)
        .build();

    let worker = service.recomputer().cloned().map(|recomputer| {
        MaintenanceWorker::start(recomputer, cascade, config.effective_permissions.queue_capacity)
    });
    if let Some(worker) = &worker {
        service = service.with_maintenance(worker.handle());
    }

    let ctx = CallContext::new();
    Seed::from_file(&args.seed)?.apply(&service, &ctx).await?;
    if let Some(worker) = &worker {
        worker.handle().flush().await?;
    }

    let result = execute(&service, &ctx, args.command).await;

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    result
}

async fn execute(service: &RbacService, ctx: &CallContext, command: Command) -> Result<()> {
    match command {
        Command::Check { user, permission, cached } => {
            let allowed = if cached {
                service.has_permission_cached(ctx, &user, &permission).await?
            } else {
                service.has_permission(ctx, &user, &permission).await?
            };
            print_json(&serde_json::json!({
                "user": user,
                "permission": permission,
                "allowed": allowed,
            }))
        },
        Command::Roles { user } => print_json(&service.roles_of_user(ctx, &user).await?),
        Command::Permissions { role } => {
            print_json(&service.permissions_of_role(ctx, &role).await?)
        },
        Command::Members { role } => print_json(&service.users_in_role(ctx, &role).await?),
        Command::List { kind } => match kind {
            EntityKind::User => print_json(&service.list_users(ctx).await?),
            EntityKind::Role => print_json(&service.list_roles(ctx).await?),
            EntityKind::Permission => print_json(&service.list_permissions(ctx).await?),
        },
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
