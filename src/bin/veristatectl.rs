//! veristatectl - administrative CLI for the veristate engine.
//!
//! Manages module records and permission grants directly against the
//! database. A running daemon's registry cache is refreshed by its
//! supervising orchestrator (or at next boot); this tool only mutates
//! persisted truth.

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use veristate::config::Config;
use veristate::db::{Database, ModuleKind, ModuleManifest, ModuleStatus};

#[derive(Parser)]
#[command(name = "veristatectl", about = "Manage veristate modules and permissions")]
#[command(version)]
struct Cli {
    /// Path to the daemon configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage installed modules
    Module {
        #[command(subcommand)]
        command: ModuleCommands,
    },

    /// Manage feature permissions
    Permission {
        #[command(subcommand)]
        command: PermissionCommands,
    },
}

#[derive(Subcommand)]
enum ModuleCommands {
    /// Register a module from a manifest file and attach it
    Register {
        /// Path to the module manifest (JSON)
        manifest: String,
        /// Module kind
        #[arg(long, value_enum)]
        kind: KindArg,
    },
    /// Remove a module and its permission records
    Remove { module_id: String },
    /// Attach a module (its granted permissions become effective)
    Attach { module_id: String },
    /// Detach a module (drops it from the permission registry)
    Detach { module_id: String },
    /// List installed modules
    List,
}

#[derive(Subcommand)]
enum PermissionCommands {
    /// Grant a requested permission to a module
    Grant {
        module_id: String,
        permission: String,
    },
    /// Revoke a granted permission from a module
    Revoke {
        module_id: String,
        permission: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Shield,
    Feature,
}

impl From<KindArg> for ModuleKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Shield => ModuleKind::Shield,
            KindArg::Feature => ModuleKind::Feature,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let db = Database::new(&config.database.path).await?;

    // The daemon rebuilds its registry at boot; routing live invalidations
    // to a running daemon is the orchestrator's job, so the tokens returned
    // by these mutations are intentionally consumed here.
    match cli.command {
        Commands::Module { command } => match command {
            ModuleCommands::Register { manifest, kind } => {
                let content = std::fs::read_to_string(&manifest)?;
                let manifest: ModuleManifest = serde_json::from_str(&content)?;
                let (record, _invalidation) =
                    db.modules().register(&manifest, kind.into()).await?;
                println!(
                    "Registered {} v{} ({} permission(s) requested, none granted)",
                    record.module_id,
                    record.version,
                    record.permissions.len()
                );
            }
            ModuleCommands::Remove { module_id } => {
                let _invalidation = db.modules().remove(&module_id).await?;
                println!("Removed module {module_id}");
            }
            ModuleCommands::Attach { module_id } => {
                let _invalidation = db
                    .modules()
                    .set_status(&module_id, ModuleStatus::Attached)
                    .await?;
                println!("Attached module {module_id}");
            }
            ModuleCommands::Detach { module_id } => {
                let _invalidation = db
                    .modules()
                    .set_status(&module_id, ModuleStatus::Detached)
                    .await?;
                println!("Detached module {module_id}");
            }
            ModuleCommands::List => {
                let records = db.modules().list().await?;
                if records.is_empty() {
                    println!("No modules installed.");
                }
                for record in records {
                    println!(
                        "{} [{}] {} v{}",
                        record.module_id,
                        record.status.as_str(),
                        record.kind.as_str(),
                        record.version
                    );
                    for perm in &record.permissions {
                        let mark = if perm.is_granted { "granted" } else { "not granted" };
                        println!("    {} ({mark})", perm.name);
                    }
                }
            }
        },
        Commands::Permission { command } => match command {
            PermissionCommands::Grant {
                module_id,
                permission,
            } => {
                let _invalidation = db.modules().grant(&module_id, &permission).await?;
                println!("Permission '{permission}' granted to module {module_id}");
            }
            PermissionCommands::Revoke {
                module_id,
                permission,
            } => {
                let _invalidation = db.modules().revoke(&module_id, &permission).await?;
                println!("Permission '{permission}' revoked from module {module_id}");
            }
        },
    }

    Ok(())
}
