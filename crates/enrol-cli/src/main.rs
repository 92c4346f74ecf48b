//! Enrol - POSIX account and group provisioning

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::Settings;
use enrol_core::{AccountChanges, BackendFactory, GidNumber, IdClass, NewAccount};
use enrol_directory::DirectoryFactory;
use enrol_provisioning::{Provisioner, Reconciler};
use enrol_store::FileRecordStore;

/// Provision POSIX accounts and groups into a directory, with local fallback
#[derive(Parser, Debug)]
#[command(name = "enrol", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and its personal group
    Provision {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        /// Plain-text password (or set ENROL_PASSWORD env var)
        #[arg(long, env = "ENROL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create a standalone group
    CreateGroup {
        name: String,
        /// Explicit gid; allocated when omitted
        #[arg(long)]
        gid: Option<u32>,
    },
    /// Remove a group from the local group store
    DeleteGroup { name: String },
    /// Replace attributes of a directory account
    UpdateAccount {
        login: String,
        #[arg(long)]
        mail: Option<String>,
        #[arg(long)]
        shell: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Delete a directory account
    DeleteAccount { login: String },
    /// List accounts, from the directory or local records
    ListAccounts,
    /// List groups, from the directory or local records
    ListGroups,
    /// Show the next free identifier without reserving it
    NextId {
        #[arg(value_enum)]
        class: IdKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum IdKind {
    User,
    Group,
}

impl From<IdKind> for IdClass {
    fn from(kind: IdKind) -> Self {
        match kind {
            IdKind::User => IdClass::User,
            IdKind::Group => IdClass::Group,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;
    debug!(
        data_dir = %settings.data_dir.display(),
        directory = ?settings.directory().url,
        "Configuration loaded"
    );

    let factory = Arc::new(DirectoryFactory::new(settings.directory(), settings.tls()));
    let store = Arc::new(FileRecordStore::new(&settings.store()));
    let provisioner = Provisioner::new(
        store.clone(),
        factory.clone(),
        settings
            .allocation()
            .context("Invalid allocation range")?,
        settings.account_defaults(),
    );

    match cli.command {
        Command::Provision {
            first_name,
            last_name,
            email,
            password,
        } => {
            let request = NewAccount {
                first_name,
                last_name,
                email,
                password,
            };
            let outcome = provisioner
                .provision(&request)
                .await
                .context("Provisioning failed")?;
            info!(login = %outcome.login, via = ?outcome.via, "Provisioning complete");
            print_json(&outcome)
        }
        Command::CreateGroup { name, gid } => {
            let outcome = provisioner
                .create_group(&name, gid.map(GidNumber::new))
                .await
                .context("Group creation failed")?;
            print_json(&outcome)
        }
        Command::DeleteGroup { name } => {
            provisioner
                .delete_group(&name)
                .await
                .with_context(|| format!("Failed to delete group {}", name))?;
            print_json(&json!({ "deleted": name }))
        }
        Command::UpdateAccount {
            login,
            mail,
            shell,
            display_name,
        } => {
            let changes = AccountChanges {
                mail,
                login_shell: shell,
                display_name,
            };
            let dn = provisioner
                .update_account(&login, &changes)
                .await
                .with_context(|| format!("Failed to update account {}", login))?;
            print_json(&json!({ "updated": dn, "changes": changes }))
        }
        Command::DeleteAccount { login } => {
            let dn = provisioner
                .delete_account(&login)
                .await
                .with_context(|| format!("Failed to delete account {}", login))?;
            print_json(&json!({ "deleted": dn }))
        }
        Command::ListAccounts => {
            let reconciler = Reconciler::new(store, factory);
            print_json(&reconciler.list_accounts().await)
        }
        Command::ListGroups => {
            let reconciler = Reconciler::new(store, factory);
            print_json(&reconciler.list_groups().await)
        }
        Command::NextId { class } => {
            let class = IdClass::from(class);
            let directory = factory.select();
            let next = provisioner
                .allocator()
                .allocate(directory.as_ref(), class)
                .await
                .context("Allocation failed")?;
            print_json(&json!({ "class": class, "next": next }))
        }
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,enrol=debug"));

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", text);
    Ok(())
}
