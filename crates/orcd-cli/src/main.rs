mod cli;
mod commands;
mod output;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use orcd_driver::{DriverRegistry, Executor, FakeClusterClient, HostAddressBook, SshExecutor};
use orcd_store::ConfigStore;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use commands::Context;

/// A one-time snapshot of the host inventory's addresses, taken at startup.
///
/// `SshExecutor` needs synchronous address lookups but `ConfigStore` is
/// async, so we resolve addresses once before the command runs rather than
/// threading a runtime handle through the executor. A long-running `serve`
/// invocation will not see host address changes made by another process
/// until restarted; that staleness is accepted for this build.
struct AddressSnapshot(HashMap<String, String>);

impl HostAddressBook for AddressSnapshot {
    fn address_of(&self, host: &str) -> Option<String> {
        self.0.get(host).cloned()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let store: Arc<dyn ConfigStore> = if cli.ephemeral {
        Arc::new(orcd_store::InMemoryStore::new())
    } else {
        let path = cli.store_path.clone().unwrap_or_else(default_store_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("creating store directory")?;
        }
        Arc::new(orcd_store::RedbStore::open(&path).context("opening store")?)
    };

    let hosts = store.list_hosts().await.context("listing hosts for address snapshot")?;
    let snapshot: HashMap<String, String> = hosts.into_iter().map(|h| (h.hostname, h.address)).collect();
    let executor: Arc<dyn Executor> =
        Arc::new(SshExecutor::new(Arc::new(AddressSnapshot(snapshot)), "/usr/bin/orcd-agent", "root"));

    let ctx = Context {
        store,
        registry: Arc::new(DriverRegistry::with_defaults()),
        cluster: Arc::new(FakeClusterClient::new()),
        executor,
    };

    match cli.command {
        Command::Host { action } => match action {
            cli::HostCommand::Add { name, address } => commands::host_add(&ctx, name, address).await,
            cli::HostCommand::Ls => commands::host_ls(&ctx).await,
            cli::HostCommand::Rm { name } => commands::host_rm(&ctx, name).await,
            cli::HostCommand::SetAddr { name, address } => commands::host_set_addr(&ctx, name, address).await,
            cli::HostCommand::Label { action } => commands::host_label(&ctx, action).await,
        },
        Command::Apply { input } => commands::apply(&ctx, input).await,
        Command::Ls { service_type, service_name } => commands::ls(&ctx, service_type, service_name).await,
        Command::Ps { hostname, daemon_type, daemon_id } => commands::ps(&ctx, hostname, daemon_type, daemon_id).await,
        Command::Daemon { action } => commands::daemon(&ctx, action).await,
        Command::ServiceAction { action, service_name } => commands::service_action(&ctx, action, service_name).await,
        Command::Osd { action } => commands::osd(&ctx, action).await,
        Command::Device { action } => commands::device(&ctx, action).await,
        Command::Pause => commands::pause(&ctx).await,
        Command::Resume => commands::resume(&ctx).await,
        Command::Upgrade { action } => commands::upgrade(&ctx, action).await,
        Command::Serve { max_iterations } => commands::serve(&ctx, max_iterations).await,
    }
}

fn default_store_path() -> std::path::PathBuf {
    let home = std::env::var_os("HOME").map(std::path::PathBuf::from).unwrap_or_else(|| std::path::PathBuf::from("."));
    home.join(".orcd").join("state.redb")
}
