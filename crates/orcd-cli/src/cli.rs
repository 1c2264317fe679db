use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "orcd", about = "Cluster orchestrator: hosts, services, and daemons via declarative specs", version)]
pub struct Cli {
    /// Path to the persistent state store. Defaults to ~/.orcd/state.redb.
    #[arg(long, global = true, env = "ORCD_STORE")]
    pub store_path: Option<PathBuf>,

    /// Use an in-memory store instead (state does not survive the process).
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Host inventory (C1).
    Host {
        #[command(subcommand)]
        action: HostCommand,
    },

    /// Apply one or more specs from a YAML file (§6 spec YAML schema).
    Apply {
        /// Path to the spec YAML file (one or more `---`-separated documents).
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
    },

    /// List known specs.
    Ls {
        #[arg(long = "service-type")]
        service_type: Option<String>,
        #[arg(long = "service-name")]
        service_name: Option<String>,
    },

    /// List daemons.
    Ps {
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long = "daemon-type")]
        daemon_type: Option<String>,
        #[arg(long = "daemon-id")]
        daemon_id: Option<String>,
    },

    /// Start/stop/restart/redeploy/reconfig a single daemon.
    Daemon {
        #[command(subcommand)]
        action: DaemonCommand,
    },

    /// start/stop/restart every daemon in a service.
    ServiceAction {
        #[arg(value_enum)]
        action: ServiceActionKind,
        service_name: String,
    },

    /// OSD removal engine (C9).
    Osd {
        #[command(subcommand)]
        action: OsdCommand,
    },

    /// Device inventory and light/zap control (§6).
    Device {
        #[command(subcommand)]
        action: DeviceCommand,
    },

    /// Pause the reconciler loop.
    Pause,

    /// Resume the reconciler loop.
    Resume,

    /// Rolling image upgrade (C10).
    Upgrade {
        #[command(subcommand)]
        action: UpgradeCommand,
    },

    /// Run the reconciler loop in the foreground (§4.8).
    Serve {
        /// Stop after this many did-work iterations (mainly for testing); 0 = run forever.
        #[arg(long, default_value_t = 0)]
        max_iterations: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum HostCommand {
    Add { name: String, address: Option<String> },
    Ls,
    Rm { name: String },
    SetAddr { name: String, address: String },
    Label {
        #[command(subcommand)]
        action: LabelCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum LabelCommand {
    Add { name: String, label: String },
    Rm { name: String, label: String },
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    Redeploy {
        name: String,
        #[arg(long)]
        image: Option<String>,
    },
    Reconfig { name: String },
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ServiceActionKind {
    Start,
    Stop,
    Restart,
}

#[derive(Debug, Subcommand)]
pub enum OsdCommand {
    Rm {
        ids: Vec<i64>,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        force: bool,
    },
    RmStatus,
    RmStop { ids: Vec<i64> },
}

#[derive(Debug, Subcommand)]
pub enum DeviceCommand {
    /// List known devices across all hosts, optionally forcing a fresh inventory pull first.
    Ls {
        #[arg(long)]
        refresh: bool,
    },
    /// Wipe a device's data so it can be reused for a new OSD.
    Zap { host: String, path: String },
    /// Toggle an enclosure LED. `target` is `<host>:<path>[=<devpath>]`.
    Light {
        #[arg(value_enum)]
        state: LightState,
        #[arg(value_enum)]
        kind: LightKind,
        target: String,
    },
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum LightState {
    On,
    Off,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum LightKind {
    Ident,
    Fault,
}

#[derive(Debug, Subcommand)]
pub enum UpgradeCommand {
    Start {
        #[arg(long)]
        image: String,
    },
    Pause,
    Resume,
    Status,
}
