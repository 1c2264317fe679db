use std::sync::Arc;

use anyhow::{bail, Context as AnyhowContext, Result};
use orcd_domain::{DaemonDescription, Host, ServiceName, ServiceType};
use orcd_driver::{AgentCommand, ClusterClient, DriverRegistry, Executor};
use orcd_reconciler::health;
use orcd_store::{ConfigStore, RemovalQueueEntry};
use tracing::info;

use crate::cli::{DaemonCommand, DeviceCommand, LabelCommand, LightKind, LightState, OsdCommand, ServiceActionKind, UpgradeCommand};
use crate::output;

/// Everything a command needs to act: the persisted state plus the same
/// driver/cluster/executor collaborators the reconciler loop uses, so a
/// one-off CLI invocation and a long-running `serve` see identical behavior.
pub struct Context {
    pub store: Arc<dyn ConfigStore>,
    pub registry: Arc<DriverRegistry>,
    pub cluster: Arc<dyn ClusterClient>,
    pub executor: Arc<dyn Executor>,
}

// ── Host inventory (C1) ───────────────────────────────────────────────────────

pub async fn host_add(ctx: &Context, name: String, address: Option<String>) -> Result<()> {
    let host = Host::new(name.clone(), address.unwrap_or(name));
    ctx.store.add_host(host).await.context("adding host")?;
    println!("Added host.");
    Ok(())
}

pub async fn host_ls(ctx: &Context) -> Result<()> {
    let hosts = ctx.store.list_hosts().await?;
    print!("{}", output::render_hosts(&hosts));
    Ok(())
}

pub async fn host_rm(ctx: &Context, name: String) -> Result<()> {
    ctx.store.remove_host(&name).await.context("removing host")?;
    println!("Removed {name}.");
    Ok(())
}

pub async fn host_set_addr(ctx: &Context, name: String, address: String) -> Result<()> {
    let mut host = ctx.store.get_host(&name).await?.ok_or_else(|| anyhow::anyhow!("host '{name}' not found"))?;
    host.address = address;
    ctx.store.put_host(host).await?;
    println!("Updated address for {name}.");
    Ok(())
}

pub async fn host_label(ctx: &Context, action: LabelCommand) -> Result<()> {
    let (name, label, add) = match action {
        LabelCommand::Add { name, label } => (name, label, true),
        LabelCommand::Rm { name, label } => (name, label, false),
    };
    let mut host = ctx.store.get_host(&name).await?.ok_or_else(|| anyhow::anyhow!("host '{name}' not found"))?;
    if add {
        host.labels.insert(label);
    } else {
        host.labels.remove(&label);
    }
    ctx.store.put_host(host).await?;
    println!("Updated labels for {name}.");
    Ok(())
}

// ── SpecStore (C3) ─────────────────────────────────────────────────────────────

pub async fn apply(ctx: &Context, input: std::path::PathBuf) -> Result<()> {
    let specs = orcd_config::load_specs(&input).context("loading spec file")?;
    let n = specs.len();
    for spec in specs {
        let name = spec.service_name();
        ctx.store.save_spec(spec).await.context("saving spec")?;
        println!("Saved spec for {name}.");
    }
    println!("{n} spec(s) applied; reconciling now…");

    let report = orcd_reconciler::run_iteration(ctx.store.as_ref(), &ctx.registry, ctx.cluster.as_ref(), ctx.executor.as_ref())
        .await
        .context("reconciling after apply")?;
    for change in &report.changes {
        println!("{change:?}");
    }
    if !report.errors.is_empty() {
        eprintln!("{} error(s) during reconcile:", report.errors.len());
        for e in &report.errors {
            eprintln!("  ! {e}");
        }
    }
    Ok(())
}

pub async fn ls(ctx: &Context, service_type: Option<String>, service_name: Option<String>) -> Result<()> {
    let mut specs = ctx.store.list_specs().await?;
    if let Some(t) = service_type {
        let t = ServiceType::from_str_loose(&t)?;
        specs.retain(|s| s.service_type == t);
    }
    if let Some(n) = service_name {
        specs.retain(|s| s.service_name().as_str() == n);
    }
    print!("{}", output::render_specs(&specs));
    Ok(())
}

// ── Daemons ───────────────────────────────────────────────────────────────────

pub async fn ps(
    ctx: &Context,
    hostname: Option<String>,
    daemon_type: Option<String>,
    daemon_id: Option<String>,
) -> Result<()> {
    let mut out = Vec::new();
    let hosts = ctx.store.list_hosts().await?;
    for host in &hosts {
        if let Some(ref h) = hostname {
            if h != &host.hostname {
                continue;
            }
        }
        let cache = ctx.store.get_cache(&host.hostname).await?;
        for daemon in cache.daemons.values() {
            if let Some(ref t) = daemon_type {
                if ServiceType::from_str_loose(t).map(|t| t != daemon.daemon_type).unwrap_or(true) {
                    continue;
                }
            }
            if let Some(ref id) = daemon_id {
                if id != &daemon.daemon_id {
                    continue;
                }
            }
            out.push((host.hostname.clone(), daemon.clone()));
        }
    }
    print!("{}", output::render_daemons(&out));
    Ok(())
}

async fn find_daemon(ctx: &Context, name: &str) -> Result<(String, DaemonDescription)> {
    for host in ctx.store.list_hosts().await? {
        let cache = ctx.store.get_cache(&host.hostname).await?;
        if let Some(daemon) = cache.daemons.values().find(|d| d.name().as_str() == name) {
            return Ok((host.hostname.clone(), daemon.clone()));
        }
    }
    bail!("daemon '{name}' not found")
}

pub async fn daemon(ctx: &Context, action: DaemonCommand) -> Result<()> {
    match action {
        DaemonCommand::Start { name } => unit_action(ctx, &name, "start").await,
        DaemonCommand::Stop { name } => unit_action(ctx, &name, "stop").await,
        DaemonCommand::Restart { name } => unit_action(ctx, &name, "restart").await,
        DaemonCommand::Reconfig { name } => {
            let (hostname, daemon) = find_daemon(ctx, &name).await?;
            let spec = ctx
                .store
                .get_spec(&daemon.service_name())
                .await?
                .ok_or_else(|| anyhow::anyhow!("no spec for {}", daemon.service_name()))?;
            orcd_reconciler::apply::deploy_daemon(&spec, &daemon.daemon_id, &hostname, ctx.store.as_ref(), &ctx.registry, ctx.executor.as_ref(), None)
                .await?;
            println!("Reconfigured {name}.");
            Ok(())
        }
        DaemonCommand::Redeploy { name, image } => {
            let (hostname, daemon) = find_daemon(ctx, &name).await?;
            let spec = ctx
                .store
                .get_spec(&daemon.service_name())
                .await?
                .ok_or_else(|| anyhow::anyhow!("no spec for {}", daemon.service_name()))?;
            orcd_reconciler::apply::deploy_daemon(
                &spec,
                &daemon.daemon_id,
                &hostname,
                ctx.store.as_ref(),
                &ctx.registry,
                ctx.executor.as_ref(),
                image.as_deref(),
            )
            .await?;
            println!("Redeployed {name}.");
            Ok(())
        }
    }
}

async fn unit_action(ctx: &Context, name: &str, action: &str) -> Result<()> {
    let (hostname, _daemon) = find_daemon(ctx, name).await?;
    ctx.executor
        .run(&hostname, AgentCommand::Unit { action: action.to_string(), name: name.to_string() }, None, false)
        .await
        .context("unit action failed")?;
    println!("{action} {name}: ok.");
    Ok(())
}

pub async fn service_action(ctx: &Context, action: ServiceActionKind, service_name: String) -> Result<()> {
    let name = ServiceName(service_name.clone());
    let hosts = ctx.store.list_hosts().await?;
    let action_str = match action {
        ServiceActionKind::Start => "start",
        ServiceActionKind::Stop => "stop",
        ServiceActionKind::Restart => "restart",
    };
    let mut count = 0;
    for host in &hosts {
        let cache = ctx.store.get_cache(&host.hostname).await?;
        for daemon in cache.daemons_by_service(&name) {
            ctx.executor
                .run(&host.hostname, AgentCommand::Unit { action: action_str.to_string(), name: daemon.name().to_string() }, None, false)
                .await?;
            count += 1;
        }
    }
    println!("{action_str} issued to {count} daemon(s) in service {service_name}.");
    Ok(())
}

// ── OSD removal (C9) ───────────────────────────────────────────────────────────

pub async fn osd(ctx: &Context, action: OsdCommand) -> Result<()> {
    match action {
        OsdCommand::Rm { ids, replace, force } => {
            for id in ids {
                let hostname = osd_hostname(ctx, id).await?;
                let entry = RemovalQueueEntry::new(id, hostname, replace, force, chrono::Utc::now());
                ctx.store.put_removal(entry).await?;
                println!("Queued osd.{id} for removal.");
            }
            Ok(())
        }
        OsdCommand::RmStatus => {
            let removals = ctx.store.list_removals().await?;
            if removals.is_empty() {
                println!("No OSDs pending removal.");
            }
            for r in removals {
                println!("osd.{:<6} {:?}{}", r.osd_id, r.state, if r.force { " (forced)" } else { "" });
            }
            Ok(())
        }
        OsdCommand::RmStop { ids } => {
            for id in ids {
                orcd_reconciler::removal::stop_removal(ctx.store.as_ref(), ctx.cluster.as_ref(), id).await?;
                println!("Stopped removal of osd.{id}.");
            }
            Ok(())
        }
    }
}

async fn osd_hostname(ctx: &Context, osd_id: i64) -> Result<String> {
    for host in ctx.store.list_hosts().await? {
        let cache = ctx.store.get_cache(&host.hostname).await?;
        if cache.daemons.values().any(|d| d.daemon_type == ServiceType::Osd && d.daemon_id == osd_id.to_string()) {
            return Ok(host.hostname);
        }
    }
    bail!("osd.{osd_id} not found in any host cache")
}

// ── Device inventory (§6) ──────────────────────────────────────────────────────

pub async fn device(ctx: &Context, action: DeviceCommand) -> Result<()> {
    match action {
        DeviceCommand::Ls { refresh } => device_ls(ctx, refresh).await,
        DeviceCommand::Zap { host, path } => device_zap(ctx, host, path).await,
        DeviceCommand::Light { state, kind, target } => device_light(ctx, state, kind, target).await,
    }
}

async fn device_ls(ctx: &Context, refresh: bool) -> Result<()> {
    if refresh {
        for host in ctx.store.list_hosts().await? {
            let mut cache = ctx.store.get_cache(&host.hostname).await?;
            cache.invalidate_devices();
            ctx.store.put_cache(&host.hostname, cache).await?;
        }
        orcd_reconciler::run_iteration(ctx.store.as_ref(), &ctx.registry, ctx.cluster.as_ref(), ctx.executor.as_ref())
            .await
            .context("refreshing device inventory")?;
    }

    let mut out = Vec::new();
    for host in ctx.store.list_hosts().await? {
        let cache = ctx.store.get_cache(&host.hostname).await?;
        for device in cache.devices {
            out.push((host.hostname.clone(), device));
        }
    }
    print!("{}", output::render_devices(&out));
    Ok(())
}

/// Wipes a device so it can be reused for a new OSD (§6 `device zap`),
/// mirroring `ceph-volume lvm zap --destroy <path>`.
async fn device_zap(ctx: &Context, host: String, path: String) -> Result<()> {
    let resp = ctx
        .executor
        .run(
            &host,
            AgentCommand::CephVolume { args: vec!["lvm".into(), "zap".into(), "--destroy".into(), path.clone()] },
            None,
            true,
        )
        .await
        .context("zap failed")?;
    if resp.code != 0 {
        bail!("zap of {host}:{path} failed: {}", resp.stderr);
    }
    let mut cache = ctx.store.get_cache(&host).await?;
    cache.invalidate_devices();
    ctx.store.put_cache(&host, cache).await?;
    println!("Zapped {host}:{path}.");
    Ok(())
}

/// Toggles an enclosure LED (§6 `device light`). `target` is
/// `<host>:<path>[=<devpath>]`; `devpath`, when given, is the kernel device
/// node the drive backend addresses the slot by, as distinct from the path
/// used to look the device up.
async fn device_light(ctx: &Context, state: LightState, kind: LightKind, target: String) -> Result<()> {
    let (host, rest) = target.split_once(':').ok_or_else(|| anyhow::anyhow!("target must be <host>:<path>[=<devpath>]"))?;
    let (path, devpath) = match rest.split_once('=') {
        Some((p, d)) => (p, Some(d)),
        None => (rest, None),
    };
    let on = matches!(state, LightState::On);
    let kind_str = match kind {
        LightKind::Ident => "ident",
        LightKind::Fault => "fault",
    };
    let args = vec![
        "lsmcli".to_string(),
        format!("local-disk-{kind_str}-led-{}", if on { "on" } else { "off" }),
        "--path".to_string(),
        devpath.unwrap_or(path).to_string(),
    ];
    let resp = ctx.executor.run(host, AgentCommand::CephVolume { args }, None, true).await.context("light toggle failed")?;
    if resp.code != 0 {
        bail!("setting {kind_str} light for {target} failed: {}", resp.stderr);
    }
    println!("Set {kind_str} light for {target} {}.", if on { "on" } else { "off" });
    Ok(())
}

// ── Pause / resume ──────────────────────────────────────────────────────────────

pub async fn pause(ctx: &Context) -> Result<()> {
    ctx.store.set_paused(true).await?;
    health::update_paused_health(ctx.store.as_ref()).await?;
    println!("Paused.");
    Ok(())
}

pub async fn resume(ctx: &Context) -> Result<()> {
    ctx.store.set_paused(false).await?;
    health::update_paused_health(ctx.store.as_ref()).await?;
    println!("Resumed.");
    Ok(())
}

// ── Upgrade (C10) ────────────────────────────────────────────────────────────

pub async fn upgrade(ctx: &Context, action: UpgradeCommand) -> Result<()> {
    match action {
        UpgradeCommand::Start { image } => {
            orcd_reconciler::upgrade::start_upgrade(ctx.store.as_ref(), image.clone()).await?;
            println!("Upgrade to {image} started.");
            Ok(())
        }
        UpgradeCommand::Pause => {
            orcd_reconciler::upgrade::pause_upgrade(ctx.store.as_ref()).await?;
            println!("Upgrade paused.");
            Ok(())
        }
        UpgradeCommand::Resume => {
            orcd_reconciler::upgrade::resume_upgrade(ctx.store.as_ref()).await?;
            println!("Upgrade resumed.");
            Ok(())
        }
        UpgradeCommand::Status => {
            let state = ctx.store.get_upgrade_state().await?;
            if !state.in_progress {
                println!("No upgrade in progress.");
            } else {
                println!(
                    "Upgrading to {} — paused: {}, current type: {:?}, current daemon: {:?}",
                    state.target_image.as_deref().unwrap_or("?"),
                    state.paused,
                    state.current_type,
                    state.current_daemon,
                );
            }
            Ok(())
        }
    }
}

// ── Serve loop ──────────────────────────────────────────────────────────────────

pub async fn serve(ctx: &Context, max_iterations: usize) -> Result<()> {
    info!("serve loop starting");
    let mut iterations = 0usize;
    loop {
        let report = orcd_reconciler::run_iteration(ctx.store.as_ref(), &ctx.registry, ctx.cluster.as_ref(), ctx.executor.as_ref()).await?;
        if report.did_work() {
            info!(changes = report.changes.len(), "iteration did work, restarting immediately");
            iterations += 1;
            if max_iterations != 0 && iterations >= max_iterations {
                return Ok(());
            }
            continue;
        }
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
    }
}
