#![cfg(windows)]

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ws1migrate::config::{Args, Context};
use ws1migrate::coordinator::{self, EnrollmentStatus, MigrationError, MigrationSteps};
use ws1migrate::removal::Removal;
use ws1migrate::{
    agent, bitlocker, elevation, enrollment, manifests, net, notifications, recovery, schedule,
};

/// Real step wiring: each trait method maps onto one device surface and logs
/// its own failures — the coordinator only ever sees the status queries.
struct HubSteps<'a> {
    ctx: &'a Context,
}

impl MigrationSteps for HubSteps<'_> {
    fn server_reachable(&mut self) -> bool {
        net::server_reachable(
            &self.ctx.server,
            self.ctx.settings.port,
            self.ctx.connect_timeout(),
        )
    }

    fn set_notifications(&mut self, enabled: bool) {
        if let Err(e) = notifications::set_enabled(&self.ctx.settings.notification_channels, enabled)
        {
            warn!(%e, enabled, "notification toggle failed");
        }
    }

    fn suspend_encryption(&mut self) {
        info!("suspending drive encryption for the migration window");
        bitlocker::suspend();
    }

    fn enrollment_status(&mut self) -> EnrollmentStatus {
        enrollment::status().unwrap_or_else(|e| {
            warn!(%e, "enrollment status read failed; treating as not enrolled");
            EnrollmentStatus::NotCompleted
        })
    }

    fn backup_app_manifests(&mut self) {
        if let Err(e) = manifests::backup_deployment_manifests() {
            error!(%e, "app manifest backup failed");
        }
    }

    fn backup_recovery_trees(&mut self) {
        if let Err(e) = recovery::backup_trees(&self.ctx.settings.recovery_roots) {
            error!(%e, "recovery tree backup failed");
        }
    }

    fn uninstall_agent(&mut self) {
        if let Err(e) = agent::uninstall() {
            error!(%e, "agent uninstall failed");
        }
    }

    fn enroll_device(&mut self) {
        if let Err(e) = agent::enroll(self.ctx) {
            // Installer problems are judged by the status polls, not here.
            error!(%e, "enrollment installer invocation failed");
        }
    }

    fn restore_recovery_trees(&mut self) {
        if let Err(e) =
            recovery::restore_trees(&self.ctx.settings.recovery_roots, &self.ctx.staging_dir)
        {
            error!(%e, "recovery tree restore failed");
        }
    }

    fn resume_encryption(&mut self) {
        info!("resuming drive encryption");
        bitlocker::resume();
    }

    fn apps_installed(&mut self) -> bool {
        manifests::all_apps_installed().unwrap_or_else(|e| {
            warn!(%e, "app inventory read failed; keeping the wait alive");
            false
        })
    }

    fn cleanup(&mut self) {
        recovery::cleanup_backups(&self.ctx.settings.recovery_roots);
        if let Err(e) = manifests::delete_manifest_backups() {
            warn!(%e, "manifest backup cleanup failed");
        }
        schedule::unregister_resume_task(&self.ctx.settings.resume_task_name);
        if self.ctx.staging_dir.exists() {
            Removal::from_io(std::fs::remove_dir_all(&self.ctx.staging_dir))
                .warn_if_failed(&self.ctx.staging_dir.display().to_string());
        }
    }

    fn sleep(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

fn init_logging(ctx: &Context) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // File logging (daily) + colorized console echo + env filter. A broken
    // log directory degrades to console-only; it never stops the migration.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_ansi(true);

    if std::fs::create_dir_all(&ctx.log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::daily(&ctx.log_dir, "ws1migrate.log");
        let (nb, guard) = tracing_appender::non_blocking(file_appender);
        let file = tracing_subscriber::fmt::layer().with_writer(nb).with_ansi(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(file)
            .with(console)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .init();
        eprintln!(
            "warning: could not create log directory {}; logging to console only",
            ctx.log_dir.display()
        );
        None
    }
}

pub fn main() -> Result<()> {
    let args = Args::parse();
    let ctx = Context::resolve(args)?;
    let _guard = init_logging(&ctx);

    info!(
        server = %ctx.server,
        org_group = %ctx.org_group,
        staging = %ctx.staging_dir.display(),
        "ws1migrate starting"
    );

    if !elevation::is_elevated() {
        warn!("{}", MigrationError::NeedsElevation);
        info!("relaunching elevated; this instance exits now");
        let forwarded: Vec<String> = std::env::args().skip(1).collect();
        elevation::relaunch_elevated(&forwarded)?;
        return Ok(());
    }

    let mut steps = HubSteps { ctx: &ctx };
    match coordinator::run(&mut steps, &ctx.run_options()) {
        Ok(()) => {
            info!("device migrated to {}", ctx.server);
            println!("\x1b[32mMigration completed successfully.\x1b[0m");
            Ok(())
        }
        Err(e @ MigrationError::Unreachable) => {
            error!(server = %ctx.server, port = ctx.settings.port, "{e}");
            Err(e.into())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}
