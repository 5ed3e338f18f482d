use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;

use stardoc::cli::Cli;
use stardoc::config::{self, Mode, Settings};
use stardoc::server::ServerHandle;
use stardoc::ui::{error_print, warn_print};
use stardoc::{
    browser, builder, exporter, processor, template, CleanupManager, DevServer,
    PackageManager, Readiness, SharedCache, SignalHandler, StardocError, StaticServer,
    WaitOutcome, Workspace,
};

fn main() -> ExitCode {
    // Usage errors exit 1 like every other fatal error; help and version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };
    if let Some(mode) = cli.color {
        stardoc::set_color_mode(mode);
    }
    stardoc::logging::init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error_print(&render_error(&e));
            let code = e
                .downcast_ref::<StardocError>()
                .map(StardocError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code.max(1))
        }
    }
}

/// Context chain joined with `: `, stopping at the first `StardocError`, whose
/// message already carries its own cause.
fn render_error(e: &anyhow::Error) -> String {
    let mut parts = Vec::new();
    for cause in e.chain() {
        parts.push(cause.to_string());
        if cause.is::<StardocError>() {
            break;
        }
    }
    parts.join(": ")
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let settings = Settings::from_cli(cli)?;
    tracing::debug!(?settings, "settings resolved");

    let cache = SharedCache::new(&settings.home);
    cache.ensure_directories()?;
    match cache.cleanup_old_runs(settings.run_retention) {
        Ok(sweep) => {
            for (path, err) in sweep.failed {
                warn_print(&format!("failed to remove old run {}: {err}", path.display()));
            }
        }
        Err(e) => warn_print(&format!("failed to cleanup old runs: {e}")),
    }

    let pm = match settings.package_manager {
        Some(pm) => pm,
        None => PackageManager::detect()?,
    };
    ensure_shared_install(&cache, pm, &settings)?;

    let run_id = cache.generate_run_id();
    let ws = Workspace::create(cache.run_dir(&run_id), cache.shared_dir())?;
    if let Err(e) = ws.setup() {
        let _ = ws.cleanup();
        return Err(e.into());
    }
    println!("📦 Workspace: {}", ws.path().display());

    // From here on every exit path goes through the cleanup manager.
    let cleanup = Arc::new(CleanupManager::new(ws));
    let signals = Arc::new(SignalHandler::new(Arc::clone(&cleanup)));
    let result = signals
        .install()
        .map_err(anyhow::Error::from)
        .and_then(|()| run_in_workspace(&settings, pm, &cleanup, &signals));
    if let Err(e) = &result {
        if signals.shutdown_requested() {
            // Fallout of the interrupt (the build was stopped under us). The
            // supervisor exits once cleanup is done.
            tracing::debug!(error = %e, "run ended during shutdown");
            signals.wait();
            return Ok(ExitCode::SUCCESS);
        }
        cleanup.cleanup();
    }
    result
}

/// Extract the template and install dependencies unless the shared install is current.
fn ensure_shared_install(
    cache: &SharedCache,
    pm: PackageManager,
    settings: &Settings,
) -> anyhow::Result<()> {
    let hash = template::package_hash();
    if !settings.force_reinstall && cache.is_current(&hash)? {
        tracing::debug!(%hash, "shared install is current");
        return Ok(());
    }
    let lock = cache.acquire_lock()?;
    template::extract_to_shared(&cache.shared_dir())
        .context("failed to extract template")?;
    cache.install(pm, settings.verbose)?;
    cache.save_version(&hash)?;
    lock.release()?;
    Ok(())
}

fn run_in_workspace(
    settings: &Settings,
    pm: PackageManager,
    cleanup: &Arc<CleanupManager>,
    signals: &Arc<SignalHandler>,
) -> anyhow::Result<ExitCode> {
    let ws_path = cleanup
        .workspace_path()
        .context("cleanup manager has no workspace")?;
    let docs_dir = cleanup
        .workspace()
        .map(Workspace::docs_dir)
        .context("cleanup manager has no workspace")?;

    template::extract_config_only(&ws_path).context("failed to extract config")?;
    let title = settings
        .title
        .clone()
        .unwrap_or_else(|| template::generate_title(&settings.source_dir));
    template::generate_config(&ws_path, &title).context("failed to generate config")?;

    processor::process(&settings.source_dir, &docs_dir)?;

    match &settings.mode {
        Mode::Export(dest) => {
            let dist = builder::build(&ws_path, pm, settings.verbose, cleanup)?;
            exporter::export(&dist, dest)?;
            cleanup.cleanup();
            Ok(ExitCode::SUCCESS)
        }
        Mode::Serve => {
            let dist = builder::build(&ws_path, pm, settings.verbose, cleanup)?;
            let server = Arc::new(StaticServer::start(
                &dist,
                settings.port,
                config::STATIC_READY_TIMEOUT,
            )?);
            cleanup.register_server(server.clone());
            open_browser(settings, &server.url());
            println!("\nPress Ctrl+C to exit");
            signals.wait();
            Ok(ExitCode::SUCCESS)
        }
        Mode::Dev => {
            let server = Arc::new(DevServer::start(
                pm,
                &ws_path,
                settings.port,
                config::TERMINATE_WAIT,
            )?);
            cleanup.register_server(server.clone());
            match server.wait_ready(settings.ready_timeout) {
                Readiness::Ready(port) => println!("Server ready at http://localhost:{port}"),
                Readiness::Assumed(_) => println!("Server detection timed out, assuming ready"),
            }
            open_browser(settings, &server.url());
            println!("\nPress Ctrl+C to exit");
            let alive = Arc::clone(&server);
            match signals.wait_while(move || alive.is_running(), Duration::from_millis(250)) {
                WaitOutcome::Shutdown => Ok(ExitCode::SUCCESS),
                WaitOutcome::ConditionEnded if server.was_stopped() || signals.is_shutdown() => {
                    // Stopped by a signal-driven cleanup; that path decides the exit.
                    signals.wait();
                    Ok(ExitCode::SUCCESS)
                }
                WaitOutcome::ConditionEnded => {
                    let status = server.wait_exit();
                    Err(anyhow::anyhow!(
                        "dev server exited unexpectedly{}",
                        status
                            .and_then(|s| s.code())
                            .map(|c| format!(" with status {c}"))
                            .unwrap_or_default()
                    ))
                }
            }
        }
    }
}

fn open_browser(settings: &Settings, url: &str) {
    if settings.open_browser {
        browser::open_or_warn(url, config::BROWSER_TIMEOUT);
    } else {
        println!("(browser not opened due to --no-open flag)");
    }
}
