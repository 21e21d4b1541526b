#![cfg_attr(windows, windows_subsystem = "windows")]

mod catalog;
mod config;
mod display;
mod engine;
mod logging;
mod monitors;
mod paths;
mod runtime;
mod scheduler;
mod transform;

#[cfg(windows)]
fn main() {
    if let Err(e) = run() {
        error!("[MAIN] Fatal: {e}");
        std::process::exit(1);
    }
}

#[cfg(windows)]
fn run() -> Result<(), String> {
    use std::{
        fs, thread,
        time::{Duration, Instant, SystemTime},
    };

    use crate::config::Config;
    use crate::display::DesktopWallpaper;
    use crate::runtime::{RotatorRuntime, ScanWorker};

    let config_path = paths::config_path();
    let mut config = Config::load(&config_path).unwrap_or_default();

    logging::init(config.debug);
    std::panic::set_hook(Box::new(|panic_info| {
        error!("[MAIN] Panic: {panic_info}");
    }));

    info!("!---------- Starting Wallpaper Rotator ----------!");
    info!("[MAIN] Config: {}", config_path.display());

    let surface = DesktopWallpaper::new()?;
    let detected = monitors::enumerate(&surface)?;
    for monitor in &detected {
        info!(
            "[MAIN] Monitor {}: {}x{} ({})",
            monitor.id,
            monitor.width,
            monitor.height,
            monitor.orientation()
        );
    }

    // First run: activate every detected monitor with its physical
    // orientation so rotation works before the user edits anything.
    if config.active_monitors.is_empty() {
        for monitor in &detected {
            config
                .active_monitors
                .insert(monitor.id.clone(), monitor.orientation());
        }
        if let Err(e) = config.save(&config_path) {
            warn!("[MAIN] Could not write initial config: {e}");
        }
    }

    let mut rng = rand::rng();
    let mut runtime = RotatorRuntime::new(surface, &detected, &config);
    let mut scans = ScanWorker::new();

    if let Some(root) = runtime.wallpaper_root().cloned() {
        scans.request(root, runtime.matching_enabled());
    } else {
        warn!("[MAIN] No wallpaper directory configured; waiting for config");
    }

    // Defer the first rotation until the initial scan lands so it has a
    // pool to draw from.
    let mut pending_start = config.auto_start_on_launch;

    let loop_sleep = Duration::from_millis(250);
    let watcher_interval = Duration::from_secs(2);
    let mut last_watch_tick = Instant::now();
    let mut last_config_modified: Option<SystemTime> = fs::metadata(&config_path)
        .and_then(|m| m.modified())
        .ok();

    loop {
        if let Some(pool) = scans.poll() {
            runtime.apply_scan(pool);
        }

        if pending_start && !scans.in_flight() {
            pending_start = false;
            runtime.start(Instant::now(), &mut rng);
        }

        runtime.poll(Instant::now(), &mut rng);

        if last_watch_tick.elapsed() >= watcher_interval {
            last_watch_tick = Instant::now();

            let current_modified = fs::metadata(&config_path)
                .and_then(|m| m.modified())
                .ok();
            let changed = match (last_config_modified, current_modified) {
                (Some(prev), Some(curr)) => curr > prev,
                (None, Some(_)) => true,
                _ => false,
            };

            if changed {
                match Config::load(&config_path) {
                    Some(new_config) => {
                        logging::set_debug(new_config.debug);
                        let directory_changed = runtime.apply_config(&new_config);
                        info!("[WATCHER] Reloaded config from {}", config_path.display());

                        if directory_changed {
                            if let Some(root) = runtime.wallpaper_root().cloned() {
                                scans.request(root, runtime.matching_enabled());
                            }
                        }

                        // The saved flag doubles as the headless run switch
                        if new_config.auto_start_on_launch && !runtime.running() {
                            pending_start = true;
                        } else if !new_config.auto_start_on_launch && runtime.running() {
                            runtime.stop();
                        }
                    }
                    None => {
                        warn!(
                            "[WATCHER] Config changed but failed to parse {}; keeping previous settings",
                            config_path.display()
                        );
                    }
                }
                last_config_modified = current_modified;
            }
        }

        thread::sleep(loop_sleep);
    }
}

#[cfg(not(windows))]
fn main() {
    eprintln!("This wallpaper rotator drives the Windows desktop and only runs on Windows.");
    std::process::exit(1);
}
