mod art_reference;
mod cache;
mod config;
mod normalize;
mod notify;
mod palette;
mod resolver;
mod style;
mod watch;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;

use cache::CoverCache;
use config::{sanitize_config, Config};
use notify::NotificationSink;
use resolver::ArtResolver;
use watch::WatchLoop;

fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let config_dir = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
    let config_file = config_dir.join("coverd.toml");

    if !config_file.exists() {
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(&config_file, toml::to_string(&default_config)?)?;
    }

    let config_content = std::fs::read_to_string(&config_file)?;
    Ok(sanitize_config(
        toml::from_str::<Config>(&config_content).unwrap_or_default(),
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = load_config()?;

    // The one fatal startup condition: no cache directory, no daemon.
    let cache_root = CoverCache::default_root(&config.cache.dir_name);
    let cache = CoverCache::create(cache_root.clone(), config.cache.square_side)?;
    info!("Cover cache at {}", cache_root.display());

    let shutdown = Arc::new(AtomicBool::new(false));
    let follow_pid = Arc::new(AtomicU32::new(0));
    {
        let shutdown = Arc::clone(&shutdown);
        let follow_pid = Arc::clone(&follow_pid);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            // Terminate the follow subprocess so the blocked stream read
            // returns and the loop can exit.
            let pid = follow_pid.load(Ordering::SeqCst);
            if pid != 0 {
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        })?;
    }

    let resolver = ArtResolver::new(
        Duration::from_millis(config.download.timeout_ms),
        config.download.max_bytes as usize,
    );
    let notifier = NotificationSink::new(config.notify.process.clone(), config.notify.rtmin_offset);
    let watch = WatchLoop::new(
        config.player.command.clone(),
        PathBuf::from(&config.style.stylesheet_path),
        cache,
        resolver,
        notifier,
        shutdown,
        follow_pid,
    );
    watch.run()?;

    info!("coverd exiting");
    Ok(())
}
