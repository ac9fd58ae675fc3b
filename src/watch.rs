//! Watch loop: streams art-URL changes from the player and drives the
//! resolve -> normalize -> cache -> palette -> style -> notify pipeline once
//! per distinct change, plus once at startup.
//!
//! The loop is strictly sequential: a single blocking read on the follow
//! subprocess drives everything, so no two pipeline runs ever overlap.

use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::cache::{cache_key, CoverCache};
use crate::normalize::{decode_image, normalize_to_square, write_square_png_atomic};
use crate::notify::NotificationSink;
use crate::palette::{self, ColorPair};
use crate::resolver::{ArtResolver, ResolveError};
use crate::style::update_style_colors;

const ART_URL_FORMAT: &str = "{{mpris:artUrl}}";

/// Queries the current art URL once. A missing player or a failed command
/// simply means "no art".
pub fn query_current_art_url(player_command: &str) -> String {
    let output = Command::new(player_command)
        .args(["metadata", "--format", ART_URL_FORMAT])
        .stderr(Stdio::null())
        .output();
    match output {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .trim()
            .to_string(),
        Ok(_) => String::new(),
        Err(error) => {
            debug!("One-shot metadata query failed: {error}");
            String::new()
        }
    }
}

/// Suppresses consecutive identical art-URL values. The startup run happens
/// before any value is recorded, so the first streamed value always passes.
#[derive(Debug, Default)]
pub struct Deduper {
    last: Option<String>,
}

impl Deduper {
    pub fn accept(&mut self, value: &str) -> bool {
        if self.last.as_deref() == Some(value) {
            return false;
        }
        self.last = Some(value.to_string());
        true
    }
}

/// Removes the PID marker on every exit path of the loop.
struct PidFileGuard<'a> {
    cache: &'a CoverCache,
}

impl Drop for PidFileGuard<'_> {
    fn drop(&mut self) {
        self.cache.remove_pid_file();
    }
}

pub struct WatchLoop {
    player_command: String,
    stylesheet: PathBuf,
    cache: CoverCache,
    resolver: ArtResolver,
    notifier: NotificationSink,
    shutdown: Arc<AtomicBool>,
    /// PID of the running follow subprocess, readable from the interrupt
    /// handler so it can unblock the stream read. Zero means not running.
    follow_pid: Arc<AtomicU32>,
}

impl WatchLoop {
    pub fn new(
        player_command: String,
        stylesheet: PathBuf,
        cache: CoverCache,
        resolver: ArtResolver,
        notifier: NotificationSink,
        shutdown: Arc<AtomicBool>,
        follow_pid: Arc<AtomicU32>,
    ) -> Self {
        Self {
            player_command,
            stylesheet,
            cache,
            resolver,
            notifier,
            shutdown,
            follow_pid,
        }
    }

    pub fn run(&self) -> io::Result<()> {
        if let Err(error) = self.cache.write_pid_file() {
            warn!("Failed to write PID marker: {error}");
        }
        let _pid_guard = PidFileGuard { cache: &self.cache };

        if let Err(error) = self.cache.ensure_placeholder() {
            warn!("Failed to create placeholder image: {error}");
        }

        // Startup run, unconditionally, with whatever is currently playing.
        self.refresh(&query_current_art_url(&self.player_command));
        self.notifier.notify();

        let mut child = Command::new(&self.player_command)
            .args(["metadata", "--follow", "--format", ART_URL_FORMAT])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        self.follow_pid.store(child.id(), Ordering::SeqCst);

        let Some(stdout) = child.stdout.take() else {
            self.follow_pid.store(0, Ordering::SeqCst);
            let _ = child.kill();
            let _ = child.wait();
            return Ok(());
        };

        info!("Watching {} for art-URL changes", self.player_command);
        let mut deduper = Deduper::default();
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let Ok(line) = line else {
                break;
            };
            let art = line.trim();
            if !deduper.accept(art) {
                continue;
            }
            self.refresh(art);
            self.notifier.notify();
        }

        self.follow_pid.store(0, Ordering::SeqCst);
        let _ = child.kill();
        let _ = child.wait();
        info!("Art-URL stream closed, watch loop exiting");
        Ok(())
    }

    /// One pipeline pass for one art-URL value. Every failure funnels into
    /// the placeholder fallback; nothing here is fatal to the daemon.
    pub fn refresh(&self, art: &str) {
        match self.refresh_inner(art) {
            Ok(square_path) => debug!("Published cover {}", square_path.display()),
            Err(error) => {
                debug!("No usable cover ({error}), publishing placeholder");
                self.publish_placeholder();
            }
        }
    }

    fn refresh_inner(&self, art: &str) -> Result<PathBuf, ResolveError> {
        if art.is_empty() {
            return Err(ResolveError::NoArt);
        }

        let key = cache_key(art);
        let square_path = self.cache.square_image_path(&key);
        if !self.cache.has(&key) {
            let bytes = self.resolver.resolve(art)?;
            let decoded = decode_image(&bytes)?;
            let square = normalize_to_square(decoded, self.cache.square_side());
            write_square_png_atomic(&square, &square_path).ok_or(ResolveError::DecodeError)?;
        }

        let pair = self
            .colors_for(&key, &square_path)
            .ok_or(ResolveError::DecodeError)?;
        self.apply_style(&pair.hover, &pair.background);
        if let Err(error) = self.cache.set_current_cover(&square_path) {
            warn!("Failed to update cover pointer: {error}");
        }
        Ok(square_path)
    }

    /// Cache-aside palette lookup: memoized pair when present, otherwise
    /// compute from the square image and persist.
    fn colors_for(&self, key: &str, square_path: &Path) -> Option<ColorPair> {
        if let Some(pair) = self.cache.read_colors(key) {
            return Some(pair);
        }
        let image = match image::open(square_path) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(error) => {
                debug!("Cached square {} unreadable: {error}", square_path.display());
                return None;
            }
        };
        let pair = palette::extract_pair(&image);
        if let Err(error) = self.cache.write_colors(key, &pair) {
            warn!("Failed to memoize colors for {key}: {error}");
        }
        Some(pair)
    }

    fn publish_placeholder(&self) {
        self.apply_style("transparent", "transparent");
        match self.cache.ensure_placeholder() {
            Ok(placeholder) => {
                if let Err(error) = self.cache.set_current_cover(&placeholder) {
                    warn!("Failed to point at placeholder: {error}");
                }
            }
            Err(error) => warn!("Placeholder unavailable: {error}"),
        }
    }

    fn apply_style(&self, hover: &str, background: &str) {
        if let Err(error) = update_style_colors(&self.stylesheet, hover, background) {
            warn!(
                "Failed to rewrite stylesheet {}: {error}",
                self.stylesheet.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Deduper, WatchLoop};
    use crate::cache::{cache_key, CoverCache};
    use crate::notify::NotificationSink;
    use crate::resolver::ArtResolver;
    use image::{GenericImageView, Rgba, RgbaImage};
    use std::fs;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn watch_loop(root: &Path) -> WatchLoop {
        let cache = CoverCache::create(root.join("covers"), 18).expect("create cache");
        WatchLoop::new(
            "playerctl".to_string(),
            root.join("style.css"),
            cache,
            ArtResolver::new(Duration::from_millis(100), 1_048_576),
            NotificationSink::new("no-such-process".to_string(), 5),
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicU32::new(0)),
        )
    }

    fn seed_source_image(path: &Path) {
        let image = RgbaImage::from_fn(64, 48, |x, _| {
            if x < 32 {
                Rgba([200, 30, 30, 255])
            } else {
                Rgba([30, 30, 200, 255])
            }
        });
        image.save(path).expect("seed source image");
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    #[test]
    fn test_deduper_counts_distinct_changes_only() {
        let mut deduper = Deduper::default();
        let events = ["A", "A", "A", "B", "B", ""];
        let accepted = events.iter().filter(|value| deduper.accept(value)).count();
        assert_eq!(accepted, 3);
    }

    #[test]
    fn test_refresh_with_local_art_publishes_square_and_colors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("album.png");
        seed_source_image(&source);

        let watch = watch_loop(dir.path());
        let art = file_url(&source);
        watch.refresh(&art);

        let key = cache_key(&art);
        let square_path = dir
            .path()
            .join("covers")
            .join(format!("{key}.square.18.png"));
        let square = image::open(&square_path).expect("square image should exist");
        assert_eq!(square.dimensions(), (18, 18));

        let colors = fs::read_to_string(dir.path().join("covers").join(format!("{key}.colors")))
            .expect("color memo should exist");
        let lines: Vec<&str> = colors.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.starts_with("rgba(") && line.ends_with(",1.000)")));

        let pointer = fs::read_to_string(dir.path().join("covers").join("current_cover.txt"))
            .expect("pointer should exist");
        assert_eq!(pointer, square_path.display().to_string());
    }

    #[test]
    fn test_refresh_twice_is_idempotent_and_hits_the_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("album.png");
        seed_source_image(&source);

        let watch = watch_loop(dir.path());
        let art = file_url(&source);
        watch.refresh(&art);

        let key = cache_key(&art);
        let square_path = dir
            .path()
            .join("covers")
            .join(format!("{key}.square.18.png"));
        let first_bytes = fs::read(&square_path).expect("first square read");
        let first_colors = fs::read_to_string(dir.path().join("covers").join(format!("{key}.colors")))
            .expect("first memo read");

        // Remove the source: a second pass must succeed purely from cache.
        fs::remove_file(&source).expect("remove source");
        watch.refresh(&art);

        assert_eq!(fs::read(&square_path).expect("second square read"), first_bytes);
        assert_eq!(
            fs::read_to_string(dir.path().join("covers").join(format!("{key}.colors")))
                .expect("second memo read"),
            first_colors
        );
    }

    #[test]
    fn test_refresh_with_no_art_publishes_placeholder_and_clears_style() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stylesheet = dir.path().join("style.css");
        fs::write(
            &stylesheet,
            "@define-color music-bg rgba(1,1,1,1.000);\n@define-color music-hover rgba(2,2,2,1.000);\n",
        )
        .expect("seed stylesheet");

        let watch = watch_loop(dir.path());
        watch.refresh("");

        let pointer = fs::read_to_string(dir.path().join("covers").join("current_cover.txt"))
            .expect("pointer should exist");
        let placeholder = dir.path().join("covers").join("transparent.1x1.png");
        assert_eq!(pointer, placeholder.display().to_string());
        assert!(placeholder.is_file());

        let style = fs::read_to_string(&stylesheet).expect("stylesheet read");
        assert!(style.contains("@define-color music-bg transparent;"));
        assert!(style.contains("@define-color music-hover transparent;"));
    }

    #[test]
    fn test_refresh_with_unresolvable_art_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let watch = watch_loop(dir.path());
        watch.refresh("file:///definitely/not/here.png");

        let pointer = fs::read_to_string(dir.path().join("covers").join("current_cover.txt"))
            .expect("pointer should exist");
        let placeholder = dir.path().join("covers").join("transparent.1x1.png");
        assert_eq!(pointer, placeholder.display().to_string());

        // No partial square file may be left behind.
        let key = cache_key("file:///definitely/not/here.png");
        assert!(!dir
            .path()
            .join("covers")
            .join(format!("{key}.square.18.png"))
            .exists());
    }

    #[test]
    fn test_refresh_with_over_budget_download_falls_back_without_partial_square() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CoverCache::create(dir.path().join("covers"), 18).expect("create cache");
        let watch = WatchLoop::new(
            "playerctl".to_string(),
            dir.path().join("style.css"),
            cache,
            ArtResolver::new(Duration::from_secs(2), 256),
            NotificationSink::new("no-such-process".to_string(), 5),
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicU32::new(0)),
        );

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let port = listener.local_addr().expect("local addr").port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 512\r\nConnection: close\r\n\r\n",
                );
                let _ = stream.write_all(&[0x42; 512]);
            }
        });

        let art = format!("http://127.0.0.1:{port}/cover.png");
        watch.refresh(&art);

        let pointer = fs::read_to_string(dir.path().join("covers").join("current_cover.txt"))
            .expect("pointer should exist");
        let placeholder = dir.path().join("covers").join("transparent.1x1.png");
        assert_eq!(pointer, placeholder.display().to_string());

        let key = cache_key(&art);
        assert!(!dir
            .path()
            .join("covers")
            .join(format!("{key}.square.18.png"))
            .exists());
    }
}
