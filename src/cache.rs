//! Content-addressed cover cache in the session runtime directory.
//!
//! The cache is single-writer by construction: only the sequential watch
//! loop mutates it. Running two daemon instances against the same directory
//! is unsupported; no file lock is taken.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use log::debug;

use crate::palette::ColorPair;

/// 1x1 fully transparent PNG, embedded so the placeholder can be recreated
/// in any fresh runtime directory.
const TRANSPARENT_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAAC0lEQVR4nGNgAAIAAAUAAXpeqz8AAAAASUVORK5CYII=";

const CURRENT_COVER_FILE: &str = "current_cover.txt";
const PLACEHOLDER_FILE: &str = "transparent.1x1.png";
const PID_FILE: &str = "daemon.pid";

/// Deterministic cache key for an art-URL string: the md5 hex digest of the
/// raw value, used as the filename stem for every derived file.
pub fn cache_key(art_reference: &str) -> String {
    format!("{:x}", md5::compute(art_reference.as_bytes()))
}

pub struct CoverCache {
    root: PathBuf,
    square_side: u32,
}

impl CoverCache {
    /// Creates the cache directory. Failure here is the one fatal startup
    /// error of the daemon.
    pub fn create(root: PathBuf, square_side: u32) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root, square_side })
    }

    /// Session runtime directory when available, otherwise a uid-scoped
    /// directory under the system tmp dir. Either way the cache lives and
    /// dies with the host session, never surviving a reboot.
    pub fn default_root(dir_name: &str) -> PathBuf {
        if let Some(runtime_dir) = dirs::runtime_dir() {
            if runtime_dir.is_dir() {
                return runtime_dir.join(dir_name);
            }
        }
        let uid = unsafe { libc::getuid() };
        std::env::temp_dir().join(format!("{dir_name}-{uid}"))
    }

    pub fn square_side(&self) -> u32 {
        self.square_side
    }

    pub fn square_image_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{key}.square.{}.png", self.square_side))
    }

    pub fn color_memo_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.colors"))
    }

    /// Cache hit: the square image already exists, so resolution and
    /// normalization can be skipped entirely.
    pub fn has(&self, key: &str) -> bool {
        self.square_image_path(key).is_file()
    }

    /// Returns the memoized color pair for a key, if one was persisted.
    pub fn read_colors(&self, key: &str) -> Option<ColorPair> {
        let text = fs::read_to_string(self.color_memo_path(key)).ok()?;
        let mut lines = text.lines();
        let hover = lines.next()?.to_string();
        let background = lines.next()?.to_string();
        Some(ColorPair { hover, background })
    }

    pub fn write_colors(&self, key: &str, pair: &ColorPair) -> io::Result<()> {
        fs::write(
            self.color_memo_path(key),
            format!("{}\n{}\n", pair.hover, pair.background),
        )
    }

    pub fn placeholder_path(&self) -> PathBuf {
        self.root.join(PLACEHOLDER_FILE)
    }

    /// Writes the transparent 1x1 placeholder once; later calls are no-ops.
    pub fn ensure_placeholder(&self) -> io::Result<PathBuf> {
        let path = self.placeholder_path();
        if path.exists() {
            return Ok(path);
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(TRANSPARENT_PNG_BASE64)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn current_cover_path(&self) -> PathBuf {
        self.root.join(CURRENT_COVER_FILE)
    }

    /// Overwrites the pointer file external readers consult. The referenced
    /// path must always name an existing file.
    pub fn set_current_cover(&self, cover_path: &Path) -> io::Result<()> {
        fs::write(self.current_cover_path(), cover_path.display().to_string())
    }

    pub fn write_pid_file(&self) -> io::Result<()> {
        fs::write(self.root.join(PID_FILE), std::process::id().to_string())
    }

    pub fn remove_pid_file(&self) {
        let path = self.root.join(PID_FILE);
        if let Err(error) = fs::remove_file(&path) {
            if error.kind() != io::ErrorKind::NotFound {
                debug!("Failed to remove {}: {error}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{cache_key, CoverCache};
    use crate::palette::ColorPair;
    use image::GenericImageView;
    use std::fs;

    fn cache() -> (tempfile::TempDir, CoverCache) {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CoverCache::create(dir.path().join("covers"), 18).expect("create cache");
        (dir, cache)
    }

    #[test]
    fn test_cache_key_is_deterministic_and_distinct() {
        assert_eq!(cache_key("https://a/art.jpg"), cache_key("https://a/art.jpg"));
        assert_ne!(cache_key("https://a/art.jpg"), cache_key("https://a/art.jpG"));
        assert_eq!(cache_key("x").len(), 32);
    }

    #[test]
    fn test_derived_paths_share_the_key_stem() {
        let (_dir, cache) = cache();
        let key = cache_key("some-art");
        let square = cache.square_image_path(&key);
        let memo = cache.color_memo_path(&key);
        assert!(square.to_string_lossy().ends_with(&format!("{key}.square.18.png")));
        assert!(memo.to_string_lossy().ends_with(&format!("{key}.colors")));
        assert!(!cache.has(&key));
    }

    #[test]
    fn test_color_memo_read_write() {
        let (_dir, cache) = cache();
        let key = cache_key("some-art");
        assert!(cache.read_colors(&key).is_none());

        let pair = ColorPair {
            hover: "rgba(1,2,3,1.000)".to_string(),
            background: "rgba(4,5,6,1.000)".to_string(),
        };
        cache.write_colors(&key, &pair).expect("memo write");
        assert_eq!(cache.read_colors(&key), Some(pair));
    }

    #[test]
    fn test_placeholder_is_a_decodable_transparent_pixel() {
        let (_dir, cache) = cache();
        let path = cache.ensure_placeholder().expect("placeholder write");
        let decoded = image::open(&path).expect("placeholder should decode");
        assert_eq!(decoded.dimensions(), (1, 1));
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0)[3], 0);

        // Second call leaves the existing file alone.
        let again = cache.ensure_placeholder().expect("placeholder lookup");
        assert_eq!(path, again);
    }

    #[test]
    fn test_current_cover_pointer_is_overwritten() {
        let (_dir, cache) = cache();
        cache
            .set_current_cover(&cache.placeholder_path())
            .expect("pointer write");
        cache
            .set_current_cover(&cache.square_image_path("abc"))
            .expect("pointer overwrite");
        let text = fs::read_to_string(cache.current_cover_path()).expect("pointer read");
        assert_eq!(text, cache.square_image_path("abc").display().to_string());
    }

    #[test]
    fn test_pid_file_lifecycle() {
        let (dir, cache) = cache();
        cache.write_pid_file().expect("pid write");
        let pid_path = dir.path().join("covers").join("daemon.pid");
        let recorded = fs::read_to_string(&pid_path).expect("pid read");
        assert_eq!(recorded, std::process::id().to_string());

        cache.remove_pid_file();
        assert!(!pid_path.exists());
        // Removing twice must stay quiet.
        cache.remove_pid_file();
    }
}
