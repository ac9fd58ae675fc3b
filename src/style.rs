//! Stylesheet side effect: rewrites the two cover color declarations.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;

/// Applied when no hover color is available.
pub const FALLBACK_HOVER: &str = "rgba(170,160,120,0.5)";
/// Applied when no background color is available.
pub const FALLBACK_BACKGROUND: &str = "transparent";

const BACKGROUND_VARIABLE: &str = "music-bg";
const HOVER_VARIABLE: &str = "music-hover";

/// Rewrites the `@define-color music-bg` and `@define-color music-hover`
/// declarations in the stylesheet. Absent file is a no-op; the file is only
/// written back when its content actually changed, so file watchers on the
/// stylesheet are not spuriously triggered. The write goes through a temp
/// file plus rename, so a watcher never observes a half-written stylesheet.
/// Empty color values fall back to the neutral defaults. Returns whether the
/// file was rewritten.
pub fn update_style_colors(stylesheet: &Path, hover: &str, background: &str) -> io::Result<bool> {
    if !stylesheet.is_file() {
        return Ok(false);
    }

    let hover = if hover.is_empty() { FALLBACK_HOVER } else { hover };
    let background = if background.is_empty() {
        FALLBACK_BACKGROUND
    } else {
        background
    };

    let text = fs::read_to_string(stylesheet)?;
    let rewritten: Vec<String> = text
        .split('\n')
        .map(|line| {
            rewrite_define_color(line, BACKGROUND_VARIABLE, background)
                .or_else(|| rewrite_define_color(line, HOVER_VARIABLE, hover))
                .unwrap_or_else(|| line.to_string())
        })
        .collect();
    let rewritten = rewritten.join("\n");

    if rewritten == text {
        return Ok(false);
    }
    debug!("Rewriting cover colors in {}", stylesheet.display());
    let temp_path = stylesheet.with_extension("css.tmp");
    if temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    fs::write(&temp_path, rewritten)?;
    if let Err(error) = fs::rename(&temp_path, stylesheet) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }
    Ok(true)
}

/// Rebuilds a `@define-color <name> <value>;` line, preserving indentation.
/// Returns `None` when the line declares a different variable.
fn rewrite_define_color(line: &str, name: &str, value: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("@define-color")?;
    let declared = rest.trim_start();
    let tail = declared.strip_prefix(name)?;
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }
    let indent = &line[..line.len() - trimmed.len()];
    Some(format!("{indent}@define-color {name} {value};"))
}
