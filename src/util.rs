use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Lowercased extension without the dot, or "" when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}

const TRUNCATION_MARKER: &str = "... (truncated)";

/// Cut `text` to at most `max` bytes on a char boundary, marking the cut.
pub fn bound_diagnostic(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let marker = if max > TRUNCATION_MARKER.len() {
        TRUNCATION_MARKER
    } else {
        ""
    };
    let mut end = max - marker.len();
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], marker)
}

/// Search `$PATH` for `program` unless it already names a path.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = expand_tilde(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then_some(candidate);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

const PAGE_ORDER_PATTERN: &str =
    r"^(r?\d+|z|last)(-(r?\d+|z|last))?(:(odd|even))?(,(r?\d+|z|last)(-(r?\d+|z|last))?(:(odd|even))?)*$";

/// Validate a qpdf page range (`1,3,2,5-z`, `r1`, `2-last`) and return it in the
/// form qpdf accepts: whitespace removed, `last` spelled `z`.
pub fn normalize_page_order(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.to_ascii_lowercase();
    let re = Regex::new(PAGE_ORDER_PATTERN).ok()?;
    if !re.is_match(&compact) {
        return None;
    }
    if compact
        .split(|c: char| !c.is_ascii_digit())
        .any(|n| n.chars().all(|c| c == '0') && !n.is_empty())
    {
        return None;
    }
    Some(compact.replace("last", "z"))
}

/// Rotation in degrees; missing or 0 means a quarter turn clockwise. Anything that is
/// not a multiple of 90 is rejected.
pub fn normalize_angle(raw: Option<&str>) -> Option<i32> {
    let angle = match raw.map(str::trim) {
        None | Some("") => 0,
        Some(s) => s.parse::<i32>().ok()?,
    };
    match angle {
        0 => Some(90),
        a if a % 90 == 0 => Some(a),
        _ => None,
    }
}
