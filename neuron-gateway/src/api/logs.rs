//! Basename-restricted log file access (§6 "`/api/logs`", §12).
//!
//! File names arriving over HTTP are resolved under the logs directory and
//! rejected outright if they carry a path separator or a `..` component —
//! there is no canonicalize-then-compare step to get subtly wrong, the
//! input just isn't a path.

use std::path::{Path, PathBuf};

/// Resolves `requested` to a path inside `logs_dir`. Returns `None` if
/// `requested` isn't a bare file name (carries a separator or is `..`),
/// which the caller renders as a 403.
#[must_use]
pub fn resolve(logs_dir: &Path, requested: &str) -> Option<PathBuf> {
    if requested.is_empty() || requested == "." || requested == ".." {
        return None;
    }
    if requested.contains('/') || requested.contains('\\') {
        return None;
    }
    Some(logs_dir.join(requested))
}

/// Lists log file basenames present in `logs_dir`, sorted. A missing
/// directory is treated as empty rather than an error.
pub fn list_files(logs_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = match std::fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_file_name_resolves_under_logs_dir() {
        let dir = Path::new("/var/log/neuron-gateway");
        assert_eq!(resolve(dir, "gateway.log"), Some(dir.join("gateway.log")));
    }

    #[test]
    fn traversal_attempts_are_rejected() {
        let dir = Path::new("/var/log/neuron-gateway");
        assert_eq!(resolve(dir, "../config.json"), None);
        assert_eq!(resolve(dir, "..").as_deref(), None);
        assert_eq!(resolve(dir, "sub/file.log"), None);
        assert_eq!(resolve(dir, "sub\\file.log"), None);
    }

    #[test]
    fn empty_name_is_rejected() {
        let dir = Path::new("/var/log/neuron-gateway");
        assert_eq!(resolve(dir, ""), None);
    }

    #[test]
    fn missing_logs_dir_lists_as_empty() {
        let dir = Path::new("/nonexistent/definitely/neuron-gateway-logs");
        assert_eq!(list_files(dir).unwrap(), Vec::<String>::new());
    }
}
