//! `files`
//!
//! Naming and locking of stored designs.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use crate::error::JobError;

/// Reduces `name` to a safe SVG file name.
///
/// Only the final path component is kept and every character outside `[A-Za-z0-9._-]` becomes
/// `_`.
///
/// # Errors
/// [`JobError::InvalidFileName`] if nothing usable is left or the name does not end in `.svg`.
///
/// # Examples
/// ```
/// use plotterstudio::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../my logo.svg").unwrap(), "my_logo.svg");
/// assert!(sanitize_filename("notes.txt").is_err());
/// ```
pub fn sanitize_filename(name: &str) -> Result<String, JobError> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(JobError::InvalidFileName("Invalid filename".to_string()));
    }
    let is_svg = Path::new(&cleaned)
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("svg"));
    if !is_svg {
        return Err(JobError::InvalidFileName(
            "Only .svg files are supported".to_string(),
        ));
    }
    Ok(cleaned)
}

/// One mutex per file path, so read-modify-write cycles on the same file do not interleave.
///
/// Entries are never removed, so the registry grows by one small entry per distinct path.
#[derive(Debug, Default)]
pub struct FileLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        FileLocks::default()
    }

    /// Runs `f` while holding the lock for `path`.
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("logo.svg").unwrap(), "logo.svg");
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\Plot (1).SVG").unwrap(),
            "Plot__1_.SVG"
        );
        assert_eq!(sanitize_filename("/etc/ünï.svg").unwrap(), "_n_.svg");
    }

    #[test]
    fn test_sanitize_filename_rejects() {
        for name in ["", "dir/", "..", "drawing.png", "svg"] {
            assert!(
                matches!(sanitize_filename(name), Err(JobError::InvalidFileName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_same_path_is_serialized() {
        let locks = Arc::new(FileLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (locks, inside, overlaps) =
                    (Arc::clone(&locks), Arc::clone(&inside), Arc::clone(&overlaps));
                thread::spawn(move || {
                    locks.with_lock(Path::new("/data/a.svg"), || {
                        if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(10));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
