//! Workspace containment and Intent scope matching.
//!
//! Paths are resolved component by component: every prefix that exists on
//! disk is canonicalized (following symlinks) before the next component is
//! applied, so `link/../x` resolves the way the OS would. Components that do
//! not exist yet are applied lexically.

use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::path::{Component, Path, PathBuf};

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Where a path lands relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Inside {
        absolute: PathBuf,
        /// Relative to the workspace root; empty for the root itself.
        relative: PathBuf,
    },
    Escapes(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        };
        Self {
            root: canonicalize_existing(&absolute),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, target: &str) -> Resolved {
        let path = Path::new(target);
        let start = if path.is_absolute() {
            PathBuf::new()
        } else {
            self.root.clone()
        };
        let absolute = resolve_from(start, path);
        match absolute.strip_prefix(&self.root) {
            Ok(relative) => Resolved::Inside {
                relative: relative.to_path_buf(),
                absolute,
            },
            Err(_) => Resolved::Escapes(absolute),
        }
    }

    /// Whether an in-workspace path is covered by any scope entry.
    ///
    /// Entries containing glob metacharacters match the workspace-relative
    /// path (`*` does not cross `/`, `**` does). Plain entries cover the
    /// named file or everything under the named directory.
    pub fn in_scope(&self, absolute: &Path, relative: &Path, scope: &[String]) -> bool {
        scope.iter().any(|entry| {
            if entry.contains(GLOB_META) {
                match glob_matcher(entry) {
                    Some(matcher) => matcher.is_match(relative),
                    None => false,
                }
            } else {
                match self.resolve(entry) {
                    Resolved::Inside {
                        absolute: scoped, ..
                    } => absolute.starts_with(&scoped),
                    Resolved::Escapes(_) => false,
                }
            }
        })
    }
}

fn glob_matcher(pattern: &str) -> Option<GlobMatcher> {
    let pattern = pattern.trim_start_matches("./");
    match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "ignoring invalid scope glob");
            None
        }
    }
}

fn resolve_from(mut current: PathBuf, path: &Path) -> PathBuf {
    let mut on_disk = current.as_os_str().is_empty() || current.exists();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                current = PathBuf::from(prefix.as_os_str());
                on_disk = true;
            }
            Component::RootDir => {
                current.push(Component::RootDir.as_os_str());
                on_disk = true;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                current.pop();
            }
            Component::Normal(name) => {
                current.push(name);
                if on_disk {
                    match fs::canonicalize(&current) {
                        Ok(real) => current = real,
                        Err(_) => on_disk = false,
                    }
                }
            }
        }
    }
    current
}

fn canonicalize_existing(path: &Path) -> PathBuf {
    resolve_from(PathBuf::new(), path)
}
