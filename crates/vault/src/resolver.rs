//! Untrusted path resolution against a trusted root.
//!
//! Every path received from the network is an attacker-controlled string.
//! The resolver joins it onto the serving root with lexical normalization,
//! optionally evaluates symlinks down to the real filesystem entry, and
//! verifies the result stays confined to the root before any file I/O
//! happens.

use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors produced while resolving an untrusted request path.
///
/// Each variant keeps the original untrusted input plus whatever
/// intermediate forms were computed before the failure, so the logging
/// boundary can record a full audit trail. None of this detail is ever sent
/// to the peer.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The joined path could not be made absolute.
    #[error("cannot make {requested:?} absolute")]
    Absolute {
        /// The untrusted input as received.
        requested: String,
        /// The lexically joined form.
        joined: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Symlink evaluation failed: missing target, loop, or permission
    /// denied.
    #[error("cannot evaluate {requested:?} to a real filesystem entry")]
    Evaluate {
        /// The untrusted input as received.
        requested: String,
        /// The absolute form that was being evaluated.
        absolute: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The resolved path is not confined to the trusted root.
    #[error("{requested:?} resolves outside the serving root")]
    OutsideRoot {
        /// The untrusted input as received.
        requested: String,
        /// The absolute form before symlink evaluation.
        absolute: PathBuf,
        /// The symlink-evaluated form, when evaluation ran.
        evaluated: Option<PathBuf>,
    },
}

impl ResolveError {
    /// Short reason code for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Absolute { .. } => "abs_failed",
            Self::Evaluate { .. } => "eval_failed",
            Self::OutsideRoot { .. } => "outside_root",
        }
    }
}

/// Resolves untrusted request paths into locations confined to one root.
///
/// The root is fixed at construction and never mutated, so a resolver can be
/// shared freely across concurrently dispatched requests, and multiple
/// independent resolvers can coexist in one process.
///
/// Request paths that look absolute are silently reinterpreted as relative
/// to the root: a request for `/etc/passwd` names `<root>/etc/passwd`, never
/// the real `/etc/passwd`. This matches how TFTP servers are commonly
/// deployed; rejecting rooted requests outright would be the stricter
/// policy, pending a product decision.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver serving `root`.
    ///
    /// The root is canonicalized here so that later containment checks
    /// compare symlink-free forms on both sides. Fails if the root does not
    /// exist or is not a directory.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("serving root {} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// The canonical trusted root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an untrusted request path to a confined absolute path.
    ///
    /// With `evaluate_symlinks` the target must already exist and is
    /// resolved down to the real entry before the containment check, so a
    /// link inside the root pointing outside is refused. Upload handling
    /// skips evaluation because the target does not exist yet.
    ///
    /// The returned path is computed fresh per request and never cached; it
    /// can go stale if the filesystem changes between resolution and use
    /// (accepted race, bounded by the engine's timeout policy).
    pub fn resolve(
        &self,
        requested: &str,
        evaluate_symlinks: bool,
    ) -> Result<PathBuf, ResolveError> {
        let joined = lexical_join(&self.root, Path::new(requested));

        let absolute = if joined.is_absolute() {
            joined
        } else {
            // Only reachable when the process cwd is involved; current_dir
            // can legitimately be unresolvable (deleted directory).
            match env::current_dir() {
                Ok(cwd) => cwd.join(&joined),
                Err(source) => {
                    return Err(ResolveError::Absolute {
                        requested: requested.to_owned(),
                        joined,
                        source,
                    })
                }
            }
        };

        let evaluated = if evaluate_symlinks {
            match fs::canonicalize(&absolute) {
                Ok(real) => Some(real),
                Err(source) => {
                    return Err(ResolveError::Evaluate {
                        requested: requested.to_owned(),
                        absolute,
                        source,
                    })
                }
            }
        } else {
            None
        };

        // Component-wise ancestor check: a root of /data does not accept
        // /data-secret. The historical string-prefix test was unsound here.
        let candidate = evaluated.as_deref().unwrap_or(&absolute);
        if !candidate.starts_with(&self.root) {
            return Err(ResolveError::OutsideRoot {
                requested: requested.to_owned(),
                absolute,
                evaluated,
            });
        }

        Ok(evaluated.unwrap_or(absolute))
    }
}

/// Join an untrusted path onto `root`, collapsing `.` and `..` lexically.
///
/// Rooted input is demoted to root-relative. `..` may climb above the root
/// and re-descend (`../<rootname>/x` lands back inside); escapes are caught
/// by the containment check, not here.
fn lexical_join(root: &Path, requested: &Path) -> PathBuf {
    let mut out = root.to_path_buf();
    for component in requested.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            // Clamped at the filesystem root, like `/..` collapsing to `/`.
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver_in(dir: &TempDir) -> PathResolver {
        PathResolver::new(dir.path()).unwrap()
    }

    #[test]
    fn test_dot_resolves_to_root() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);

        let resolved = resolver.resolve(".", true).unwrap();
        assert_eq!(resolved, resolver.root());
    }

    #[test]
    fn test_rooted_request_is_treated_as_relative() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);

        // "/" must name the serving root, not the real filesystem root.
        let resolved = resolver.resolve("/", true).unwrap();
        assert_eq!(resolved, resolver.root());

        fs::write(dir.path().join("passwd"), "inside").unwrap();
        let resolved = resolver.resolve("/passwd", true).unwrap();
        assert_eq!(resolved, resolver.root().join("passwd"));
    }

    #[test]
    fn test_parent_of_root_is_refused() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);

        let err = resolver.resolve("..", false).unwrap_err();
        assert!(matches!(err, ResolveError::OutsideRoot { .. }));
    }

    #[test]
    fn test_redundant_self_reference_is_accepted() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);

        // "../<rootname>" climbs out and descends right back in.
        let root_name = resolver.root().file_name().unwrap().to_str().unwrap();
        let resolved = resolver.resolve(&format!("../{root_name}"), true).unwrap();
        assert_eq!(resolved, resolver.root());
    }

    #[test]
    fn test_traversal_never_escapes() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);

        let attempts = [
            "../etc/passwd",
            "../../../../etc/passwd",
            "a/../../b",
            "a/b/../../../c",
            "./../x",
            "/..",
            "/../../x",
        ];
        for requested in attempts {
            match resolver.resolve(requested, false) {
                Ok(resolved) => assert!(
                    resolved.starts_with(resolver.root()),
                    "{requested} escaped to {}",
                    resolved.display()
                ),
                Err(err) => assert!(
                    matches!(err, ResolveError::OutsideRoot { .. }),
                    "{requested} failed with unexpected error: {err}"
                ),
            }
        }
    }

    #[test]
    fn test_sibling_with_shared_name_prefix_is_refused() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("tftp");
        let sibling = parent.path().join("tftp-secret");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&sibling).unwrap();
        fs::write(sibling.join("x"), "secret").unwrap();

        let resolver = PathResolver::new(&root).unwrap();

        // /…/tftp-secret/x shares the literal prefix /…/tftp but is not a
        // descendant of the root.
        let err = resolver.resolve("../tftp-secret/x", false).unwrap_err();
        assert!(matches!(err, ResolveError::OutsideRoot { .. }));

        let err = resolver.resolve("../tftp-secret/x", true).unwrap_err();
        assert!(matches!(err, ResolveError::OutsideRoot { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_refused() {
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret");
        fs::write(&secret, "secret").unwrap();

        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(&secret, dir.path().join("link")).unwrap();

        let resolver = resolver_in(&dir);
        let err = resolver.resolve("link", true).unwrap_err();
        match err {
            ResolveError::OutsideRoot { evaluated, .. } => {
                // Both forms are carried for the audit log.
                assert_eq!(evaluated.unwrap(), fs::canonicalize(&secret).unwrap());
            }
            other => panic!("expected OutsideRoot, got {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_fails_evaluation() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("link")).unwrap();

        let resolver = resolver_in(&dir);
        let err = resolver.resolve("link", true).unwrap_err();
        assert!(matches!(err, ResolveError::Evaluate { .. }));
        assert_eq!(err.reason(), "eval_failed");
    }

    #[test]
    fn test_missing_file_fails_evaluation() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_in(&dir);

        let err = resolver.resolve("nope", true).unwrap_err();
        assert!(matches!(err, ResolveError::Evaluate { .. }));

        // Without evaluation the same request resolves fine; existence is
        // the caller's concern then.
        let resolved = resolver.resolve("nope", false).unwrap();
        assert_eq!(resolved, resolver.root().join("nope"));
    }

    #[test]
    fn test_root_must_be_an_existing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(PathResolver::new(dir.path().join("missing")).is_err());

        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(PathResolver::new(&file).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_root_is_canonicalized_at_construction() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("alias")).unwrap();

        let resolver = PathResolver::new(dir.path().join("alias")).unwrap();
        assert_eq!(resolver.root(), fs::canonicalize(&real).unwrap());

        // Entries reached through the symlinked root still pass containment.
        fs::write(real.join("foo"), "x").unwrap();
        assert!(resolver.resolve("foo", true).is_ok());
    }
}
