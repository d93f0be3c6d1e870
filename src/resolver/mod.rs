//! Command resolution for vendor-authored install commands.
//!
//! Vendor catalogs carry install commands as a single free-form string: the
//! executable path may contain unquoted spaces, the extension may be
//! missing, and the whole thing may be prefixed by launcher tokens
//! (`START /WAIT ...`) that are not part of the real executable path. There
//! is no reliable delimiter between the path and its arguments, so the
//! resolver searches token windows against the filesystem instead of
//! parsing.

use log::debug;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// A disambiguated invocation: the executable on disk plus everything that
/// follows it on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResolution {
    pub executable: PathBuf,
    pub arguments: String,
}

/// Ordered `(start, end)` token-window pairs for a command of `n` tokens.
///
/// For each `start` position all `end` positions are yielded in descending
/// order before `start` advances: the longest window at a given start is
/// preferred (multi-word paths without quotes), and launcher prefixes are
/// only dropped once every window starting at 0 has failed.
pub(crate) fn candidate_windows(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |start| (start..n).rev().map(move |end| (start, end)))
}

/// Resolve a free-form command string into an executable path and argument
/// tail. Returns `None` when no token window names an existing file; the
/// caller must treat that as "could not resolve", not as an error.
#[tracing::instrument(skip(runtime))]
pub fn resolve_command<R: Runtime>(
    runtime: &R,
    command: &str,
    working_dir: &Path,
) -> Option<CommandResolution> {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let path_dirs = runtime.system_path_dirs();
    let pathext = runtime.system_pathext();

    for (start, end) in candidate_windows(tokens.len()) {
        let joined = tokens[start..=end].join(" ");
        let candidate = joined.trim_matches(|c| c == '"' || c == '\'');
        if candidate.is_empty() {
            continue;
        }

        if let Some(executable) = find_executable(runtime, candidate, working_dir, &path_dirs, &pathext)
        {
            let arguments = tokens[end + 1..].join(" ");
            if start > 0 {
                debug!(
                    "dropped launcher prefix {:?} from command",
                    tokens[..start].join(" ")
                );
            }
            debug!("resolved {:?} to {:?}", candidate, executable);
            return Some(CommandResolution {
                executable,
                arguments,
            });
        }
    }

    debug!("no token window of {:?} names an existing file", command);
    None
}

/// Test one candidate string as (i) a literal path, (ii) a path relative to
/// the working directory, (iii) a name in each machine PATH directory, as-is
/// and with each machine PATHEXT extension appended.
fn find_executable<R: Runtime>(
    runtime: &R,
    candidate: &str,
    working_dir: &Path,
    path_dirs: &[PathBuf],
    pathext: &[String],
) -> Option<PathBuf> {
    let literal = Path::new(candidate);
    if runtime.is_file(literal) {
        return Some(canonical(runtime, literal));
    }

    let in_working_dir = working_dir.join(candidate);
    if runtime.is_file(&in_working_dir) {
        return Some(canonical(runtime, &in_working_dir));
    }

    for dir in path_dirs {
        let in_path = dir.join(candidate);
        if runtime.is_file(&in_path) {
            return Some(canonical(runtime, &in_path));
        }
        for ext in pathext {
            let mut with_ext = in_path.clone().into_os_string();
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            if runtime.is_file(&with_ext) {
                return Some(canonical(runtime, &with_ext));
            }
        }
    }

    None
}

fn canonical<R: Runtime>(runtime: &R, path: &Path) -> PathBuf {
    // The path was just observed to exist; a canonicalization failure here
    // (e.g. a race with deletion) falls back to the matched path.
    runtime
        .canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
}
