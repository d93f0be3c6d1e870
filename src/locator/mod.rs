//! Classification and resolution of vendor-authored resource locations.
//!
//! A location string from a vendor catalog may be an absolute URL, an
//! absolute filesystem path, or a fragment relative to wherever the catalog
//! entry was served from. `locate` turns it into a typed, absolute
//! [`Locator`]; every failure mode is encoded in the returned value, never
//! raised.

pub mod probe;

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::runtime::{Runtime, normalize_path};

pub use probe::{ProbeClient, ProxyConfig};

/// What a resolved location refers to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    #[default]
    Unknown,
    File,
    Http,
}

/// A classified, resolved reference to a resource.
///
/// Invariants: `reachable` implies `valid`; `kind == Unknown` implies
/// `absolute_location` is empty. An `Http` locator that was not probed
/// reports `reachable: false` — callers must not conflate "not probed"
/// with "unreachable".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Locator {
    pub valid: bool,
    pub reachable: bool,
    pub kind: LocatorKind,
    pub absolute_location: String,
    pub error_message: String,
}

/// Classify `path`, resolving it against `base` when given, and optionally
/// probe HTTP(S) locations for liveness. Never returns an error; all
/// failure is in the `Locator` fields.
#[tracing::instrument(skip(runtime, probe))]
pub async fn locate<R: Runtime>(
    runtime: &R,
    path: &str,
    base: Option<&str>,
    probe: Option<&ProbeClient>,
) -> Locator {
    // A URL candidate comes from the path itself or from joining it onto
    // an HTTP(S) base; anything else is treated as a filesystem path.
    let candidate = parse_absolute_url(path)
        .or_else(|| base.and_then(|b| join_base_url(b, path)));

    if let Some(url) = candidate
        && matches!(url.scheme(), "http" | "https")
    {
        return locate_http(url, probe).await;
    }

    locate_file(runtime, path, base)
}

async fn locate_http(url: Url, probe: Option<&ProbeClient>) -> Locator {
    let mut locator = Locator {
        valid: true,
        reachable: false,
        kind: LocatorKind::Http,
        absolute_location: url.to_string(),
        error_message: String::new(),
    };

    if let Some(client) = probe {
        match client.head(url.as_str()).await {
            Ok(status) if status.is_success() => {
                locator.reachable = true;
            }
            Ok(status) => {
                locator.error_message = format!("liveness probe returned HTTP {}", status);
            }
            Err(err) => {
                locator.error_message = format!("liveness probe failed: {:#}", err);
            }
        }
        debug!(
            "probed {}: reachable={} {}",
            locator.absolute_location, locator.reachable, locator.error_message
        );
    }

    locator
}

fn locate_file<R: Runtime>(runtime: &R, path: &str, base: Option<&str>) -> Locator {
    let direct = Path::new(path);
    if runtime.exists(direct) {
        return file_locator(runtime, direct);
    }

    // Relative locations resolve against the base, or against the current
    // working location when no base was given.
    let base_dir = match base.filter(|b| !b.is_empty()) {
        Some(b) => Some(std::path::PathBuf::from(b)),
        None => runtime.current_dir().ok(),
    };
    if let Some(base_dir) = base_dir {
        let joined = normalize_path(&base_dir.join(direct));
        if runtime.exists(&joined) {
            return file_locator(runtime, &joined);
        }
    }

    Locator {
        valid: false,
        reachable: false,
        kind: LocatorKind::Unknown,
        absolute_location: String::new(),
        error_message: format!(
            "{:?} is neither a supported URL nor an existing filesystem path",
            path
        ),
    }
}

fn file_locator<R: Runtime>(runtime: &R, path: &Path) -> Locator {
    let absolute = runtime
        .canonicalize(path)
        .unwrap_or_else(|_| normalize_path(path));
    Locator {
        valid: true,
        reachable: true,
        kind: LocatorKind::File,
        absolute_location: absolute.to_string_lossy().into_owned(),
        error_message: String::new(),
    }
}

/// Parse a string as a well-formed absolute URI. Single-letter schemes are
/// rejected: `C:\x.exe` parses as a URL with scheme `c` but is a Windows
/// drive path.
fn parse_absolute_url(s: &str) -> Option<Url> {
    match Url::parse(s) {
        Ok(url) if url.scheme().len() > 1 => Some(url),
        _ => None,
    }
}

/// Join a relative location onto a base URL: backslashes become `/`, each
/// segment is percent-encoded, and the base is trimmed of trailing
/// separators before a single `/` joins the two.
fn join_base_url(base: &str, path: &str) -> Option<Url> {
    let normalized = path.replace('\\', "/");
    let encoded = normalized
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    let trimmed = base.trim_end_matches(['/', '\\']);
    parse_absolute_url(&format!("{}/{}", trimmed, encoded))
}
