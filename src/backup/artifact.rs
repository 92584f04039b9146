//! Artifact naming and the per-attempt result record.

use derive_more::Display;
use getset::Getters;
use std::path::{Path, PathBuf};

/// Artifacts below this size are kept but reported with a warning
pub static MIN_ARTIFACT_SIZE: u64 = 1024;
/// Fatal status of GNU tar, e.g. when some files could not be read or vanished
/// mid-archive; tolerated for encrypted captures only
pub static PARTIAL_READ_EXIT_CODE: i32 = 2;
/// Suffix of an artifact still being written
pub static TMP_EXT: &str = "tmp";

/// Where in the host job a record comes from.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Area {
    #[display("pre")]
    Pre,
    #[display("path")]
    Path,
    #[display("stdout")]
    Stdout,
    #[display("post")]
    Post,
    /// The whole host, used when its job could not run at all
    #[display("*")]
    Host,
}

/// Outcome of one target or hook attempt, produced exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct ArtifactResult {
    host: String,
    area: Area,
    name: String,
    success: bool,
    size: Option<u64>,
    path: Option<PathBuf>,
    detail: Option<String>,
}

impl ArtifactResult {
    pub fn succeeded<H: Into<String>, N: Into<String>>(
        host: H,
        area: Area,
        name: N,
        path: PathBuf,
        size: u64,
    ) -> Self {
        ArtifactResult {
            host: host.into(),
            area,
            name: name.into(),
            success: true,
            size: Some(size),
            path: Some(path),
            detail: None,
        }
    }

    /// Nothing to capture, e.g. no file changed inside the incremental window.
    pub fn skipped<H: Into<String>, N: Into<String>, D: Into<String>>(
        host: H,
        area: Area,
        name: N,
        detail: D,
    ) -> Self {
        ArtifactResult {
            host: host.into(),
            area,
            name: name.into(),
            success: true,
            size: Some(0),
            path: None,
            detail: Some(detail.into()),
        }
    }

    /// A hook that ran fine; hooks produce no artifact.
    pub fn completed<H: Into<String>, N: Into<String>>(host: H, area: Area, name: N) -> Self {
        ArtifactResult {
            host: host.into(),
            area,
            name: name.into(),
            success: true,
            size: None,
            path: None,
            detail: None,
        }
    }

    pub fn simulated<H: Into<String>, N: Into<String>>(
        host: H,
        area: Area,
        name: N,
        path: Option<PathBuf>,
    ) -> Self {
        ArtifactResult {
            host: host.into(),
            area,
            name: name.into(),
            success: true,
            size: None,
            path,
            detail: None,
        }
    }

    pub fn failed<H: Into<String>, N: Into<String>, D: Into<String>>(
        host: H,
        area: Area,
        name: N,
        detail: D,
    ) -> Self {
        ArtifactResult {
            host: host.into(),
            area,
            name: name.into(),
            success: false,
            size: None,
            path: None,
            detail: Some(detail.into()),
        }
    }

    /// The single record standing for a host whose job died.
    pub fn host_fatal<H: Into<String>, D: Into<String>>(host: H, detail: D) -> Self {
        Self::failed(host, Area::Host, "*", detail)
    }
}

/// `/var/lib/data/` becomes `var-lib-data-`.
pub fn artifact_component(name: &str) -> String {
    name.trim_start_matches('/').replace('/', "-")
}

/// `<destdir>/<date>-<host>-<name><ext>`, `ext` already carrying its dots.
pub fn artifact_path<P: AsRef<Path>>(
    destdir: P,
    date: &str,
    host: &str,
    name: &str,
    ext: &str,
) -> PathBuf {
    destdir
        .as_ref()
        .join(format!("{}-{}-{}{}", date, host, artifact_component(name), ext))
}

pub fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".");
    tmp.push(TMP_EXT);
    PathBuf::from(tmp)
}
