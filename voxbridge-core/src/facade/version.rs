use serde::Serialize;

use crate::{binding::Bindings, error::Result, ffi::copy_c_string};

/// Build identification of the loaded engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_sha1: String,
    pub git_date: String,
}

impl VersionInfo {
    pub fn query(bindings: &Bindings) -> Result<Self> {
        // SAFETY: the engine returns pointers to static strings.
        let read = |p| unsafe { copy_c_string(p) }.unwrap_or_default();
        Ok(Self {
            version: read(bindings.call(|api| unsafe { api.get_version_str() })?),
            git_sha1: read(bindings.call(|api| unsafe { api.get_git_sha1() })?),
            git_date: read(bindings.call(|api| unsafe { api.get_git_date() })?),
        })
    }

    /// Version of the process-wide engine.
    pub fn current() -> Result<Self> {
        Self::query(&Bindings::shared())
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.version, self.git_sha1, self.git_date)
    }
}
