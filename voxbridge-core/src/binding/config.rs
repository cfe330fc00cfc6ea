//! Binding configuration: environment overrides and the platform predicate.
//!
//! ## Precedence
//!
//! ```text
//! SHERPA_ONNX_BINDING            → EmbeddedOnly | DynamicOnly
//! SHERPA_ONNX_FORCE_INTERNAL     → EmbeddedOnly        (legacy)
//! SHERPA_ONNX_FORCE_EXTERNAL     → DynamicOnly         (legacy)
//! platform forbids dlopen        → EmbeddedOnly
//! otherwise                      → PreferEmbedded (settled on first call)
//! ```

use std::path::PathBuf;

use super::BindingMode;

pub const BINDING_ENV: &str = "SHERPA_ONNX_BINDING";
pub const FORCE_INTERNAL_ENV: &str = "SHERPA_ONNX_FORCE_INTERNAL";
pub const FORCE_EXTERNAL_ENV: &str = "SHERPA_ONNX_FORCE_EXTERNAL";
pub const LIB_PATH_ENV: &str = "SHERPA_ONNX_LIB_PATH";

/// Logical identifier of the dynamically loaded engine component.
pub const DEFAULT_LIBRARY_NAME: &str = "sherpa-onnx-c-api";

/// Name the embedded component answers to in override values.
const INTERNAL_ALIAS: &str = "__Internal";

/// Where the initial binding mode came from. Logged once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    Override,
    Platform,
    Undecided,
}

/// Configuration for one `Bindings` instance.
#[derive(Debug, Clone)]
pub struct BindingConfig {
    /// Explicit mode; wins over everything else.
    pub override_mode: Option<BindingMode>,
    /// Result of the platform predicate, evaluated once when the config is built.
    pub platform_forbids_dynamic_loading: bool,
    /// Logical library name, mapped to the platform file name at load time.
    pub library_name: String,
    /// Explicit library path. Takes precedence over `library_name`.
    pub library_path: Option<PathBuf>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            override_mode: None,
            platform_forbids_dynamic_loading: default_platform_forbids_dynamic_loading(),
            library_name: DEFAULT_LIBRARY_NAME.into(),
            library_path: None,
        }
    }
}

impl BindingConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let override_mode = parse_binding_mode(lookup(BINDING_ENV).as_deref())
            .or_else(|| is_truthy(lookup(FORCE_INTERNAL_ENV).as_deref()).then_some(BindingMode::EmbeddedOnly))
            .or_else(|| is_truthy(lookup(FORCE_EXTERNAL_ENV).as_deref()).then_some(BindingMode::DynamicOnly));

        let library_path = lookup(LIB_PATH_ENV)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Self {
            override_mode,
            library_path,
            ..Self::default()
        }
    }

    /// Replace the compile-time platform check with a caller-supplied predicate.
    pub fn with_platform_probe(mut self, forbids_dynamic_loading: impl FnOnce() -> bool) -> Self {
        self.platform_forbids_dynamic_loading = forbids_dynamic_loading();
        self
    }

    pub fn with_override(mut self, mode: BindingMode) -> Self {
        self.override_mode = Some(mode);
        self
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Initial router state and its source.
    pub fn initial_mode(&self) -> (BindingMode, ModeSource) {
        if let Some(mode) = self.override_mode {
            return (mode, ModeSource::Override);
        }
        if self.platform_forbids_dynamic_loading {
            return (BindingMode::EmbeddedOnly, ModeSource::Platform);
        }
        (BindingMode::PreferEmbedded, ModeSource::Undecided)
    }

    /// Path handed to the dynamic loader.
    pub fn library_location(&self) -> PathBuf {
        self.library_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(libloading::library_filename(&self.library_name)))
    }
}

/// Compile-time platform check: sandboxes that reject runtime library loading.
pub fn default_platform_forbids_dynamic_loading() -> bool {
    cfg!(any(
        target_os = "ios",
        target_os = "tvos",
        target_os = "watchos",
        feature = "static-only"
    ))
}

/// Parse the mode-selection variable. `None` for unset or unrecognised values.
pub fn parse_binding_mode(value: Option<&str>) -> Option<BindingMode> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }

    if is_truthy(Some(trimmed))
        || trimmed.eq_ignore_ascii_case("internal")
        || trimmed.eq_ignore_ascii_case(INTERNAL_ALIAS)
    {
        return Some(BindingMode::EmbeddedOnly);
    }

    if trimmed.eq_ignore_ascii_case("external") || trimmed.eq_ignore_ascii_case("dll") {
        return Some(BindingMode::DynamicOnly);
    }

    None
}

fn is_truthy(value: Option<&str>) -> bool {
    let Some(v) = value else {
        return false;
    };
    let v = v.trim();
    ["1", "true", "yes", "on"]
        .iter()
        .any(|t| v.eq_ignore_ascii_case(t))
}
