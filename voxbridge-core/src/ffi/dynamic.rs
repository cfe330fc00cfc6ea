//! Dynamic entry-point table: the engine as a separately shipped shared
//! library, opened on first use with `libloading`.
//!
//! The load is attempted once; its outcome (library or failure) is cached for
//! the life of the table. Symbols are resolved per call so a library that
//! lacks one optional export still serves all the others.

use std::ffi::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libloading::{Library, Symbol};
use tracing::{info, warn};

use super::types::*;
use super::EngineApi;
use crate::error::{BridgeError, Result};

pub const DYNAMIC_BINDING: &str = "dynamic";

/// Why the library could not be opened.
#[derive(Debug, Clone)]
struct LoadFailure {
    incompatible: bool,
    reason: String,
}

impl LoadFailure {
    fn to_error(&self) -> BridgeError {
        if self.incompatible {
            BridgeError::IncompatibleComponent {
                binding: DYNAMIC_BINDING,
                reason: self.reason.clone(),
            }
        } else {
            BridgeError::ComponentUnavailable {
                binding: DYNAMIC_BINDING,
                reason: self.reason.clone(),
            }
        }
    }
}

/// Loader messages that mean "found, but built for another architecture".
const INCOMPATIBLE_MARKERS: &[&str] = &[
    "wrong ELF class",
    "invalid ELF header",
    "incompatible architecture",
    "wrong architecture",
    "os error 193",
];

fn classify_load_error(message: String) -> LoadFailure {
    let incompatible = INCOMPATIBLE_MARKERS.iter().any(|m| message.contains(m));
    LoadFailure {
        incompatible,
        reason: message,
    }
}

pub struct DynamicApi {
    path: PathBuf,
    library: OnceLock<std::result::Result<Library, LoadFailure>>,
}

impl DynamicApi {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            library: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` once the library has been opened successfully.
    pub fn is_loaded(&self) -> bool {
        matches!(self.library.get(), Some(Ok(_)))
    }

    fn library(&self) -> Result<&Library> {
        match self.library.get_or_init(|| self.load()) {
            Ok(lib) => Ok(lib),
            Err(failure) => Err(failure.to_error()),
        }
    }

    fn load(&self) -> std::result::Result<Library, LoadFailure> {
        // SAFETY: loading runs the library's initialisers. The engine's C API
        // library has no initialisers with preconditions on the host.
        match unsafe { Library::new(&self.path) } {
            Ok(lib) => {
                info!(path = %self.path.display(), "engine library loaded");
                Ok(lib)
            }
            Err(e) => {
                let failure = classify_load_error(e.to_string());
                warn!(
                    path = %self.path.display(),
                    incompatible = failure.incompatible,
                    error = %failure.reason,
                    "engine library could not be loaded"
                );
                Err(failure)
            }
        }
    }

    /// Resolve one symbol. `name` must be NUL-terminated.
    ///
    /// # Safety
    ///
    /// `F` must be the exact C signature of the symbol.
    unsafe fn entry<F>(&self, name: &[u8], symbol: &'static str) -> Result<Symbol<'_, F>> {
        let lib = self.library()?;
        // SAFETY: signature correctness is the caller's contract.
        unsafe { lib.get::<F>(name) }.map_err(|_| BridgeError::EntryPointMissing {
            binding: DYNAMIC_BINDING,
            symbol,
        })
    }
}

impl std::fmt::Debug for DynamicApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicApi")
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

macro_rules! impl_dynamic_api {
    ($(fn $name:ident = $sym:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;)*) => {
        impl EngineApi for DynamicApi {
            fn binding_name(&self) -> &'static str {
                DYNAMIC_BINDING
            }

            $(
                #[allow(clippy::too_many_arguments)]
                unsafe fn $name(&self, $($arg: $ty),*) -> Result<ffi_ret!($($ret)?)> {
                    // SAFETY: the signature is the one declared in the entry-point list.
                    let f = unsafe {
                        self.entry::<unsafe extern "C" fn($($ty),*) $(-> $ret)?>(
                            concat!(stringify!($sym), "\0").as_bytes(),
                            stringify!($sym),
                        )
                    }?;
                    // SAFETY: argument validity is the caller's contract.
                    Ok(unsafe { (*f)($($arg),*) })
                }
            )*
        }
    };
}

for_each_entry_point!(impl_dynamic_api);
