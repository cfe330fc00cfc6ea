//! Binding dispatch: choose between the embedded and the dynamic entry-point
//! tables, once per process, without locking.
//!
//! ## State machine
//!
//! ```text
//!                    embedded call ok
//!   PreferEmbedded ───────────────────► EmbeddedOnly
//!         │
//!         │ embedded "not present" (component / symbol / image)
//!         ▼
//!    DynamicOnly
//! ```
//!
//! Both terminal states are sticky. Transitions are a single
//! `compare_exchange` from `PreferEmbedded`, so racing first calls may probe
//! redundantly but can never move the state backwards.

pub mod config;

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, OnceLock,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{BridgeError, Result},
    ffi::{DynamicApi, EmbeddedApi, EngineApi},
};

pub use config::{BindingConfig, ModeSource};

/// Router state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingMode {
    /// Undecided: try embedded first, fall back to dynamic if it is absent.
    PreferEmbedded,
    EmbeddedOnly,
    DynamicOnly,
}

impl BindingMode {
    const fn to_u8(self) -> u8 {
        match self {
            BindingMode::PreferEmbedded => 0,
            BindingMode::EmbeddedOnly => 1,
            BindingMode::DynamicOnly => 2,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => BindingMode::EmbeddedOnly,
            2 => BindingMode::DynamicOnly,
            _ => BindingMode::PreferEmbedded,
        }
    }

    pub fn is_settled(self) -> bool {
        self != BindingMode::PreferEmbedded
    }
}

impl std::fmt::Display for BindingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BindingMode::PreferEmbedded => "prefer-embedded",
            BindingMode::EmbeddedOnly => "embedded-only",
            BindingMode::DynamicOnly => "dynamic-only",
        })
    }
}

/// Lock-free two-way dispatcher.
#[derive(Debug)]
pub struct BindingRouter {
    state: AtomicU8,
}

impl BindingRouter {
    pub fn new(initial: BindingMode) -> Self {
        Self {
            state: AtomicU8::new(initial.to_u8()),
        }
    }

    pub fn from_config(config: &BindingConfig) -> Self {
        let (mode, source) = config.initial_mode();
        info!(mode = %mode, source = ?source, "binding router initialised");
        Self::new(mode)
    }

    /// Current state (snapshot).
    pub fn mode(&self) -> BindingMode {
        BindingMode::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run exactly one of the two calls according to the current state.
    ///
    /// In `PreferEmbedded`, a "not present" failure from `embedded` moves the
    /// router to `DynamicOnly` and runs `dynamic` once. Any other failure is
    /// returned untouched. A "not present" failure on the last path available
    /// becomes [`BridgeError::NoBindingAvailable`].
    pub fn invoke<T>(
        &self,
        embedded: impl FnOnce() -> Result<T>,
        dynamic: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        match self.mode() {
            BindingMode::EmbeddedOnly => embedded().map_err(exhausted),
            BindingMode::DynamicOnly => dynamic().map_err(exhausted),
            BindingMode::PreferEmbedded => match embedded() {
                Ok(value) => {
                    self.settle(BindingMode::EmbeddedOnly);
                    Ok(value)
                }
                Err(e) if e.is_binding_unavailable() => {
                    warn!(error = %e, "embedded binding unavailable, falling back to dynamic");
                    self.settle(BindingMode::DynamicOnly);
                    dynamic().map_err(exhausted)
                }
                Err(e) => Err(e),
            },
        }
    }

    fn settle(&self, target: BindingMode) {
        match self.state.compare_exchange(
            BindingMode::PreferEmbedded.to_u8(),
            target.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => info!(mode = %target, "binding mode settled"),
            Err(current) => debug!(
                requested = %target,
                current = %BindingMode::from_u8(current),
                "binding mode already settled by a concurrent call"
            ),
        }
    }
}

fn exhausted(e: BridgeError) -> BridgeError {
    if e.is_binding_unavailable() {
        BridgeError::NoBindingAvailable(e.to_string())
    } else {
        e
    }
}

/// The router plus both entry-point tables.
///
/// Every facade holds an `Arc<Bindings>` and routes all foreign calls through
/// [`Bindings::call`].
pub struct Bindings {
    router: BindingRouter,
    embedded: Box<dyn EngineApi>,
    dynamic: Box<dyn EngineApi>,
}

impl Bindings {
    /// Real tables: the linked-in engine and the runtime-loaded library.
    pub fn from_config(config: BindingConfig) -> Self {
        let router = BindingRouter::from_config(&config);
        Self::with_tables(
            router,
            Box::new(EmbeddedApi::new()),
            Box::new(DynamicApi::new(config.library_location())),
        )
    }

    /// Custom tables, e.g. an in-process fake.
    pub fn with_tables(
        router: BindingRouter,
        embedded: Box<dyn EngineApi>,
        dynamic: Box<dyn EngineApi>,
    ) -> Self {
        Self {
            router,
            embedded,
            dynamic,
        }
    }

    /// Process-wide instance built from the environment on first use.
    ///
    /// The version call is used as a probe so the mode is settled before the
    /// first real operation.
    pub fn shared() -> Arc<Bindings> {
        static SHARED: OnceLock<Arc<Bindings>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                let bindings = Arc::new(Bindings::from_config(BindingConfig::from_env()));
                let mode = bindings.probe();
                info!(mode = %mode, "engine bindings ready");
                bindings
            })
            .clone()
    }

    pub fn router(&self) -> &BindingRouter {
        &self.router
    }

    pub fn mode(&self) -> BindingMode {
        self.router.mode()
    }

    /// Route one operation. `op` is written once against the capability
    /// trait and handed the table the router selects.
    pub fn call<T>(&self, op: impl Fn(&dyn EngineApi) -> Result<T>) -> Result<T> {
        self.router
            .invoke(|| op(self.embedded.as_ref()), || op(self.dynamic.as_ref()))
    }

    /// Settle the mode with a cheap version-string call if still undecided.
    pub fn probe(&self) -> BindingMode {
        if !self.mode().is_settled() {
            // SAFETY: no arguments; the returned pointer is ignored.
            if let Err(e) = self.call(|api| unsafe { api.get_version_str() }.map(|_| ())) {
                warn!(error = %e, "binding probe failed");
            }
        }
        self.mode()
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bindings")
            .field("mode", &self.mode())
            .field("embedded", &self.embedded.binding_name())
            .field("dynamic", &self.dynamic.binding_name())
            .finish()
    }
}
