//! Embedded entry-point table: the engine linked into the host binary.
//!
//! With the `embedded` feature the symbols are declared in an `extern "C"`
//! block and resolved by the linker (see `build.rs`). Without it every entry
//! point reports the table as unavailable, which the router treats exactly
//! like a host that shipped without the engine linked in.

use std::ffi::{c_char, c_void};

use super::types::*;
use super::EngineApi;
use crate::error::Result;

pub const EMBEDDED_BINDING: &str = "embedded";

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedApi;

impl EmbeddedApi {
    pub fn new() -> Self {
        Self
    }

    /// Whether this build carries the linked-in table.
    pub const fn is_compiled_in() -> bool {
        cfg!(feature = "embedded")
    }
}

#[cfg(feature = "embedded")]
macro_rules! impl_embedded_api {
    ($(fn $name:ident = $sym:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;)*) => {
        #[allow(non_snake_case)]
        mod sys {
            use super::*;

            extern "C" {
                $( pub fn $sym($($arg: $ty),*) $(-> $ret)?; )*
            }
        }

        impl EngineApi for EmbeddedApi {
            fn binding_name(&self) -> &'static str {
                EMBEDDED_BINDING
            }

            $(
                #[allow(clippy::too_many_arguments)]
                unsafe fn $name(&self, $($arg: $ty),*) -> Result<ffi_ret!($($ret)?)> {
                    // SAFETY: argument validity is the caller's contract.
                    Ok(unsafe { sys::$sym($($arg),*) })
                }
            )*
        }
    };
}

#[cfg(not(feature = "embedded"))]
macro_rules! impl_embedded_api {
    ($(fn $name:ident = $sym:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;)*) => {
        impl EngineApi for EmbeddedApi {
            fn binding_name(&self) -> &'static str {
                EMBEDDED_BINDING
            }

            $(
                #[allow(unused_variables, clippy::too_many_arguments)]
                unsafe fn $name(&self, $($arg: $ty),*) -> Result<ffi_ret!($($ret)?)> {
                    Err(crate::error::BridgeError::ComponentUnavailable {
                        binding: EMBEDDED_BINDING,
                        reason: concat!(
                            "built without the `embedded` feature (",
                            stringify!($sym),
                            ")"
                        )
                        .into(),
                    })
                }
            )*
        }
    };
}

for_each_entry_point!(impl_embedded_api);
