//! Single-owner wrapper around one engine-allocated object.
//!
//! ```text
//!   Live ──dispose() / drop──► Retired ──last in-flight call returns──► Released
//!     │                                                                    ▲
//!     └────────────── dispose() / drop with no call in flight ─────────────┘
//! ```
//!
//! Every engine call goes through [`NativeHandle::with`], which registers
//! itself as in flight for the whole call. `dispose()` retires the handle at
//! once, so no new call can start, but the release function only runs when
//! the in-flight count is zero: either inside `dispose()` itself or when the
//! last running call returns. A released pointer therefore never reaches the
//! engine, and a dispose issued from inside one of the handle's own calls
//! (an audio callback, say) does not deadlock.
//!
//! `Drop` goes through the same path, so an explicit `dispose()` turns the
//! destructor into a no-op.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::NonNull;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// Release function for one engine object.
pub type ReleaseFn = Box<dyn Fn(NonNull<c_void>) -> Result<()> + Send + Sync>;

struct Slot {
    /// `None` once the release function has been handed the pointer.
    ptr: Option<NonNull<c_void>>,
    in_flight: usize,
    retired: bool,
}

// SAFETY: the pointer is an opaque engine address; this crate never
// dereferences it, and the engine objects it names are used from any thread.
unsafe impl Send for Slot {}

impl Slot {
    /// Hand out the pointer for release if the handle is retired and idle.
    fn take_if_idle(&mut self) -> Option<NonNull<c_void>> {
        if self.retired && self.in_flight == 0 {
            self.ptr.take()
        } else {
            None
        }
    }
}

pub struct NativeHandle {
    slot: Mutex<Slot>,
    kind: &'static str,
    release: ReleaseFn,
}

/// Marks one call as finished, releasing the object if it was the last one
/// holding a retired handle open. Runs on unwind too.
struct InFlight<'a> {
    handle: &'a NativeHandle,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let pending = {
            let mut slot = self.handle.slot.lock();
            slot.in_flight -= 1;
            slot.take_if_idle()
        };
        if let Some(p) = pending {
            self.handle.run_release(p);
        }
    }
}

impl NativeHandle {
    /// Take ownership of `pointer`.
    ///
    /// `kind` names the create entry point that produced it and appears in
    /// errors and logs. A null pointer is rejected with
    /// [`BridgeError::InvalidHandle`]; `release` is not called in that case.
    pub fn create(
        pointer: *mut c_void,
        kind: &'static str,
        release: impl Fn(NonNull<c_void>) -> Result<()> + Send + Sync + 'static,
    ) -> Result<Self> {
        let Some(ptr) = NonNull::new(pointer) else {
            return Err(BridgeError::InvalidHandle(kind));
        };
        Ok(Self {
            slot: Mutex::new(Slot {
                ptr: Some(ptr),
                in_flight: 0,
                retired: false,
            }),
            kind,
            release: Box::new(release),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Run `f` with the live pointer, keeping the object alive until `f`
    /// returns. Fails with [`BridgeError::UseAfterRelease`] once the handle
    /// has been disposed.
    ///
    /// `f` must not let the pointer escape.
    pub fn with<T>(&self, f: impl FnOnce(*mut c_void) -> Result<T>) -> Result<T> {
        let p = {
            let mut slot = self.slot.lock();
            let p = match slot.ptr {
                Some(p) if !slot.retired => p,
                _ => return Err(BridgeError::UseAfterRelease(self.kind)),
            };
            slot.in_flight += 1;
            p
        };
        let _in_flight = InFlight { handle: self };
        f(p.as_ptr())
    }

    pub fn is_released(&self) -> bool {
        self.slot.lock().retired
    }

    /// Release the object. Idempotent and safe to race; never fails.
    ///
    /// If calls are in flight the release is deferred to the last of them.
    /// Errors and panics from the release function are logged and dropped.
    pub fn dispose(&self) {
        let pending = {
            let mut slot = self.slot.lock();
            if slot.retired {
                return;
            }
            slot.retired = true;
            if slot.in_flight > 0 {
                debug!(kind = self.kind, in_flight = slot.in_flight, "native handle release deferred");
            }
            slot.take_if_idle()
        };
        if let Some(p) = pending {
            self.run_release(p);
        }
    }

    fn run_release(&self, p: NonNull<c_void>) {
        match catch_unwind(AssertUnwindSafe(|| (self.release)(p))) {
            Ok(Ok(())) => debug!(kind = self.kind, "native handle released"),
            Ok(Err(e)) => warn!(kind = self.kind, error = %e, "native handle release failed"),
            Err(_) => warn!(kind = self.kind, "native handle release panicked"),
        }
    }
}

/// Run `f` with the pointers of every handle in `handles`, in order, holding
/// all of them open for the whole call. Fails on the first released one.
pub fn with_all<T>(handles: &[&NativeHandle], f: impl FnOnce(&[*mut c_void]) -> Result<T>) -> Result<T> {
    fn step<T, F>(rest: &[&NativeHandle], held: &mut Vec<*mut c_void>, f: F) -> Result<T>
    where
        F: FnOnce(&[*mut c_void]) -> Result<T>,
    {
        match rest.split_first() {
            None => f(held),
            Some((first, rest)) => first.with(|p| {
                held.push(p);
                step(rest, held, f)
            }),
        }
    }
    step(handles, &mut Vec::with_capacity(handles.len()), f)
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("NativeHandle")
            .field("kind", &self.kind)
            .field("retired", &slot.retired)
            .field("in_flight", &slot.in_flight)
            .finish_non_exhaustive()
    }
}
