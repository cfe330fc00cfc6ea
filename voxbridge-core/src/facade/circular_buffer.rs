//! Engine-side sample ring used to feed fixed windows into the VAD.

use std::sync::Arc;

use crate::{
    binding::Bindings,
    error::{BridgeError, Result},
    ffi::copy_f32_slice,
    handle::NativeHandle,
};

use super::{len_i32, own_handle};

pub struct CircularBuffer {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_bindings(Bindings::shared(), capacity)
    }

    pub fn with_bindings(bindings: Arc<Bindings>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::InvalidArgument("circular buffer capacity must be > 0".into()));
        }
        let capacity = len_i32(capacity, "circular buffer capacity")?;
        let raw = bindings.call(|api| unsafe { api.create_circular_buffer(capacity) })?;
        let handle = own_handle(&bindings, raw, "SherpaOnnxCreateCircularBuffer", |api, p| unsafe {
            api.destroy_circular_buffer(p)
        })?;
        Ok(Self { bindings, handle })
    }

    pub fn push(&mut self, samples: &[f32]) -> Result<()> {
        let n = len_i32(samples.len(), "samples")?;
        self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.circular_buffer_push(p, samples.as_ptr(), n) })
        })
    }

    /// Copy `n` samples starting at absolute index `start_index`.
    pub fn get(&self, start_index: usize, n: usize) -> Result<Vec<f32>> {
        let start = len_i32(start_index, "start index")?;
        let count = len_i32(n, "sample count")?;
        self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                let data = api.circular_buffer_get(p, start, count)?;
                let out = copy_f32_slice(data, count);
                if !data.is_null() {
                    api.circular_buffer_free(data)?;
                }
                Ok(out)
            })
        })
    }

    pub fn pop(&mut self, n: usize) -> Result<()> {
        let n = len_i32(n, "sample count")?;
        self.handle
            .with(|p| self.bindings.call(|api| unsafe { api.circular_buffer_pop(p, n) }))
    }

    /// Samples currently held.
    pub fn size(&self) -> Result<usize> {
        let n = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.circular_buffer_size(p) }))?;
        Ok(n.max(0) as usize)
    }

    /// Absolute index of the oldest held sample.
    pub fn head(&self) -> Result<usize> {
        let h = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.circular_buffer_head(p) }))?;
        Ok(h.max(0) as usize)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.handle
            .with(|p| self.bindings.call(|api| unsafe { api.circular_buffer_reset(p) }))
    }

    /// Release the engine object now. Later calls fail with `UseAfterRelease`.
    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for CircularBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
