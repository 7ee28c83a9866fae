//! Transient device resources for a single downsample step.

use crate::buffer::PixelBuffer;
use crate::core::{AllocPhase, BackendError, ComputeBackend};
use crate::params::DownsampleParameters;

/// The device-side triple bound to one downsample dispatch: a readable
/// view over the source level, a writable view for the destination level,
/// and the packed parameter block.
///
/// A set exists for the duration of one dispatch only and is never reused
/// across levels. All three resources are released exactly once, either
/// through [`dispose`](Self::dispose) or on drop; a failure partway
/// through [`create`](Self::create) releases whatever was already
/// allocated before the error propagates.
pub struct LevelResourceSet<'a, B: ComputeBackend> {
    backend: &'a B,
    input: Option<B::InputView>,
    output: Option<B::OutputView>,
    params: Option<B::ParamsBlock>,
}

impl<'a, B: ComputeBackend> LevelResourceSet<'a, B> {
    /// Allocates the input view from `input`'s pixels, an uninitialized
    /// output view for `output_dims`, and the parameter block.
    ///
    /// On failure the partially constructed set is dropped, which releases
    /// the resources allocated so far; the error names the phase that
    /// failed.
    pub fn create(
        backend: &'a B,
        input: &PixelBuffer,
        output_dims: (u32, u32),
        params: &DownsampleParameters,
    ) -> Result<Self, (AllocPhase, BackendError)> {
        let mut set = Self {
            backend,
            input: None,
            output: None,
            params: None,
        };
        set.input = Some(
            backend
                .alloc_input(input)
                .map_err(|e| (AllocPhase::Input, e))?,
        );
        set.output = Some(
            backend
                .alloc_output(output_dims.0, output_dims.1, input.channels())
                .map_err(|e| (AllocPhase::Output, e))?,
        );
        set.params = Some(
            backend
                .alloc_params(params)
                .map_err(|e| (AllocPhase::Params, e))?,
        );
        Ok(set)
    }

    /// Submits the downsample dispatch over this set's bound triple.
    pub fn dispatch(&self, grid: [u32; 3]) -> Result<(), BackendError> {
        match (&self.input, &self.output, &self.params) {
            (Some(input), Some(output), Some(params)) => {
                self.backend.dispatch(input, output, params, grid)
            }
            _ => Err(BackendError::Device(
                "resource set already disposed".into(),
            )),
        }
    }

    /// Blocks until the dispatch completes and copies the output view's
    /// contents to host memory.
    pub fn read_back(&self, expected_len: usize) -> Result<Vec<u8>, BackendError> {
        match &self.output {
            Some(output) => self.backend.read_back(output, expected_len),
            None => Err(BackendError::Device(
                "resource set already disposed".into(),
            )),
        }
    }

    /// Releases all device resources held by this set.
    pub fn dispose(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        if let Some(params) = self.params.take() {
            self.backend.release_params(params);
        }
        if let Some(output) = self.output.take() {
            self.backend.release_output(output);
        }
        if let Some(input) = self.input.take() {
            self.backend.release_input(input);
        }
    }
}

impl<B: ComputeBackend> Drop for LevelResourceSet<'_, B> {
    fn drop(&mut self) {
        self.release_all();
    }
}
