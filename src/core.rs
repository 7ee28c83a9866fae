use std::fmt;

use thiserror::Error;

use crate::buffer::PixelBuffer;
use crate::params::DownsampleParameters;

/// ComputeBackend is the device contract the mip pyramid builder consumes:
/// per-level resource allocation, kernel dispatch, and blocking readback.
///
/// A backend owns the compute device and the compiled downsample kernel.
/// All work for all levels goes through one serialized command stream;
/// `dispatch` submits work without blocking for completion, `read_back`
/// forces the device to finish everything touching the given resource
/// before copying it to host memory.
pub trait ComputeBackend {
    /// Device-readable view over a source level's pixels.
    type InputView;
    /// Device-writable view sized for a destination level.
    type OutputView;
    /// Packed [`DownsampleParameters`] block bound to the kernel.
    type ParamsBlock;

    /// Thread-group dimensions the kernel was compiled with.
    fn workgroup_size(&self) -> (u32, u32);

    /// Allocates a readable device resource initialized from `input`'s
    /// pixel bytes.
    fn alloc_input(&self, input: &PixelBuffer) -> Result<Self::InputView, BackendError>;

    /// Allocates an uninitialized writable device resource sized
    /// `width * height * channels` bytes.
    fn alloc_output(
        &self,
        width: u32,
        height: u32,
        channels: u32,
    ) -> Result<Self::OutputView, BackendError>;

    /// Allocates the parameter block from the packed wire form of `params`.
    fn alloc_params(
        &self,
        params: &DownsampleParameters,
    ) -> Result<Self::ParamsBlock, BackendError>;

    /// Submits one downsample dispatch over `grid` thread groups. Does not
    /// itself block for completion beyond what command submission requires.
    fn dispatch(
        &self,
        input: &Self::InputView,
        output: &Self::OutputView,
        params: &Self::ParamsBlock,
        grid: [u32; 3],
    ) -> Result<(), BackendError>;

    /// Blocks until all outstanding device work touching `output` has
    /// finished, then copies its contents to host memory. Fails with
    /// [`BackendError::ShortRead`] if fewer than `expected_len` bytes
    /// come back.
    fn read_back(
        &self,
        output: &Self::OutputView,
        expected_len: usize,
    ) -> Result<Vec<u8>, BackendError>;

    fn release_input(&self, view: Self::InputView);
    fn release_output(&self, view: Self::OutputView);
    fn release_params(&self, block: Self::ParamsBlock);
}

/// A device-level failure reported by a [`ComputeBackend`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("device allocation failed: {0}")]
    OutOfMemory(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

/// Which allocation inside `LevelResourceSet::create` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPhase {
    Input,
    Output,
    Params,
}

impl fmt::Display for AllocPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocPhase::Input => write!(f, "input view"),
            AllocPhase::Output => write!(f, "output view"),
            AllocPhase::Params => write!(f, "parameter block"),
        }
    }
}

/// An error that occurred during mip pyramid generation.
///
/// Every failure identifies the level and the phase it happened in. The
/// builder is fail-fast: no partial chain is returned, and any transient
/// device resources are released before the error propagates. Retry
/// policy, if desired, belongs to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid source dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("level {level}: {phase} allocation failed: {source}")]
    ResourceExhausted {
        level: u32,
        phase: AllocPhase,
        source: BackendError,
    },
    #[error("level {level}: dispatch rejected: {source}")]
    DispatchFailed { level: u32, source: BackendError },
    #[error("level {level}: readback failed: {source}")]
    ReadbackFailed { level: u32, source: BackendError },
}
