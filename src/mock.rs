//! CPU stand-in for a [`ComputeBackend`], used by the test suites.
//!
//! The mock tracks allocation/release counters, supports failure
//! injection per phase, validates that a dispatch grid fully covers the
//! destination, and runs a deterministic box filter on the CPU so
//! readback results are checkable without a device.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::buffer::PixelBuffer;
use crate::core::{BackendError, ComputeBackend};
use crate::params::DownsampleParameters;

const GROUP_X: u32 = 8;
const GROUP_Y: u32 = 8;

/// Where the next matching backend call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InputAlloc,
    OutputAlloc,
    ParamsAlloc,
    Dispatch,
    Readback,
    /// Readback succeeds but returns fewer bytes than the output holds.
    ShortReadback,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub input_allocs: usize,
    pub input_frees: usize,
    pub output_allocs: usize,
    pub output_frees: usize,
    pub params_allocs: usize,
    pub params_frees: usize,
}

#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub params: DownsampleParameters,
    pub grid: [u32; 3],
}

pub struct MockInput(u64);
pub struct MockOutput(u64);
pub struct MockParams(u64);

struct InputData {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

struct OutputData {
    width: u32,
    height: u32,
    channels: u32,
    bytes: Option<Vec<u8>>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    inputs: HashMap<u64, InputData>,
    outputs: HashMap<u64, OutputData>,
    params: HashMap<u64, DownsampleParameters>,
    counters: Counters,
    dispatches: Vec<DispatchRecord>,
    fail: Option<FailPoint>,
    double_release: bool,
}

#[derive(Default)]
pub struct MockBackend {
    state: RefCell<State>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure for the next call matching `point`.
    pub fn fail_at(&self, point: FailPoint) {
        self.state.borrow_mut().fail = Some(point);
    }

    pub fn counters(&self) -> Counters {
        self.state.borrow().counters
    }

    pub fn dispatches(&self) -> Vec<DispatchRecord> {
        self.state.borrow().dispatches.clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.state.borrow().dispatches.len()
    }

    /// True when every allocation has been released and no device
    /// resource is still alive.
    pub fn balanced(&self) -> bool {
        let state = self.state.borrow();
        let c = state.counters;
        c.input_allocs == c.input_frees
            && c.output_allocs == c.output_frees
            && c.params_allocs == c.params_frees
            && state.inputs.is_empty()
            && state.outputs.is_empty()
            && state.params.is_empty()
    }

    pub fn saw_double_release(&self) -> bool {
        self.state.borrow().double_release
    }

    fn take_failure(&self, point: FailPoint) -> bool {
        let mut state = self.state.borrow_mut();
        if state.fail == Some(point) {
            state.fail = None;
            true
        } else {
            false
        }
    }

    fn fresh_id(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.next_id
    }
}

impl ComputeBackend for MockBackend {
    type InputView = MockInput;
    type OutputView = MockOutput;
    type ParamsBlock = MockParams;

    fn workgroup_size(&self) -> (u32, u32) {
        (GROUP_X, GROUP_Y)
    }

    fn alloc_input(&self, input: &PixelBuffer) -> Result<MockInput, BackendError> {
        if self.take_failure(FailPoint::InputAlloc) {
            return Err(BackendError::OutOfMemory(
                "injected input allocation failure".into(),
            ));
        }
        let id = self.fresh_id();
        let mut state = self.state.borrow_mut();
        state.inputs.insert(
            id,
            InputData {
                width: input.width(),
                height: input.height(),
                bytes: input.bytes().to_vec(),
            },
        );
        state.counters.input_allocs += 1;
        Ok(MockInput(id))
    }

    fn alloc_output(
        &self,
        width: u32,
        height: u32,
        channels: u32,
    ) -> Result<MockOutput, BackendError> {
        if self.take_failure(FailPoint::OutputAlloc) {
            return Err(BackendError::OutOfMemory(
                "injected output allocation failure".into(),
            ));
        }
        let id = self.fresh_id();
        let mut state = self.state.borrow_mut();
        state.outputs.insert(
            id,
            OutputData {
                width,
                height,
                channels,
                bytes: None,
            },
        );
        state.counters.output_allocs += 1;
        Ok(MockOutput(id))
    }

    fn alloc_params(&self, params: &DownsampleParameters) -> Result<MockParams, BackendError> {
        if self.take_failure(FailPoint::ParamsAlloc) {
            return Err(BackendError::OutOfMemory(
                "injected parameter allocation failure".into(),
            ));
        }
        let id = self.fresh_id();
        let mut state = self.state.borrow_mut();
        state.params.insert(id, *params);
        state.counters.params_allocs += 1;
        Ok(MockParams(id))
    }

    fn dispatch(
        &self,
        input: &MockInput,
        output: &MockOutput,
        params: &MockParams,
        grid: [u32; 3],
    ) -> Result<(), BackendError> {
        if self.take_failure(FailPoint::Dispatch) {
            return Err(BackendError::Device("injected dispatch failure".into()));
        }
        let mut state = self.state.borrow_mut();
        let p = *state
            .params
            .get(&params.0)
            .ok_or_else(|| BackendError::Device("unknown parameter block".into()))?;
        if grid[0] * GROUP_X < p.dst_width || grid[1] * GROUP_Y < p.dst_height || grid[2] != 1 {
            return Err(BackendError::Device(format!(
                "dispatch grid {grid:?} under-covers {}x{} output",
                p.dst_width, p.dst_height
            )));
        }
        let result = {
            let src = state
                .inputs
                .get(&input.0)
                .ok_or_else(|| BackendError::Device("unknown input view".into()))?;
            if src.width != p.src_width || src.height != p.src_height {
                return Err(BackendError::Device(
                    "parameter block does not match input view".into(),
                ));
            }
            box_downsample(src, &p)
        };
        let dst = state
            .outputs
            .get_mut(&output.0)
            .ok_or_else(|| BackendError::Device("unknown output view".into()))?;
        if dst.width != p.dst_width || dst.height != p.dst_height || dst.channels != 4 {
            return Err(BackendError::Device(
                "parameter block does not match output view".into(),
            ));
        }
        dst.bytes = Some(result);
        state.dispatches.push(DispatchRecord { params: p, grid });
        Ok(())
    }

    fn read_back(&self, output: &MockOutput, expected_len: usize) -> Result<Vec<u8>, BackendError> {
        if self.take_failure(FailPoint::Readback) {
            return Err(BackendError::Device("injected readback failure".into()));
        }
        let truncate = self.take_failure(FailPoint::ShortReadback);
        let state = self.state.borrow();
        let dst = state
            .outputs
            .get(&output.0)
            .ok_or_else(|| BackendError::Device("unknown output view".into()))?;
        let mut bytes = dst
            .bytes
            .clone()
            .ok_or_else(|| BackendError::Device("readback before dispatch".into()))?;
        if truncate {
            bytes.truncate(bytes.len().saturating_sub(4));
        }
        if bytes.len() != expected_len {
            return Err(BackendError::ShortRead {
                expected: expected_len,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    fn release_input(&self, view: MockInput) {
        let mut state = self.state.borrow_mut();
        if state.inputs.remove(&view.0).is_some() {
            state.counters.input_frees += 1;
        } else {
            state.double_release = true;
        }
    }

    fn release_output(&self, view: MockOutput) {
        let mut state = self.state.borrow_mut();
        if state.outputs.remove(&view.0).is_some() {
            state.counters.output_frees += 1;
        } else {
            state.double_release = true;
        }
    }

    fn release_params(&self, block: MockParams) {
        let mut state = self.state.borrow_mut();
        if state.params.remove(&block.0).is_some() {
            state.counters.params_frees += 1;
        } else {
            state.double_release = true;
        }
    }
}

/// CPU reference of the downsample kernel: each destination pixel is the
/// rounded average of its 2x2 source block, degenerating to 2x1, 1x2 or
/// 1x1 at an odd source edge.
fn box_downsample(src: &InputData, p: &DownsampleParameters) -> Vec<u8> {
    let (sw, sh) = (p.src_width as usize, p.src_height as usize);
    let (dw, dh) = (p.dst_width as usize, p.dst_height as usize);
    let mut out = vec![0u8; dw * dh * 4];
    for y in 0..dh {
        for x in 0..dw {
            let sx = x * 2;
            let sy = y * 2;
            let span_x = if sx + 1 < sw { 2 } else { 1 };
            let span_y = if sy + 1 < sh { 2 } else { 1 };
            let total = (span_x * span_y) as u32;
            for c in 0..4 {
                let mut sum = 0u32;
                for dy in 0..span_y {
                    for dx in 0..span_x {
                        sum += src.bytes[((sy + dy) * sw + sx + dx) * 4 + c] as u32;
                    }
                }
                out[(y * dw + x) * 4 + c] = ((sum + total / 2) / total) as u8;
            }
        }
    }
    out
}
