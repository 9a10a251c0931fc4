//! The render context: command buffer ownership, the record encoder and submission.
//!
//! A [`RenderContext`] moves through three states per command buffer:
//!
//! * idle: the active buffer is empty;
//! * encoding: records have been appended but not submitted;
//! * submitted: the kernel owns a copy of the stream and `in_flight` is set.
//!
//! At most one submission is ever in flight. [`RenderContext::submit`] and the implicit
//! submission on buffer overflow both stall on the previous one first.

use std::fmt;

use tracing::{debug, trace, warn};
use vglite_kernel::{
    KernelError, KernelReply, KernelRequest, TessellationBuffer, VgKernel, VgKernelExt,
    VG_LITE_INFINITE,
};
use vglite_protocol::{cmd, regs, EVENT_END, EVENT_FRAME_END};

use crate::cmd::CommandBuffer;
use crate::config::{Capabilities, DriverConfig, Feature};
use crate::error::{VgError, VgResult};
use crate::steps::{NoCorrection, StepCorrection};
use crate::target::TargetState;

/// Deadline used by [`RenderContext::finish`].
pub const FINISH_TIMEOUT_MS: u32 = 5000;

/// Event mask that waits for any completion event.
pub const ALL_EVENTS: u32 = !0;

/// Completion event requested by [`RenderContext::frame_delimiter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FrameFlag {
    #[default]
    Continue,
    End,
}

pub struct RenderContext<K: VgKernel> {
    kernel: K,
    config: DriverConfig,
    buffers: Vec<CommandBuffer>,
    active: usize,
    in_flight: bool,
    frame_end: bool,
    tessellation: TessellationBuffer,
    correction: Box<dyn StepCorrection>,
    pub(crate) state: TargetState,
}

impl<K: VgKernel> fmt::Debug for RenderContext<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("config", &self.config)
            .field("buffers", &self.buffers.len())
            .field("active", &self.active)
            .field("in_flight", &self.in_flight)
            .field("tessellation", &self.tessellation)
            .field("correction", &self.correction)
            .finish_non_exhaustive()
    }
}

impl<K: VgKernel> RenderContext<K> {
    /// Initializes the kernel and binds its command buffers.
    ///
    /// The tessellation buffer states and zeroed color keys are encoded into the first command
    /// buffer but not submitted; they go out with the first flush.
    pub fn init(mut kernel: K, config: DriverConfig) -> VgResult<Self> {
        config.validate()?;
        let (tess_width, tess_height) = config.tessellation_window();
        let size = config.command_buffer_size();
        let count = config.command_buffer_count();

        let reply = kernel.dispatch(KernelRequest::Initialize {
            command_buffer_size: size,
            command_buffer_count: count,
            tess_width,
            tess_height,
        })?;
        let KernelReply::Initialized(init) = reply else {
            return Err(VgError::GenericIo(format!("unexpected reply to initialize: {reply:?}")));
        };
        if init.command_buffers.len() != count as usize {
            return Err(VgError::GenericIo(format!(
                "kernel returned {} command buffers, expected {count}",
                init.command_buffers.len()
            )));
        }

        let buffers = init
            .command_buffers
            .iter()
            .map(|&address| CommandBuffer::new(address, size as usize))
            .collect();
        let mut ctx = Self {
            kernel,
            config,
            buffers,
            active: 0,
            in_flight: false,
            frame_end: false,
            tessellation: init.tessellation,
            correction: Box::new(NoCorrection),
            state: TargetState::default(),
        };
        ctx.program_tessellation()?;
        for i in 0..8 {
            ctx.push_state(regs::COLOR_KEY_LOW + i, 0)?;
        }
        debug!(
            command_buffers = count,
            command_buffer_size = size,
            tess_width,
            tess_height,
            "render context initialized"
        );
        Ok(ctx)
    }

    fn program_tessellation(&mut self) -> VgResult<()> {
        let tess = self.tessellation;
        if tess.total_bytes() == 0 {
            return Ok(());
        }
        self.push_state(regs::TESS_BUFFER_ADDRESS, tess.address)?;
        self.push_state(regs::TESS_L1_ADDRESS, tess.l1_address())?;
        self.push_state(regs::TESS_L2_ADDRESS, tess.l2_address())?;
        self.push_state(regs::TESS_STRIDE, tess.stride)?;
        self.push_state(regs::TS_BUFFER_ADDRESS, tess.address)?;
        self.push_state(regs::TS_L1_ADDRESS, tess.l1_address())?;
        self.push_state(regs::TS_L2_ADDRESS, tess.l2_address())?;
        self.push_state(regs::TS_STRIDE, tess.stride)?;
        self.push_state(regs::TESS_WINDOW_SIZE, tess.window())?;
        self.push_state(regs::TESS_SIZE, tess.tess_size() / 64)
    }

    /// Drains outstanding work, releases the scissor layer and tears the kernel session down.
    ///
    /// Every later call that needs a command buffer fails with [`VgError::NoContext`].
    pub fn terminate(&mut self) -> VgResult<()> {
        if self.buffers.is_empty() {
            return Err(VgError::NoContext);
        }
        self.finish()?;
        if let Some(mut layer) = self.state.scissor_layer.take() {
            self.free(&mut layer)?;
        }
        self.kernel.dispatch(KernelRequest::Terminate)?;
        self.buffers.clear();
        self.active = 0;
        self.in_flight = false;
        self.frame_end = false;
        self.state = TargetState::default();
        debug!("render context terminated");
        Ok(())
    }

    pub fn into_kernel(self) -> K {
        self.kernel
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.config.capabilities
    }

    pub fn query_feature(&self, feature: Feature) -> bool {
        self.config.capabilities.contains(feature.capability())
    }

    pub(crate) fn has(&self, cap: Capabilities) -> bool {
        self.config.capabilities.contains(cap)
    }

    pub(crate) fn require(&self, cap: Capabilities, what: &'static str) -> VgResult<()> {
        if self.has(cap) {
            Ok(())
        } else {
            Err(VgError::NotSupport(what))
        }
    }

    pub fn set_step_correction(&mut self, correction: Box<dyn StepCorrection>) {
        self.correction = correction;
    }

    pub(crate) fn step_correction(&self) -> &dyn StepCorrection {
        self.correction.as_ref()
    }

    pub fn tessellation(&self) -> &TessellationBuffer {
        &self.tessellation
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Index of the command buffer currently being encoded.
    pub fn active_buffer(&self) -> usize {
        self.active
    }

    /// Bytes encoded into the active buffer since its last submission.
    pub fn pending_bytes(&self) -> usize {
        self.buffers.get(self.active).map_or(0, CommandBuffer::offset)
    }

    pub fn pending_commands(&self) -> &[u8] {
        self.buffers
            .get(self.active)
            .map_or(&[], CommandBuffer::as_bytes)
    }

    pub fn is_single_buffered(&self) -> bool {
        self.buffers.len() == 1
    }

    /// Makes room for a `len`-byte record, submitting the active buffer if it is full.
    fn reserve(&mut self, len: usize) -> VgResult<&mut Vec<u8>> {
        let buffer = self.buffers.get(self.active).ok_or(VgError::NoContext)?;
        if !buffer.can_ever_fit(len) {
            return Err(VgError::OutOfResources(format!(
                "{len}-byte record does not fit a {}-byte command buffer",
                buffer.capacity()
            )));
        }
        if !buffer.fits(len) {
            trace!(offset = buffer.offset(), len, "command buffer full");
            self.submit()?;
            self.stall(0, ALL_EVENTS)?;
        }
        let buffer = self.buffers.get_mut(self.active).ok_or(VgError::NoContext)?;
        Ok(buffer.bytes_mut())
    }

    pub fn push_state(&mut self, address: u32, value: u32) -> VgResult<()> {
        let out = self.reserve(cmd::STATE_BYTES)?;
        trace!(offset = out.len(), address, value, "STATE");
        cmd::write_state(out, address, value);
        Ok(())
    }

    /// Writes the IEEE-754 bit pattern of `value`.
    pub fn push_state_f32(&mut self, address: u32, value: f32) -> VgResult<()> {
        self.push_state(address, value.to_bits())
    }

    /// Writes `values` to consecutive registers starting at `address` in one record.
    pub fn push_states(&mut self, address: u32, values: &[u32]) -> VgResult<()> {
        if values.is_empty() || values.len() > cmd::MAX_STATES_COUNT {
            return Err(VgError::invalid(format!(
                "STATES record of {} values",
                values.len()
            )));
        }
        let out = self.reserve(cmd::states_bytes(values.len()))?;
        trace!(offset = out.len(), address, count = values.len(), "STATES");
        cmd::write_states(out, address, values);
        Ok(())
    }

    /// Loads a color lookup table. Palettes hold 2, 4, 16 or 256 entries.
    pub fn push_clut(&mut self, address: u32, colors: &[u32]) -> VgResult<()> {
        if !matches!(colors.len(), 2 | 4 | 16 | 256) {
            return Err(VgError::invalid(format!("CLUT of {} entries", colors.len())));
        }
        self.push_states(address, colors)
    }

    /// Appends a `DATA` block, zero-padding the payload to 8 bytes.
    pub fn push_data(&mut self, payload: &[u8]) -> VgResult<()> {
        let out = self.reserve(cmd::data_bytes(payload.len()))?;
        trace!(offset = out.len(), bytes = payload.len(), "DATA");
        cmd::write_data(out, payload);
        Ok(())
    }

    pub fn push_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32) -> VgResult<()> {
        let out = self.reserve(cmd::RECTANGLE_BYTES)?;
        trace!(offset = out.len(), x, y, width, height, "RECTANGLE");
        cmd::write_rectangle(out, x, y, width, height);
        Ok(())
    }

    /// Calls into a command sub-buffer. Parts without the call fix need a front-end stall
    /// afterwards.
    pub fn push_call(&mut self, address: u32, bytes: u32) -> VgResult<()> {
        let out = self.reserve(cmd::CALL_BYTES)?;
        trace!(offset = out.len(), address, bytes, "CALL");
        cmd::write_call(out, address, bytes);
        if !self.has(Capabilities::CALL_FIX) {
            self.push_stall(cmd::STALL_MODULE_FRONT_END)?;
        }
        Ok(())
    }

    pub fn push_stall(&mut self, module: u32) -> VgResult<()> {
        let out = self.reserve(cmd::STALL_BYTES)?;
        trace!(offset = out.len(), module, "STALL");
        cmd::write_stall(out, module);
        Ok(())
    }

    /// Terminates the active buffer with `END` and hands it to the kernel.
    ///
    /// The cursor rewinds to zero whether or not the kernel accepts the stream.
    pub fn submit(&mut self) -> VgResult<()> {
        let active = self.active;
        let buffer = self.buffers.get(active).ok_or(VgError::NoContext)?;
        if buffer.is_empty() {
            return Err(VgError::invalid("nothing to submit"));
        }
        if self.in_flight {
            self.stall(0, ALL_EVENTS)?;
        }

        let event = if std::mem::take(&mut self.frame_end) {
            EVENT_FRAME_END
        } else {
            EVENT_END
        };
        let buffer = self.buffers.get_mut(active).ok_or(VgError::NoContext)?;
        let mut commands = buffer.take();
        cmd::write_end(&mut commands, event);
        debug!(
            command_id = active,
            bytes = commands.len(),
            event,
            "submitting command buffer"
        );
        self.kernel.dispatch(KernelRequest::Submit {
            command_id: active as u32,
            commands,
        })?;
        self.in_flight = true;
        Ok(())
    }

    /// Blocks until the last submission completes. A zero timeout waits forever.
    ///
    /// The in-flight flag is cleared on every return, including a timeout.
    pub fn stall(&mut self, timeout_ms: u32, event_mask: u32) -> VgResult<()> {
        let timeout_ms = if timeout_ms == 0 { VG_LITE_INFINITE } else { timeout_ms };
        let result = self.kernel.dispatch(KernelRequest::Wait {
            timeout_ms,
            event_mask,
        });
        self.in_flight = false;
        match result {
            Ok(_) => Ok(()),
            Err(KernelError::Timeout(ms)) => {
                warn!(timeout_ms = ms, "stall timed out; GPU work continues");
                Err(VgError::Timeout(ms))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn flush_target(&mut self) -> VgResult<()> {
        self.push_state(regs::FLUSH, regs::flush::TARGET)?;
        self.push_stall(cmd::STALL_MODULE_PIXEL_ENGINE)
    }

    fn close_buffer(&mut self) -> VgResult<()> {
        self.push_state(regs::CONTROL, regs::control::RECTANGLE)?;
        self.flush_target()?;
        self.submit()
    }

    fn swap_buffers(&mut self) {
        if self.buffers.len() > 1 {
            self.active ^= 1;
        }
    }

    /// Submits everything encoded so far and waits for the GPU to finish it.
    pub fn finish(&mut self) -> VgResult<()> {
        if self.buffers.is_empty() {
            return Err(VgError::NoContext);
        }
        if self.pending_bytes() == 0 {
            if self.in_flight {
                self.stall(0, ALL_EVENTS)?;
            }
            return Ok(());
        }
        self.close_buffer()?;
        self.stall(FINISH_TIMEOUT_MS, ALL_EVENTS)?;
        self.swap_buffers();
        Ok(())
    }

    /// Submits everything encoded so far without waiting, then switches buffers.
    pub fn flush(&mut self) -> VgResult<()> {
        if self.buffers.is_empty() {
            return Err(VgError::NoContext);
        }
        if self.is_single_buffered() {
            return Err(VgError::NotSupport("flush with a single command buffer"));
        }
        if self.pending_bytes() == 0 {
            return Ok(());
        }
        if self.in_flight {
            self.stall(0, ALL_EVENTS)?;
        }
        self.close_buffer()?;
        self.swap_buffers();
        Ok(())
    }

    /// Finishes the frame. With [`FrameFlag::End`] the closing `END` carries the frame-end event.
    pub fn frame_delimiter(&mut self, flag: FrameFlag) -> VgResult<()> {
        self.frame_end = flag == FrameFlag::End;
        self.finish()
    }

    /// Reads a hardware register.
    pub fn get_register(&mut self, address: u32) -> VgResult<u32> {
        Ok(self.kernel.check(address)?)
    }

    /// Free video memory as reported by the kernel.
    pub fn query_mem(&mut self) -> VgResult<u32> {
        Ok(self.kernel.query_mem()?)
    }

    /// Resets the GPU. Encoded but unsubmitted records are kept.
    pub fn reset(&mut self) -> VgResult<()> {
        self.kernel.dispatch(KernelRequest::Reset)?;
        self.in_flight = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{context, register_writes};
    use pretty_assertions::assert_eq;

    #[test]
    fn init_programs_tessellation_without_submitting() {
        let ctx = context(DriverConfig::default());
        assert!(ctx.kernel().submissions().is_empty());
        let writes = register_writes(ctx.pending_commands());
        assert_eq!(writes.len(), 10 + 8);
        assert_eq!(writes[0], (regs::TESS_BUFFER_ADDRESS, ctx.tessellation().address));
        assert_eq!(writes[9], (regs::TESS_SIZE, ctx.tessellation().tess_size() / 64));
        assert_eq!(writes[17], (regs::COLOR_KEY_LOW + 7, 0));
    }

    #[test]
    fn submit_from_idle_is_rejected() {
        let mut ctx = context(DriverConfig::default());
        ctx.submit().unwrap();
        assert!(matches!(ctx.submit(), Err(VgError::InvalidArgument(_))));
    }

    #[test]
    fn second_submit_stalls_first() {
        let mut ctx = context(DriverConfig::default());
        ctx.submit().unwrap();
        assert!(ctx.in_flight());
        ctx.push_state(regs::COLOR, 1).unwrap();
        ctx.submit().unwrap();
        assert!(ctx.in_flight());
        ctx.stall(0, ALL_EVENTS).unwrap();
        assert!(!ctx.in_flight());
        assert!(!ctx.kernel().in_flight());
    }

    #[test]
    fn oversized_data_is_out_of_resources() {
        let mut ctx = context(DriverConfig {
            command_buffer_size: Some(256),
            ..DriverConfig::default()
        });
        let before = ctx.pending_bytes();
        let err = ctx.push_data(&[0u8; 248]).unwrap_err();
        assert!(matches!(err, VgError::OutOfResources(_)));
        assert_eq!(ctx.pending_bytes(), before);
        ctx.push_data(&[0u8; 240]).unwrap();
    }

    #[test]
    fn clut_sizes_are_checked() {
        let mut ctx = context(DriverConfig::default());
        assert!(matches!(
            ctx.push_clut(regs::CLUT, &[0; 3]),
            Err(VgError::InvalidArgument(_))
        ));
        ctx.push_clut(regs::CLUT, &[0; 16]).unwrap();
    }

    #[test]
    fn finish_swaps_buffers_and_flush_is_rejected_when_single_buffered() {
        let mut ctx = context(DriverConfig::default());
        ctx.finish().unwrap();
        assert_eq!(ctx.active_buffer(), 1);
        assert_eq!(ctx.pending_bytes(), 0);
        assert!(!ctx.in_flight());

        let mut single = context(DriverConfig {
            single_command_buffer: true,
            ..DriverConfig::default()
        });
        assert_eq!(
            single.flush(),
            Err(VgError::NotSupport("flush with a single command buffer"))
        );
        single.finish().unwrap();
        assert_eq!(single.active_buffer(), 0);
    }

    #[test]
    fn frame_delimiter_marks_the_end_event() {
        let mut ctx = context(DriverConfig::default());
        ctx.frame_delimiter(FrameFlag::End).unwrap();
        let sub = &ctx.kernel().submissions()[0];
        assert_eq!(sub.stats.as_ref().map(|s| s.event), Some(EVENT_FRAME_END));

        ctx.push_state(regs::COLOR, 0).unwrap();
        ctx.finish().unwrap();
        let sub = &ctx.kernel().submissions()[1];
        assert_eq!(sub.stats.as_ref().map(|s| s.event), Some(EVENT_END));
    }

    #[test]
    fn terminated_context_has_no_buffers() {
        let mut ctx = context(DriverConfig::default());
        ctx.terminate().unwrap();
        assert_eq!(ctx.push_state(regs::COLOR, 0), Err(VgError::NoContext));
        assert_eq!(ctx.submit(), Err(VgError::NoContext));
        assert!(!ctx.kernel().is_initialized());
    }
}
