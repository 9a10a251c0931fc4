//! Unbounded command stream builder.
//!
//! Intended for tests/fixtures and host-side tooling that needs canonical VGLite streams without
//! a kernel or a fixed-capacity command buffer. It uses the same encoders as the driver, so a
//! stream built here is byte-identical to what the driver emits for the same calls.

use super::cmd::{
    write_call, write_data, write_end, write_nop, write_rectangle, write_return, write_stall,
    write_state, write_state_f32, write_states, MAX_STATES_COUNT,
};

#[derive(Debug, Default, Clone)]
pub struct VgCmdWriter {
    buf: Vec<u8>,
}

impl VgCmdWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn state(&mut self, address: u32, value: u32) -> &mut Self {
        write_state(&mut self.buf, address, value);
        self
    }

    pub fn state_f32(&mut self, address: u32, value: f32) -> &mut Self {
        write_state_f32(&mut self.buf, address, value);
        self
    }

    pub fn states(&mut self, address: u32, values: &[u32]) -> &mut Self {
        assert!(
            values.len() <= MAX_STATES_COUNT,
            "STATES record limited to {MAX_STATES_COUNT} values"
        );
        write_states(&mut self.buf, address, values);
        self
    }

    pub fn data(&mut self, payload: &[u8]) -> &mut Self {
        write_data(&mut self.buf, payload);
        self
    }

    pub fn rectangle(&mut self, x: i32, y: i32, width: i32, height: i32) -> &mut Self {
        write_rectangle(&mut self.buf, x, y, width, height);
        self
    }

    pub fn call(&mut self, address: u32, bytes: u32) -> &mut Self {
        write_call(&mut self.buf, address, bytes);
        self
    }

    pub fn stall(&mut self, module: u32) -> &mut Self {
        write_stall(&mut self.buf, module);
        self
    }

    pub fn end(&mut self, event: u32) -> &mut Self {
        write_end(&mut self.buf, event);
        self
    }

    pub fn ret(&mut self) -> &mut Self {
        write_return(&mut self.buf);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        write_nop(&mut self.buf);
        self
    }
}
