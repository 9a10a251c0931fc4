//! In-process kernel for host tests and tooling.

use tracing::{debug, warn};

use crate::exec::{CommandExecutor, ExecStats};
use crate::kernel::{
    CacheOp, KernelError, KernelInit, KernelReply, KernelRequest, TessellationBuffer, VgKernel,
};
use crate::memory::{MemoryBus, MemoryHandle, VideoMemory};

/// Physical base address of the simulated video memory.
pub const SIM_MEMORY_BASE: u32 = 0x8000_0000;
pub const SIM_DEFAULT_MEMORY_BYTES: u32 = 16 << 20;

/// A command buffer as it was handed to [`SimulatedKernel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub command_id: u32,
    pub address: u32,
    pub commands: Vec<u8>,
    pub stats: Option<ExecStats>,
}

#[derive(Debug, Default)]
struct Session {
    command_buffers: Vec<(MemoryHandle, u32, u32)>,
    tessellation: Option<MemoryHandle>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlexaState {
    pub enabled: bool,
    pub background_address: u32,
    pub stopped_frames: u32,
}

/// [`VgKernel`] that executes submissions synchronously with the reference executor.
#[derive(Debug)]
pub struct SimulatedKernel {
    memory: VideoMemory,
    executor: CommandExecutor,
    session: Option<Session>,
    submissions: Vec<Submission>,
    in_flight: bool,
    injected_timeouts: u32,
    flexa: FlexaState,
    cache_ops: Vec<(MemoryHandle, CacheOp)>,
    resets: u32,
}

impl Default for SimulatedKernel {
    fn default() -> Self {
        Self::new(SIM_DEFAULT_MEMORY_BYTES)
    }
}

impl SimulatedKernel {
    pub fn new(memory_bytes: u32) -> Self {
        Self {
            memory: VideoMemory::new(SIM_MEMORY_BASE, memory_bytes),
            executor: CommandExecutor::new(),
            session: None,
            submissions: Vec::new(),
            in_flight: false,
            injected_timeouts: 0,
            flexa: FlexaState::default(),
            cache_ops: Vec::new(),
            resets: 0,
        }
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn take_submissions(&mut self) -> Vec<Submission> {
        std::mem::take(&mut self.submissions)
    }

    /// Makes the next `count` waits fail with [`KernelError::Timeout`].
    pub fn inject_timeouts(&mut self, count: u32) {
        self.injected_timeouts = count;
    }

    /// Whether a submission has not been waited on yet.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn video_memory(&self) -> &VideoMemory {
        &self.memory
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn flexa(&self) -> FlexaState {
        self.flexa
    }

    pub fn cache_ops(&self) -> &[(MemoryHandle, CacheOp)] {
        &self.cache_ops
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    fn initialize(
        &mut self,
        command_buffer_size: u32,
        command_buffer_count: u32,
        tess_width: u32,
        tess_height: u32,
    ) -> Result<KernelReply, KernelError> {
        if command_buffer_size == 0 || !(1..=2).contains(&command_buffer_count) {
            return Err(KernelError::InvalidArgument(format!(
                "{command_buffer_count} command buffers of {command_buffer_size} bytes"
            )));
        }
        if self.session.is_some() {
            self.terminate()?;
        }

        let mut session = Session::default();
        for _ in 0..command_buffer_count {
            match self.memory.allocate(command_buffer_size) {
                Ok((handle, address)) => {
                    session.command_buffers.push((handle, address, command_buffer_size))
                }
                Err(err) => {
                    self.release(session);
                    return Err(err.into());
                }
            }
        }

        let mut tessellation = TessellationBuffer::default();
        if tess_width > 0 && tess_height > 0 {
            tessellation = TessellationBuffer::geometry(tess_width, tess_height);
            match self.memory.allocate(tessellation.total_bytes()) {
                Ok((handle, address)) => {
                    tessellation.address = address;
                    session.tessellation = Some(handle);
                }
                Err(err) => {
                    self.release(session);
                    return Err(err.into());
                }
            }
        }

        let init = KernelInit {
            command_buffers: session.command_buffers.iter().map(|b| b.1).collect(),
            tessellation,
        };
        debug!(
            command_buffers = command_buffer_count,
            command_buffer_size,
            tess_bytes = tessellation.total_bytes(),
            "simulated kernel initialized"
        );
        self.session = Some(session);
        self.in_flight = false;
        Ok(KernelReply::Initialized(init))
    }

    fn release(&mut self, session: Session) {
        let handles = session
            .command_buffers
            .iter()
            .map(|b| b.0)
            .chain(session.tessellation);
        for handle in handles {
            if let Err(err) = self.memory.free(handle) {
                warn!(handle = handle.0, %err, "failed to release kernel buffer");
            }
        }
    }

    fn terminate(&mut self) -> Result<KernelReply, KernelError> {
        if let Some(session) = self.session.take() {
            self.release(session);
        }
        self.in_flight = false;
        self.flexa = FlexaState::default();
        Ok(KernelReply::Done)
    }

    fn submit(&mut self, command_id: u32, commands: Vec<u8>) -> Result<KernelReply, KernelError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| KernelError::InvalidArgument("submit before initialize".into()))?;
        let &(_, address, capacity) = session
            .command_buffers
            .get(command_id as usize)
            .ok_or_else(|| KernelError::InvalidArgument(format!("no command buffer {command_id}")))?;
        if commands.len() > capacity as usize {
            return Err(KernelError::InvalidArgument(format!(
                "{} command bytes exceed the {capacity}-byte buffer",
                commands.len()
            )));
        }

        self.memory.write_physical(address as u64, &commands);
        debug!(command_id, address, bytes = commands.len(), "command buffer submitted");
        let result = self.executor.execute(&mut self.memory, &commands);
        self.in_flight = true;

        let stats = match &result {
            Ok(stats) => Some(*stats),
            Err(err) => {
                warn!(command_id, %err, "command buffer rejected by the executor");
                None
            }
        };
        self.submissions.push(Submission {
            command_id,
            address,
            commands,
            stats,
        });
        match result {
            Ok(_) => Ok(KernelReply::Done),
            Err(err) => Err(KernelError::GenericIo(err.to_string())),
        }
    }

    fn wait(&mut self, timeout_ms: u32) -> Result<KernelReply, KernelError> {
        if self.injected_timeouts > 0 {
            self.injected_timeouts -= 1;
            warn!(timeout_ms, "simulated wait timed out");
            return Err(KernelError::Timeout(timeout_ms));
        }
        self.in_flight = false;
        Ok(KernelReply::Done)
    }
}

impl VgKernel for SimulatedKernel {
    fn dispatch(&mut self, request: KernelRequest) -> Result<KernelReply, KernelError> {
        match request {
            KernelRequest::Initialize {
                command_buffer_size,
                command_buffer_count,
                tess_width,
                tess_height,
            } => self.initialize(command_buffer_size, command_buffer_count, tess_width, tess_height),
            KernelRequest::Terminate => self.terminate(),
            KernelRequest::Allocate { bytes, .. } => {
                let (handle, address) = self.memory.allocate(bytes)?;
                Ok(KernelReply::Allocated { handle, address })
            }
            KernelRequest::Free { handle } | KernelRequest::Unmap { handle } => {
                self.memory.free(handle)?;
                Ok(KernelReply::Done)
            }
            KernelRequest::Map { bytes, physical } => {
                let handle = self.memory.map(physical, bytes)?;
                Ok(KernelReply::Mapped { handle })
            }
            KernelRequest::Submit {
                command_id,
                commands,
            } => self.submit(command_id, commands),
            KernelRequest::Wait { timeout_ms, .. } => self.wait(timeout_ms),
            KernelRequest::Check { address } => Ok(KernelReply::Value(self.executor.registers().get(address))),
            KernelRequest::FlexaEnable => {
                self.flexa.enabled = true;
                Ok(KernelReply::Done)
            }
            KernelRequest::FlexaDisable => {
                self.flexa.enabled = false;
                Ok(KernelReply::Done)
            }
            KernelRequest::FlexaSetBackgroundAddress { address } => {
                self.flexa.background_address = address;
                Ok(KernelReply::Done)
            }
            KernelRequest::FlexaStopFrame => {
                self.flexa.stopped_frames += 1;
                Ok(KernelReply::Done)
            }
            KernelRequest::Reset => {
                self.executor.reset();
                self.in_flight = false;
                self.resets += 1;
                Ok(KernelReply::Done)
            }
            KernelRequest::QueryMem => Ok(KernelReply::MemFree {
                bytes_free: self.memory.bytes_free(),
            }),
            KernelRequest::CacheOp { handle, op } => {
                if self.memory.region(handle).is_none() {
                    return Err(KernelError::InvalidArgument(format!(
                        "cache op on unknown handle {handle:?}"
                    )));
                }
                self.cache_ops.push((handle, op));
                Ok(KernelReply::Done)
            }
        }
    }

    fn memory(&mut self) -> &mut dyn MemoryBus {
        &mut self.memory
    }
}
