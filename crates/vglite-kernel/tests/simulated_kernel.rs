use pretty_assertions::assert_eq;
use vglite_kernel::{
    KernelError, KernelReply, KernelRequest, MemoryBus, SimulatedKernel, VgKernel, VgKernelExt,
    VG_LITE_INFINITE,
};
use vglite_protocol::regs::{self, control, path};
use vglite_protocol::{VgCmdWriter, EVENT_END, EVENT_FRAME_END};

const RED: u32 = 0xFF00_00FF;

fn init(kernel: &mut SimulatedKernel) -> Vec<u32> {
    let reply = kernel
        .dispatch(KernelRequest::Initialize {
            command_buffer_size: 4096,
            command_buffer_count: 2,
            tess_width: 128,
            tess_height: 128,
        })
        .unwrap();
    match reply {
        KernelReply::Initialized(init) => {
            assert_eq!(init.tessellation.tiled, 3);
            init.command_buffers
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

fn bind_target(w: &mut VgCmdWriter, address: u32, width: u32, height: u32) {
    w.state(regs::TARGET_CONFIG, 0x03)
        .state(regs::TARGET_ADDRESS, address)
        .state(regs::TARGET_STRIDE, width * 4)
        .state(regs::TARGET_EXTENT, width | (height << 16))
        .state(regs::PATH_CONTROL, 0);
}

fn pixel(kernel: &mut SimulatedKernel, address: u32, stride: u32, x: u32, y: u32) -> [u8; 4] {
    let mut px = [0u8; 4];
    kernel
        .memory()
        .read_physical((address + y * stride + x * 4) as u64, &mut px);
    px
}

#[test]
fn clear_rectangle_writes_only_the_covered_pixels() {
    let mut kernel = SimulatedKernel::default();
    init(&mut kernel);
    let (_, target) = kernel.allocate(8 * 8 * 4, true).unwrap();

    let mut w = VgCmdWriter::new();
    bind_target(&mut w, target, 8, 8);
    w.state(regs::CONTROL, control::RECTANGLE)
        .state(regs::COLOR, RED)
        .rectangle(2, 2, 4, 4)
        .end(EVENT_FRAME_END);
    kernel
        .dispatch(KernelRequest::Submit {
            command_id: 0,
            commands: w.finish(),
        })
        .unwrap();

    assert_eq!(pixel(&mut kernel, target, 32, 2, 2), [0x00, 0x00, 0xFF, 0xFF]);
    assert_eq!(pixel(&mut kernel, target, 32, 5, 5), [0x00, 0x00, 0xFF, 0xFF]);
    assert_eq!(pixel(&mut kernel, target, 32, 6, 6), [0; 4]);
    assert_eq!(pixel(&mut kernel, target, 32, 1, 2), [0; 4]);

    let stats = kernel.submissions()[0].stats.unwrap();
    assert_eq!(stats.rectangles, 1);
    assert_eq!(stats.event, EVENT_FRAME_END);
}

#[test]
fn rectangle_is_clipped_to_the_target_extent() {
    let mut kernel = SimulatedKernel::default();
    init(&mut kernel);
    let (_, target) = kernel.allocate(8 * 8 * 4, true).unwrap();

    let mut w = VgCmdWriter::new();
    bind_target(&mut w, target, 8, 4);
    w.state(regs::CONTROL, control::RECTANGLE)
        .state(regs::COLOR, RED)
        .rectangle(0, 0, 8, 8)
        .end(EVENT_END);
    kernel
        .dispatch(KernelRequest::Submit {
            command_id: 1,
            commands: w.finish(),
        })
        .unwrap();

    assert_eq!(pixel(&mut kernel, target, 32, 7, 3)[2], 0xFF);
    assert_eq!(pixel(&mut kernel, target, 32, 0, 4), [0; 4]);
}

#[test]
fn call_executes_a_sub_stream_from_video_memory() {
    let mut kernel = SimulatedKernel::default();
    init(&mut kernel);
    let (_, target) = kernel.allocate(4 * 4 * 4, true).unwrap();
    let (_, sub_address) = kernel.allocate(64, true).unwrap();

    let mut sub = VgCmdWriter::new();
    sub.rectangle(0, 0, 4, 4).ret();
    let sub = sub.finish();
    kernel.memory().write_physical(sub_address as u64, &sub);

    let mut w = VgCmdWriter::new();
    bind_target(&mut w, target, 4, 4);
    w.state(regs::CONTROL, control::RECTANGLE)
        .state(regs::COLOR, RED)
        .call(sub_address, sub.len() as u32)
        .end(EVENT_END);
    kernel
        .dispatch(KernelRequest::Submit {
            command_id: 0,
            commands: w.finish(),
        })
        .unwrap();

    assert_eq!(pixel(&mut kernel, target, 16, 3, 3), [0x00, 0x00, 0xFF, 0xFF]);
}

#[test]
fn path_data_is_left_to_the_tessellator() {
    let mut kernel = SimulatedKernel::default();
    init(&mut kernel);
    let (_, target) = kernel.allocate(4 * 4 * 4, true).unwrap();

    let mut w = VgCmdWriter::new();
    bind_target(&mut w, target, 4, 4);
    w.state(regs::CONTROL, control::RECTANGLE)
        .state(regs::PATH_CONTROL, path::BASE_DRAW)
        .data(&[0u8; 24])
        .state(regs::PATH_CONTROL, 0)
        .end(EVENT_END);
    kernel
        .dispatch(KernelRequest::Submit {
            command_id: 0,
            commands: w.finish(),
        })
        .unwrap();

    let stats = kernel.submissions()[0].stats.unwrap();
    assert_eq!(stats.path_blocks, 1);
    assert_eq!(stats.rectangles, 0);
    assert_eq!(pixel(&mut kernel, target, 16, 0, 0), [0; 4]);
}

#[test]
fn stream_without_end_is_reported_as_io_failure() {
    let mut kernel = SimulatedKernel::default();
    init(&mut kernel);
    let mut w = VgCmdWriter::new();
    w.state(regs::COLOR, RED);

    let err = kernel
        .dispatch(KernelRequest::Submit {
            command_id: 0,
            commands: w.finish(),
        })
        .unwrap_err();
    assert!(matches!(err, KernelError::GenericIo(_)), "{err:?}");
    assert_eq!(kernel.submissions().len(), 1);
    assert!(kernel.submissions()[0].stats.is_none());
}

#[test]
fn submit_before_initialize_is_rejected() {
    let mut kernel = SimulatedKernel::default();
    let mut w = VgCmdWriter::new();
    w.end(EVENT_END);
    let err = kernel
        .dispatch(KernelRequest::Submit {
            command_id: 0,
            commands: w.finish(),
        })
        .unwrap_err();
    assert!(matches!(err, KernelError::InvalidArgument(_)));
}

#[test]
fn injected_timeouts_are_consumed_in_order() {
    let mut kernel = SimulatedKernel::default();
    init(&mut kernel);
    kernel.inject_timeouts(1);

    let wait = KernelRequest::Wait {
        timeout_ms: 5,
        event_mask: 1,
    };
    assert_eq!(kernel.dispatch(wait.clone()), Err(KernelError::Timeout(5)));
    assert_eq!(kernel.dispatch(wait), Ok(KernelReply::Done));
    assert_eq!(
        kernel.dispatch(KernelRequest::Wait {
            timeout_ms: VG_LITE_INFINITE,
            event_mask: 1,
        }),
        Ok(KernelReply::Done)
    );
}

#[test]
fn terminate_returns_kernel_buffers_to_the_pool() {
    let mut kernel = SimulatedKernel::new(1 << 20);
    let before = kernel.query_mem().unwrap();
    init(&mut kernel);
    assert!(kernel.query_mem().unwrap() < before);

    kernel.dispatch(KernelRequest::Terminate).unwrap();
    assert_eq!(kernel.query_mem().unwrap(), before);
    assert!(!kernel.is_initialized());
}

#[test]
fn check_reads_back_programmed_registers() {
    let mut kernel = SimulatedKernel::default();
    init(&mut kernel);
    let mut w = VgCmdWriter::new();
    w.state(regs::GLOBAL_ALPHA, 0x55).end(EVENT_END);
    kernel
        .dispatch(KernelRequest::Submit {
            command_id: 0,
            commands: w.finish(),
        })
        .unwrap();
    assert_eq!(kernel.check(regs::GLOBAL_ALPHA).unwrap(), 0x55);
}
