mod common;

use common::*;
use pretty_assertions::assert_eq;
use vglite::context::FINISH_TIMEOUT_MS;
use vglite::{BufferFormat, DriverConfig, FrameFlag, Rect, VgError};
use vglite_protocol::{EVENT_END, EVENT_FRAME_END};

#[test]
fn double_buffering_keeps_one_submission_in_flight() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 16, 16, BufferFormat::Argb8888);

    ctx.clear(&target, None, abgr(RED)).unwrap();
    ctx.flush().unwrap();
    assert!(ctx.in_flight());
    assert!(ctx.kernel().in_flight());
    assert_eq!(ctx.active_buffer(), 1);

    ctx.clear(&target, None, abgr(BLUE)).unwrap();
    ctx.flush().unwrap();
    assert_eq!(ctx.active_buffer(), 0);
    assert_eq!(ctx.kernel().submissions().len(), 2);

    ctx.finish().unwrap();
    assert!(!ctx.in_flight());
    assert_eq!(pixel(&mut ctx, &target, 3, 3), BLUE);
}

#[test]
fn single_buffer_mode_refuses_flush() {
    let mut ctx = context_with(DriverConfig {
        single_command_buffer: true,
        ..DriverConfig::default()
    });
    assert!(ctx.is_single_buffered());
    let target = allocated(&mut ctx, 8, 8, BufferFormat::Argb8888);
    ctx.clear(&target, None, abgr(RED)).unwrap();
    assert!(matches!(ctx.flush(), Err(VgError::NotSupport(_))));
    ctx.finish().unwrap();
    assert_eq!(pixel(&mut ctx, &target, 0, 0), RED);
}

#[test]
fn full_buffers_are_submitted_implicitly() {
    let mut ctx = context_with(DriverConfig {
        command_buffer_size: Some(256),
        ..DriverConfig::default()
    });
    let target = allocated(&mut ctx, 32, 32, BufferFormat::Argb8888);
    for i in 0..32 {
        ctx.clear(&target, Some(Rect::new(i, 0, 1, 32)), abgr(RED)).unwrap();
    }
    assert!(ctx.kernel().submissions().len() > 1);
    ctx.finish().unwrap();
    assert_eq!(pixel(&mut ctx, &target, 31, 31), RED);
}

#[test]
fn finish_timeout_is_reported_and_recovers() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 8, 8, BufferFormat::Argb8888);
    ctx.clear(&target, None, abgr(RED)).unwrap();
    ctx.kernel_mut().inject_timeouts(1);

    assert_eq!(ctx.finish(), Err(VgError::Timeout(FINISH_TIMEOUT_MS)));
    assert!(!ctx.in_flight());

    ctx.clear(&target, None, abgr(BLUE)).unwrap();
    ctx.finish().unwrap();
    assert_eq!(pixel(&mut ctx, &target, 7, 7), BLUE);
}

#[test]
fn frame_delimiter_tags_the_closing_end() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 8, 8, BufferFormat::Argb8888);
    ctx.clear(&target, None, abgr(RED)).unwrap();
    ctx.frame_delimiter(FrameFlag::End).unwrap();
    ctx.clear(&target, None, abgr(BLUE)).unwrap();
    ctx.finish().unwrap();

    let events: Vec<u32> = ctx
        .kernel()
        .submissions()
        .iter()
        .map(|s| s.stats.unwrap().event)
        .collect();
    assert_eq!(events, vec![EVENT_FRAME_END, EVENT_END]);
}

#[test]
fn terminate_releases_the_context() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 8, 8, BufferFormat::Argb8888);
    ctx.scissor_rects(&target, &[Rect::new(0, 0, 4, 4)]).unwrap();
    ctx.terminate().unwrap();

    assert_eq!(ctx.clear(&target, None, 0), Err(VgError::NoContext));
    assert_eq!(ctx.finish(), Err(VgError::NoContext));
    assert_eq!(ctx.terminate(), Err(VgError::NoContext));
    assert!(!ctx.kernel().is_initialized());
}

#[test]
fn config_loads_from_json() {
    let config: DriverConfig = serde_json::from_str(
        r#"{ "command_buffer_size": 4096, "tess_width": 200, "chip_id": 1109 }"#,
    )
    .unwrap();
    assert_eq!(config.tessellation_window(), (192, 128));
    assert!(!config.is_gc355());

    let ctx = context_with(config);
    assert_eq!(ctx.config().command_buffer_size(), 4096);
    assert!(!ctx.is_single_buffered());
}

#[test]
fn undersized_command_buffers_are_rejected() {
    let config = DriverConfig {
        command_buffer_size: Some(60),
        ..DriverConfig::default()
    };
    let err = vglite::RenderContext::init(vglite_kernel::SimulatedKernel::default(), config);
    assert!(matches!(err, Err(VgError::InvalidArgument(_))));
}
