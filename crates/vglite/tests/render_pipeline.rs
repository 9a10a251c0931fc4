mod common;

use common::*;
use pretty_assertions::assert_eq;
use vglite::{
    BlendMode, BufferFormat, ColorStop, FillRule, Filter, LinearGradient, LinearParams,
    MaskOperation, Matrix3x3, PathFormat, PathOp, Quality, Rect, SpreadMode, VgPath,
};
use vglite_protocol::regs;

#[test]
fn clear_then_blit_composites_over_the_target() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 64, 64, BufferFormat::Argb8888);
    let source = allocated(&mut ctx, 32, 32, BufferFormat::Argb8888);
    upload_solid(&mut ctx, &source, BLUE);

    ctx.clear(&target, None, abgr(RED)).unwrap();
    let mut matrix = Matrix3x3::identity();
    matrix.translate(16.0, 16.0);
    ctx.blit(&target, &source, Some(&matrix), BlendMode::SrcOver, 0, Filter::Point)
        .unwrap();
    ctx.finish().unwrap();

    for (x, y) in [(17, 17), (32, 32), (46, 46)] {
        assert_eq!(pixel(&mut ctx, &target, x, y), BLUE, "inside at ({x}, {y})");
    }
    for (x, y) in [(0, 0), (15, 15), (48, 48), (63, 20)] {
        assert_eq!(pixel(&mut ctx, &target, x, y), RED, "outside at ({x}, {y})");
    }
}

#[test]
fn blit2_composites_the_source_over_its_background() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 16, 16, BufferFormat::Argb8888);
    let background = allocated(&mut ctx, 8, 8, BufferFormat::Argb8888);
    let source = allocated(&mut ctx, 4, 4, BufferFormat::Argb8888);
    upload_solid(&mut ctx, &background, RED);
    upload_solid(&mut ctx, &source, BLUE);

    ctx.clear(&target, None, abgr(WHITE)).unwrap();
    let mut matrix = Matrix3x3::identity();
    matrix.translate(2.0, 2.0);
    ctx.blit2(&target, &source, &background, Some(&matrix), None, BlendMode::SrcOver, Filter::Point)
        .unwrap();
    ctx.finish().unwrap();

    for (x, y) in [(2, 2), (5, 5)] {
        assert_eq!(pixel(&mut ctx, &target, x, y), BLUE, "source at ({x}, {y})");
    }
    for (x, y) in [(0, 0), (1, 5), (6, 6), (7, 0)] {
        assert_eq!(pixel(&mut ctx, &target, x, y), RED, "background at ({x}, {y})");
    }
    for (x, y) in [(8, 8), (15, 0), (0, 12)] {
        assert_eq!(pixel(&mut ctx, &target, x, y), WHITE, "untouched at ({x}, {y})");
    }
}

#[test]
fn partial_clear_respects_the_scissor_box() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 32, 32, BufferFormat::Abgr8888);
    ctx.clear(&target, None, abgr(WHITE)).unwrap();
    ctx.set_scissor(0, 0, 16, 32).unwrap();
    ctx.clear(&target, Some(Rect::new(8, 8, 16, 16)), abgr(RED)).unwrap();
    ctx.finish().unwrap();

    assert_eq!(pixel(&mut ctx, &target, 8, 8), RED);
    assert_eq!(pixel(&mut ctx, &target, 15, 23), RED);
    assert_eq!(pixel(&mut ctx, &target, 16, 8), WHITE);
    assert_eq!(pixel(&mut ctx, &target, 7, 8), WHITE);
}

#[test]
fn copy_image_moves_a_block_without_blending() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 32, 32, BufferFormat::Argb8888);
    let source = allocated(&mut ctx, 16, 16, BufferFormat::Argb8888);
    upload_solid(&mut ctx, &source, BLUE);
    ctx.clear(&target, None, abgr(WHITE)).unwrap();
    ctx.copy_image(&target, &source, 4, 4, 20, 2, 8, 8).unwrap();
    ctx.finish().unwrap();

    assert_eq!(pixel(&mut ctx, &target, 20, 2), BLUE);
    assert_eq!(pixel(&mut ctx, &target, 27, 9), BLUE);
    assert_eq!(pixel(&mut ctx, &target, 28, 9), WHITE);
    assert_eq!(pixel(&mut ctx, &target, 19, 2), WHITE);
}

#[test]
fn scissor_rects_limit_later_draws() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 16, 16, BufferFormat::Argb8888);
    ctx.clear(&target, None, abgr(WHITE)).unwrap();
    ctx.scissor_rects(&target, &[Rect::new(4, 4, 8, 8)]).unwrap();
    ctx.enable_scissor().unwrap();
    ctx.clear(&target, None, abgr(RED)).unwrap();
    ctx.finish().unwrap();

    assert_eq!(pixel(&mut ctx, &target, 4, 4), RED);
    assert_eq!(pixel(&mut ctx, &target, 11, 11), RED);
    assert_eq!(pixel(&mut ctx, &target, 3, 4), WHITE);
    assert_eq!(pixel(&mut ctx, &target, 12, 11), WHITE);

    ctx.disable_scissor().unwrap();
    ctx.clear(&target, None, abgr(BLUE)).unwrap();
    ctx.finish().unwrap();
    assert_eq!(pixel(&mut ctx, &target, 0, 0), BLUE);
}

#[test]
fn mask_layer_hides_uncovered_pixels() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 16, 16, BufferFormat::Argb8888);
    let source = allocated(&mut ctx, 16, 16, BufferFormat::Argb8888);
    upload_solid(&mut ctx, &source, BLUE);
    ctx.clear(&target, None, abgr(RED)).unwrap();

    let mut mask = ctx.create_masklayer(16, 16).unwrap();
    ctx.fill_masklayer(&mask, Some(Rect::new(0, 0, 8, 16)), 0).unwrap();
    ctx.set_masklayer(&mask).unwrap();
    ctx.enable_masklayer().unwrap();
    ctx.blit(&target, &source, None, BlendMode::SrcOver, 0, Filter::Point)
        .unwrap();
    ctx.disable_masklayer().unwrap();
    ctx.finish().unwrap();

    assert_eq!(pixel(&mut ctx, &target, 2, 5), RED);
    assert_eq!(pixel(&mut ctx, &target, 12, 5), BLUE);
    ctx.destroy_masklayer(&mut mask).unwrap();
}

#[test]
fn mask_union_adds_coverage() {
    let mut ctx = context();
    let dst = ctx.create_masklayer(8, 8).unwrap();
    ctx.fill_masklayer(&dst, None, 0).unwrap();
    let src = ctx.create_masklayer(4, 4).unwrap();
    ctx.blend_masklayer(&dst, &src, MaskOperation::Union, Rect::new(2, 2, 4, 4))
        .unwrap();
    ctx.finish().unwrap();

    assert_eq!(pixel(&mut ctx, &dst, 2, 2).a, 0xFF);
    assert_eq!(pixel(&mut ctx, &dst, 5, 5).a, 0xFF);
    assert_eq!(pixel(&mut ctx, &dst, 1, 2).a, 0);
    assert_eq!(pixel(&mut ctx, &dst, 6, 6).a, 0);
}

#[test]
fn path_fill_hands_geometry_to_the_tessellator() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 64, 64, BufferFormat::Argb8888);
    let path = VgPath::from_ops(
        PathFormat::Fp32,
        Quality::High,
        &[PathOp::Move, PathOp::Line, PathOp::Line, PathOp::Close, PathOp::End],
        &[4.0, 4.0, 60.0, 4.0, 32.0, 60.0],
    )
    .unwrap();
    ctx.draw(&target, &path, FillRule::EvenOdd, None, BlendMode::SrcOver, 0xFF00FF00)
        .unwrap();
    ctx.finish().unwrap();

    let stats = ctx.kernel().submissions().last().and_then(|s| s.stats).unwrap();
    assert!(stats.path_blocks >= 1);
    let writes = submitted_writes(&ctx);
    assert!(writes.iter().any(|&(address, _)| address == regs::PATH_CONTROL));
}

#[test]
fn gradient_lifecycle_returns_its_memory() {
    let mut ctx = context();
    let target = allocated(&mut ctx, 64, 64, BufferFormat::Argb8888);
    let free_before = ctx.query_mem().unwrap();

    let mut grad = LinearGradient::new();
    grad.set(
        &[
            ColorStop::new(0.0, 1.0, 0.0, 0.0, 1.0),
            ColorStop::new(1.0, 0.0, 0.0, 1.0, 1.0),
        ],
        LinearParams { x0: 0.0, y0: 0.0, x1: 64.0, y1: 0.0 },
        SpreadMode::Pad,
        false,
    )
    .unwrap();
    ctx.update_linear_grad(&mut grad).unwrap();
    assert!(ctx.query_mem().unwrap() < free_before);

    let path = VgPath::from_ops(
        PathFormat::S16,
        Quality::Medium,
        &[PathOp::Move, PathOp::Line, PathOp::Line, PathOp::Line, PathOp::Close],
        &[0.0, 0.0, 64.0, 0.0, 64.0, 64.0, 0.0, 64.0],
    )
    .unwrap();
    ctx.draw_linear_grad(&target, &path, FillRule::NonZero, None, &grad, BlendMode::SrcOver)
        .unwrap();
    ctx.finish().unwrap();
    let writes = submitted_writes(&ctx);
    assert!(writes.contains(&(regs::PAINT_ADDRESS, grad.image().address())));

    ctx.clear_linear_grad(&mut grad).unwrap();
    assert_eq!(ctx.query_mem().unwrap(), free_before);
}
