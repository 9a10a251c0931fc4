#![allow(dead_code)]

use vglite::{BufferFormat, DriverConfig, PixelBuffer, PlaneData, RenderContext, VgKernel};
use vglite_kernel::{PixelLayout, Rgba8, SimulatedKernel};
use vglite_protocol::VgCmdStreamIter;

pub const RED: Rgba8 = Rgba8::new(0xFF, 0, 0, 0xFF);
pub const BLUE: Rgba8 = Rgba8::new(0, 0, 0xFF, 0xFF);
pub const WHITE: Rgba8 = Rgba8::new(0xFF, 0xFF, 0xFF, 0xFF);

/// `COLOR` register value for `px` (`0xAABBGGRR`).
pub fn abgr(px: Rgba8) -> u32 {
    (px.a as u32) << 24 | (px.b as u32) << 16 | (px.g as u32) << 8 | px.r as u32
}

pub fn context() -> RenderContext<SimulatedKernel> {
    context_with(DriverConfig::default())
}

pub fn context_with(config: DriverConfig) -> RenderContext<SimulatedKernel> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    RenderContext::init(SimulatedKernel::default(), config).expect("driver init")
}

pub fn allocated(
    ctx: &mut RenderContext<SimulatedKernel>,
    width: u32,
    height: u32,
    format: BufferFormat,
) -> PixelBuffer {
    let mut buf = PixelBuffer::new(width, height, format);
    ctx.allocate(&mut buf).expect("allocate");
    buf
}

/// Uploads a source image filled with `px`.
pub fn upload_solid(ctx: &mut RenderContext<SimulatedKernel>, buf: &PixelBuffer, px: Rgba8) {
    let layout = PixelLayout::from_source_code(buf.format.source_code()).expect("modelled source format");
    let bpp = layout.bytes_per_pixel();
    let stride = buf.stride() as usize;
    let mut bytes = vec![0u8; stride * buf.height as usize];
    for row in bytes.chunks_exact_mut(stride) {
        for texel in row[..buf.width as usize * bpp].chunks_exact_mut(bpp) {
            layout.encode(px, texel);
        }
    }
    ctx.upload(buf, &[PlaneData { bytes: &bytes, stride: buf.stride() }])
        .expect("upload");
}

/// Reads one pixel of a render target back through the memory bus.
pub fn pixel(ctx: &mut RenderContext<SimulatedKernel>, buf: &PixelBuffer, x: u32, y: u32) -> Rgba8 {
    let layout = PixelLayout::from_target_code(buf.format.target_code()).expect("modelled target format");
    let bpp = layout.bytes_per_pixel();
    let mut raw = [0u8; 4];
    let at = buf.address() as u64 + (y * buf.stride()) as u64 + (x as usize * bpp) as u64;
    ctx.kernel_mut().memory().read_physical(at, &mut raw[..bpp]);
    layout.decode(&raw)
}

pub fn register_writes(stream: &[u8]) -> Vec<(u32, u32)> {
    VgCmdStreamIter::new(stream)
        .expect("aligned stream")
        .map(|record| record.expect("well-formed record"))
        .flat_map(|record| record.register_writes())
        .collect()
}

/// Register writes of every submission so far.
pub fn submitted_writes(ctx: &RenderContext<SimulatedKernel>) -> Vec<(u32, u32)> {
    ctx.kernel()
        .submissions()
        .iter()
        .flat_map(|s| register_writes(&s.commands))
        .collect()
}
