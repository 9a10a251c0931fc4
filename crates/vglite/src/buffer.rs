//! Image buffers: sizing, plane layout, allocation and host uploads.

use tracing::debug;
use vglite_kernel::{CacheOp, KernelRequest, MemoryHandle, VgKernel, VgKernelExt};

use crate::config::Capabilities;
use crate::context::{RenderContext, ALL_EVENTS};
use crate::error::{VgError, VgResult};
use crate::format::{check_compress, BufferFormat, CompressMode, ImageMode, Swizzle, Transparency, YuvStandard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tiling {
    #[default]
    Linear,
    Tiled,
}

/// One GPU-visible memory region of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Plane {
    /// `None` for memory the driver does not own.
    pub handle: Option<MemoryHandle>,
    pub address: u32,
    pub stride: u32,
    pub height: u32,
    /// The handle came from `map` rather than `allocate`.
    pub mapped: bool,
}

impl Plane {
    /// A region owned by someone else, referenced by physical address only.
    pub const fn external(address: u32, stride: u32, height: u32) -> Self {
        Self {
            handle: None,
            address,
            stride,
            height,
            mapped: false,
        }
    }

    pub const fn bytes(&self) -> u32 {
        self.stride * self.height
    }
}

/// Where an image's pixels live. Which planes exist is fixed by the variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Storage {
    #[default]
    Unallocated,
    /// One color plane. AYUY2 and the planar 24-bit formats add an 8-bit alpha plane.
    Plain { plane: Plane, alpha: Option<Plane> },
    /// Luma plus chroma planes. `v` is present for the three-plane YV formats, `alpha` for ANV12.
    YuvPlanar {
        y: Plane,
        uv: Plane,
        v: Option<Plane>,
        alpha: Option<Plane>,
    },
    /// A compressed color plane of `bytes` bytes, `per_mille` thousandths of the uncompressed
    /// size. `plane.stride` and `plane.height` describe the decompressed image.
    Compressed { plane: Plane, bytes: u32, per_mille: u32 },
}

/// A GPU-addressable image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub format: BufferFormat,
    pub tiling: Tiling,
    pub image_mode: ImageMode,
    pub transparency: Transparency,
    pub swizzle: Swizzle,
    pub yuv_standard: YuvStandard,
    /// Color sampled outside the image by pattern fills, `0xAABBGGRR`.
    pub bg_color: u32,
    pub compress: CompressMode,
    pub storage: Storage,
}

impl PixelBuffer {
    /// An unallocated `width` x `height` image.
    pub fn new(width: u32, height: u32, format: BufferFormat) -> Self {
        Self {
            width,
            height,
            format,
            tiling: Tiling::Linear,
            image_mode: ImageMode::Normal,
            transparency: Transparency::Opaque,
            swizzle: Swizzle::Uv,
            yuv_standard: YuvStandard::Bt601,
            bg_color: 0,
            compress: CompressMode::None,
            storage: Storage::Unallocated,
        }
    }

    /// Describes memory the caller already owns at `address`.
    pub fn external(width: u32, height: u32, format: BufferFormat, stride: u32, address: u32) -> Self {
        Self {
            storage: Storage::Plain {
                plane: Plane::external(address, stride, height),
                alpha: None,
            },
            ..Self::new(width, height, format)
        }
    }

    pub fn is_allocated(&self) -> bool {
        !matches!(self.storage, Storage::Unallocated)
    }

    /// The color (or luma) plane.
    pub fn main_plane(&self) -> Option<&Plane> {
        match &self.storage {
            Storage::Unallocated => None,
            Storage::Plain { plane, .. } | Storage::Compressed { plane, .. } => Some(plane),
            Storage::YuvPlanar { y, .. } => Some(y),
        }
    }

    pub fn stride(&self) -> u32 {
        self.main_plane().map_or(0, |p| p.stride)
    }

    pub fn address(&self) -> u32 {
        self.main_plane().map_or(0, |p| p.address)
    }

    pub fn uv_plane(&self) -> Option<&Plane> {
        match &self.storage {
            Storage::YuvPlanar { uv, .. } => Some(uv),
            _ => None,
        }
    }

    pub fn v_plane(&self) -> Option<&Plane> {
        match &self.storage {
            Storage::YuvPlanar { v, .. } => v.as_ref(),
            _ => None,
        }
    }

    pub fn alpha_plane(&self) -> Option<&Plane> {
        match &self.storage {
            Storage::Plain { alpha, .. } | Storage::YuvPlanar { alpha, .. } => alpha.as_ref(),
            _ => None,
        }
    }

    pub fn premultiplied(&self) -> bool {
        self.format.is_premultiplied()
    }

    /// Planes in upload order: color or luma, then chroma, then alpha.
    pub fn planes(&self) -> Vec<&Plane> {
        match &self.storage {
            Storage::Unallocated => Vec::new(),
            Storage::Plain { plane, alpha } => std::iter::once(plane).chain(alpha.as_ref()).collect(),
            Storage::Compressed { plane, .. } => vec![plane],
            Storage::YuvPlanar { y, uv, v, alpha } => [Some(y), Some(uv), v.as_ref(), alpha.as_ref()]
                .into_iter()
                .flatten()
                .collect(),
        }
    }

    fn owned_planes(&self) -> impl Iterator<Item = &Plane> {
        self.planes().into_iter().filter(|p| p.handle.is_some())
    }
}

/// Host bytes for one plane, `stride` bytes per source row.
#[derive(Debug, Clone, Copy)]
pub struct PlaneData<'a> {
    pub bytes: &'a [u8],
    pub stride: u32,
}

const fn align_up(v: u32, a: u32) -> u32 {
    v.div_ceil(a) * a
}

fn overflow(what: &str) -> VgError {
    VgError::invalid(format!("{what} overflows 32 bits"))
}

/// `raw * per_mille / 1000`, rounded up.
fn compressed_bytes(raw: u32, per_mille: u32) -> VgResult<u32> {
    let bytes = (u64::from(raw) * u64::from(per_mille)).div_ceil(1000);
    u32::try_from(bytes).map_err(|_| overflow("compressed buffer size"))
}

/// `(stride, height)` of the chroma planes of a planar YUV format, given the luma geometry.
fn chroma_geometry(format: BufferFormat, stride: u32, height: u32) -> Option<((u32, u32), Option<(u32, u32)>)> {
    use BufferFormat as F;
    Some(match format {
        F::Nv12 | F::Anv12 | F::Nv12Tiled | F::Anv12Tiled => ((stride, height / 2), None),
        F::Nv16 => ((stride, height), None),
        F::Nv24 | F::Nv24Tiled => ((stride * 2, height), None),
        F::Yv12 => ((stride / 2, height / 2), Some((stride / 2, height / 2))),
        F::Yv16 => ((stride, height / 2), Some((stride, height / 2))),
        F::Yv24 => ((stride, height), Some((stride, height))),
        _ => return None,
    })
}

/// Linear stride of a single-plane image: whole bytes per row rounded to the format alignment,
/// then to 16 pixels on parts that need it.
pub fn plain_stride(format: BufferFormat, width: u32, caps: Capabilities) -> VgResult<u32> {
    let bytes = format.format_bytes();
    let row = width
        .checked_mul(bytes.mul)
        .map(|v| v.div_ceil(bytes.div))
        .ok_or_else(|| overflow("stride"))?;
    let mut stride = align_up(row, bytes.align);
    if caps.contains(Capabilities::PIXELS_16_ALIGNED) {
        stride = align_up(stride, (16 * bytes.mul / bytes.div).max(1));
    }
    Ok(stride)
}

impl<K: VgKernel> RenderContext<K> {
    fn allocate_region(&mut self, bytes: u32) -> VgResult<Plane> {
        let (handle, address) = self.kernel_mut().allocate(bytes, true)?;
        Ok(Plane {
            handle: Some(handle),
            address,
            stride: 0,
            height: 0,
            mapped: false,
        })
    }

    fn release(&mut self, planes: &[Plane]) {
        for plane in planes {
            if let Some(handle) = plane.handle {
                if let Err(err) = self.kernel_mut().free(handle) {
                    tracing::warn!(handle = handle.0, %err, "failed to release plane");
                }
            }
        }
    }

    /// Sizes `buf` for its format and allocates every plane.
    ///
    /// Packed YUV heights are rounded to 4 rows; planar YUV images are padded to 8x8 with a
    /// 64-byte luma stride.
    pub fn allocate(&mut self, buf: &mut PixelBuffer) -> VgResult<()> {
        if buf.is_allocated() {
            return Err(VgError::invalid("buffer is already allocated"));
        }
        if buf.width == 0 || buf.height == 0 {
            return Err(VgError::invalid(format!(
                "cannot allocate a {}x{} buffer",
                buf.width, buf.height
            )));
        }
        let format = buf.format;
        let block = self.config().etc2_block_width();
        if format == BufferFormat::Etc2 && (buf.width % block != 0 || buf.height % 4 != 0) {
            return Err(VgError::invalid(format!(
                "ETC2 image {}x{} is not a whole number of blocks",
                buf.width, buf.height
            )));
        }
        if format.is_portable() && !self.has(Capabilities::PREMULTIPLY) {
            return Err(VgError::invalid("portable formats need premultiply support"));
        }
        if buf.compress != CompressMode::None {
            self.require(Capabilities::DEC_COMPRESS, "compressed buffers")?;
            check_compress(format, buf.compress, buf.tiling, buf.width, buf.height)?;
        }

        if format.is_yuv() {
            buf.height = align_up(buf.height, 4);
            buf.swizzle = Swizzle::Uv;
            if format.is_tiled_yuv() {
                buf.tiling = Tiling::Tiled;
            }
        }
        if format.is_planar_yuv() {
            return self.allocate_planar(buf);
        }

        let stride = plain_stride(format, buf.width, self.capabilities())?;
        let per_mille = buf.compress.ratio_per_mille(format);
        let raw = stride.checked_mul(buf.height).ok_or_else(|| overflow("buffer size"))?;
        let mut bytes = compressed_bytes(raw, per_mille)?;
        if self.has(Capabilities::IM_FASTCLEAR) {
            bytes = align_up(bytes, 64);
        }

        let mut plane = self.allocate_region(bytes)?;
        plane.stride = stride;
        plane.height = buf.height;
        let alpha = if format.has_separate_alpha_plane() {
            match self.allocate_region(raw) {
                Ok(mut alpha) => {
                    alpha.stride = stride;
                    alpha.height = buf.height;
                    Some(alpha)
                }
                Err(err) => {
                    self.release(&[plane]);
                    return Err(err);
                }
            }
        } else {
            None
        };

        buf.storage = if buf.compress != CompressMode::None {
            Storage::Compressed { plane, bytes, per_mille }
        } else {
            Storage::Plain { plane, alpha }
        };
        debug!(
            width = buf.width,
            height = buf.height,
            stride,
            bytes,
            address = plane.address,
            format = ?format,
            "buffer allocated"
        );
        Ok(())
    }

    fn allocate_planar(&mut self, buf: &mut PixelBuffer) -> VgResult<()> {
        buf.width = align_up(buf.width, 8);
        buf.height = align_up(buf.height, 8);
        let stride = align_up(buf.width, 64);
        let Some(((uv_stride, uv_height), v_geometry)) = chroma_geometry(buf.format, stride, buf.height) else {
            return Err(VgError::NotSupport("planar layout of this format"));
        };
        let y_bytes = stride.checked_mul(buf.height).ok_or_else(|| overflow("luma plane"))?;

        let mut done: Vec<Plane> = Vec::with_capacity(4);
        let y = self.planar_region(stride, buf.height, &mut done)?;
        let uv = self.planar_region(uv_stride, uv_height, &mut done)?;
        let v = match v_geometry {
            Some((s, h)) => Some(self.planar_region(s, h, &mut done)?),
            None => None,
        };
        let alpha = if matches!(buf.format, BufferFormat::Anv12 | BufferFormat::Anv12Tiled) {
            Some(self.planar_region(stride, buf.height, &mut done)?)
        } else {
            None
        };

        buf.storage = Storage::YuvPlanar { y, uv, v, alpha };
        debug!(
            width = buf.width,
            height = buf.height,
            luma_bytes = y_bytes,
            planes = done.len(),
            format = ?buf.format,
            "planar buffer allocated"
        );
        Ok(())
    }

    /// Allocates one plane of a planar image. On failure every plane in `done` is released.
    fn planar_region(&mut self, stride: u32, height: u32, done: &mut Vec<Plane>) -> VgResult<Plane> {
        let result = stride
            .checked_mul(height)
            .ok_or_else(|| overflow("plane"))
            .and_then(|bytes| self.allocate_region(bytes));
        match result {
            Ok(mut plane) => {
                plane.stride = stride;
                plane.height = height;
                done.push(plane);
                Ok(plane)
            }
            Err(err) => {
                self.release(done);
                Err(err)
            }
        }
    }

    /// Releases every plane of `buf`.
    ///
    /// Freeing the bound render target first drains the GPU and forgets the binding.
    pub fn free(&mut self, buf: &mut PixelBuffer) -> VgResult<()> {
        let Some(main) = buf.main_plane().copied() else {
            return Err(VgError::invalid("buffer is not allocated"));
        };
        if main.mapped {
            return Err(VgError::invalid("mapped buffers are released with unmap"));
        }
        if main.handle.is_none() {
            return Err(VgError::invalid("buffer does not own its memory"));
        }

        if self.state.bound.as_ref() == Some(&*buf) {
            if self.pending_bytes() > 0 {
                self.submit()?;
            }
            if self.in_flight() {
                self.stall(0, ALL_EVENTS)?;
            }
            self.state.bound = None;
        }

        let handles: Vec<MemoryHandle> = buf.owned_planes().filter_map(|p| p.handle).collect();
        for handle in handles {
            self.kernel_mut().free(handle)?;
        }
        debug!(address = main.address, "buffer freed");
        buf.storage = Storage::Unallocated;
        Ok(())
    }

    /// Copies host rows into every plane through the memory bus.
    ///
    /// `data` supplies one entry per plane in [`PixelBuffer::planes`] order. Each plane receives
    /// `plane.height` rows of `plane.stride` bytes.
    pub fn upload(&mut self, buf: &PixelBuffer, data: &[PlaneData<'_>]) -> VgResult<()> {
        if buf.format.is_tiled_yuv() {
            return Err(VgError::invalid("tiled YUV buffers cannot be uploaded row by row"));
        }
        if matches!(buf.storage, Storage::Compressed { .. }) {
            return Err(VgError::invalid("compressed buffers cannot be uploaded row by row"));
        }
        let planes = buf.planes();
        if planes.is_empty() || planes.len() > 3 || planes.len() != data.len() {
            return Err(VgError::invalid(format!(
                "{} planes of data for a buffer with {} planes",
                data.len(),
                planes.len()
            )));
        }
        for (i, (plane, src)) in planes.iter().zip(data).enumerate() {
            let rows = plane.height as usize;
            let row = plane.stride as usize;
            let needed = match rows {
                0 => 0,
                n => (n - 1) * src.stride as usize + row,
            };
            if src.bytes.len() < needed || (rows > 1 && (src.stride as usize) < row) {
                return Err(VgError::invalid(format!(
                    "plane {i}: {} bytes with stride {} cannot fill {rows} rows of {row} bytes",
                    src.bytes.len(),
                    src.stride
                )));
            }
        }

        let mem = self.kernel_mut().memory();
        for (plane, src) in planes.iter().zip(data) {
            let row = plane.stride as usize;
            for j in 0..plane.height as usize {
                let from = j * src.stride as usize;
                let dst = plane.address as u64 + (j * row) as u64;
                mem.write_physical(dst, &src.bytes[from..from + row]);
            }
        }
        Ok(())
    }

    /// Wraps caller memory at `physical` in a kernel handle.
    pub fn map(&mut self, buf: &mut PixelBuffer, physical: u32) -> VgResult<()> {
        if physical == 0 {
            return Err(VgError::invalid("map needs a physical address"));
        }
        if buf.main_plane().is_some_and(|p| p.handle.is_some()) {
            return Err(VgError::invalid("buffer already has a memory handle"));
        }
        let stride = match buf.stride() {
            0 => buf.format.format_bytes().bytes_for(buf.width),
            s => s,
        };
        let bytes = stride.checked_mul(buf.height).ok_or_else(|| overflow("mapping"))?;
        let handle = self.kernel_mut().map(bytes, physical)?;
        buf.storage = Storage::Plain {
            plane: Plane {
                handle: Some(handle),
                address: physical,
                stride,
                height: buf.height,
                mapped: true,
            },
            alpha: None,
        };
        debug!(physical, bytes, "buffer mapped");
        Ok(())
    }

    pub fn unmap(&mut self, buf: &mut PixelBuffer) -> VgResult<()> {
        let plane = match &mut buf.storage {
            Storage::Plain { plane, .. } if plane.mapped => plane,
            _ => return Err(VgError::invalid("buffer is not mapped")),
        };
        let Some(handle) = plane.handle.take() else {
            return Err(VgError::invalid("buffer is not mapped"));
        };
        plane.mapped = false;
        self.kernel_mut().dispatch(KernelRequest::Unmap { handle })?;
        Ok(())
    }

    /// Runs a cache operation over the buffer's main plane.
    pub fn cache_op(&mut self, buf: &PixelBuffer, op: CacheOp) -> VgResult<()> {
        let Some(handle) = buf.main_plane().and_then(|p| p.handle) else {
            return Err(VgError::invalid("buffer has no memory handle"));
        };
        self.kernel_mut().dispatch(KernelRequest::CacheOp { handle, op })?;
        Ok(())
    }

    /// Invalidates CPU caches over a mapped buffer after the GPU wrote it.
    pub fn flush_mapped_buffer(&mut self, buf: &PixelBuffer) -> VgResult<()> {
        self.cache_op(buf, CacheOp::Invalidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::testutil::context;
    use pretty_assertions::assert_eq;

    #[test]
    fn argb_stride_and_address_alignment() {
        let mut ctx = context(DriverConfig::default());
        let mut buf = PixelBuffer::new(30, 7, BufferFormat::Argb8888);
        ctx.allocate(&mut buf).unwrap();
        assert_eq!(buf.stride(), 120);
        assert_eq!(buf.address() % 64, 0);
        assert!(!buf.premultiplied());
    }

    #[test]
    fn sixteen_pixel_alignment_rounds_24bit_rows() {
        let caps = Capabilities::PIXELS_16_ALIGNED;
        assert_eq!(plain_stride(BufferFormat::Rgb888, 20, caps).unwrap(), 96);
        assert_eq!(plain_stride(BufferFormat::Rgb888, 16, Capabilities::empty()).unwrap(), 48);
        assert_eq!(plain_stride(BufferFormat::Index1, 9, Capabilities::empty()).unwrap(), 8);
    }

    #[test]
    fn nv12_gets_luma_and_half_height_chroma() {
        let mut ctx = context(DriverConfig::default());
        let mut buf = PixelBuffer::new(30, 30, BufferFormat::Nv12);
        ctx.allocate(&mut buf).unwrap();
        assert_eq!((buf.width, buf.height), (32, 32));
        assert_eq!(buf.stride(), 64);
        let uv = buf.uv_plane().copied().unwrap();
        assert_eq!((uv.stride, uv.height), (64, 16));
        assert!(buf.v_plane().is_none());
        assert!(buf.alpha_plane().is_none());
        assert_eq!(buf.planes().len(), 2);
    }

    #[test]
    fn yv12_and_anv12_have_three_planes() {
        let mut ctx = context(DriverConfig::default());
        let mut yv = PixelBuffer::new(16, 16, BufferFormat::Yv12);
        ctx.allocate(&mut yv).unwrap();
        assert_eq!(yv.v_plane().map(|p| (p.stride, p.height)), Some((32, 8)));

        let mut anv = PixelBuffer::new(16, 16, BufferFormat::Anv12);
        ctx.allocate(&mut anv).unwrap();
        assert_eq!(anv.alpha_plane().map(|p| p.bytes()), Some(64 * 16));
        assert_eq!(anv.planes().len(), 3);
    }

    #[test]
    fn free_releases_memory_and_rejects_a_second_free() {
        let mut ctx = context(DriverConfig::default());
        let before = ctx.query_mem().unwrap();
        let mut buf = PixelBuffer::new(64, 64, BufferFormat::Rgba8888);
        ctx.allocate(&mut buf).unwrap();
        assert!(ctx.query_mem().unwrap() < before);
        ctx.free(&mut buf).unwrap();
        assert_eq!(ctx.query_mem().unwrap(), before);
        assert!(matches!(ctx.free(&mut buf), Err(VgError::InvalidArgument(_))));
    }

    #[test]
    fn upload_copies_rows_with_the_source_stride() {
        let mut ctx = context(DriverConfig::default());
        let mut buf = PixelBuffer::new(4, 2, BufferFormat::A8);
        ctx.allocate(&mut buf).unwrap();
        assert_eq!(buf.stride(), 4);
        let src = [1, 2, 3, 4, 0xEE, 0xEE, 5, 6, 7, 8];
        ctx.upload(&buf, &[PlaneData { bytes: &src, stride: 6 }]).unwrap();

        let mut row = [0u8; 4];
        let addr = buf.address() as u64;
        ctx.kernel_mut().memory().read_physical(addr + 4, &mut row);
        assert_eq!(row, [5, 6, 7, 8]);

        let short = PlaneData { bytes: &src[..8], stride: 6 };
        assert!(matches!(ctx.upload(&buf, &[short]), Err(VgError::InvalidArgument(_))));
    }

    #[test]
    fn map_and_unmap_round_trip() {
        let mut ctx = context(DriverConfig::default());
        let mut backing = PixelBuffer::new(8, 8, BufferFormat::Rgba8888);
        ctx.allocate(&mut backing).unwrap();

        let mut view = PixelBuffer::new(8, 8, BufferFormat::Rgba8888);
        ctx.map(&mut view, backing.address()).unwrap();
        assert_eq!(view.stride(), 32);
        ctx.flush_mapped_buffer(&view).unwrap();
        assert!(matches!(ctx.free(&mut view), Err(VgError::InvalidArgument(_))));
        ctx.unmap(&mut view).unwrap();
        assert!(matches!(ctx.unmap(&mut view), Err(VgError::InvalidArgument(_))));
    }

    #[test]
    fn compressed_buffers_are_sized_by_ratio_and_refuse_uploads() {
        let mut ctx = context(DriverConfig {
            capabilities: Capabilities::DEC_COMPRESS,
            ..DriverConfig::default()
        });
        let mut compressed = PixelBuffer::new(32, 4, BufferFormat::Rgba8888);
        compressed.compress = CompressMode::HSample;
        ctx.allocate(&mut compressed).unwrap();
        assert!(matches!(
            compressed.storage,
            Storage::Compressed { bytes: 256, per_mille: 500, .. }
        ));
        let mut neighbour = PixelBuffer::new(32, 4, BufferFormat::Rgba8888);
        ctx.allocate(&mut neighbour).unwrap();
        let zeros = vec![0u8; neighbour.stride() as usize * 4];
        ctx.upload(&neighbour, &[PlaneData { bytes: &zeros, stride: neighbour.stride() }])
            .unwrap();

        let fill = vec![0xABu8; 128 * 4];
        assert!(matches!(
            ctx.upload(&compressed, &[PlaneData { bytes: &fill, stride: 128 }]),
            Err(VgError::InvalidArgument(_))
        ));
        let mut row = [0u8; 128];
        let addr = neighbour.address() as u64;
        ctx.kernel_mut().memory().read_physical(addr, &mut row);
        assert!(row.iter().all(|&b| b == 0));
    }

    #[test]
    fn compressed_size_is_exact_past_sixteen_mebibytes() {
        assert_eq!(compressed_bytes(4096 * 4096 + 8, 375).unwrap(), 6_291_459);
        assert_eq!(compressed_bytes(u32::MAX, 1000).unwrap(), u32::MAX);
        assert_eq!(compressed_bytes(3, 667).unwrap(), 3);
    }

    #[test]
    fn compression_needs_the_capability() {
        let mut ctx = context(DriverConfig::default());
        let mut buf = PixelBuffer::new(32, 4, BufferFormat::Rgba8888);
        buf.compress = CompressMode::HSample;
        assert_eq!(
            ctx.allocate(&mut buf),
            Err(VgError::NotSupport("compressed buffers"))
        );
    }
}
