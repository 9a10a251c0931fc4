//! Render-target binding and the pixel-pipe state that rides along with it.
//!
//! Most setters only record a value and mark it dirty. The hardware sees it the next time a draw
//! binds a target, which reprograms `TARGET_CONFIG` and friends only when the target or a dirty
//! bit changed.

use tracing::{debug, trace};
use vglite_kernel::{KernelRequest, VgKernel, VgKernelExt};
use vglite_protocol::regs;

use crate::buffer::{PixelBuffer, Tiling};
use crate::config::Capabilities;
use crate::context::RenderContext;
use crate::error::{VgError, VgResult};
use crate::format::validate_target_buffer;

/// Register polled after flexa mode changes; reads 1 while the reset is pending.
const FLEXA_RESET_STATUS: u32 = 0x0_3600;

const DITHER_TABLE_LOW: u32 = 0x7B48_F3C0;
const DITHER_TABLE_HIGH: u32 = 0x596A_D1E2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    TopBottom,
    BottomTop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GammaConversion {
    #[default]
    None,
    Linear,
    NonLinear,
}

impl GammaConversion {
    const fn hw_code(self) -> u32 {
        let v = match self {
            GammaConversion::None => 0,
            GammaConversion::Linear => 1,
            GammaConversion::NonLinear => 2,
        };
        v << regs::target::GAMMA_SHIFT
    }
}

/// How a global alpha value combines with per-pixel alpha.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GlobalAlpha {
    #[default]
    Normal,
    /// Replace per-pixel alpha.
    Global,
    /// Multiply per-pixel alpha.
    Scaled,
}

/// One of the four color keys. Source pixels inside `low..=high` get `alpha`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorKey {
    pub enable: bool,
    pub low: [u8; 3],
    pub high: [u8; 3],
    pub alpha: u8,
}

impl ColorKey {
    fn low_word(&self) -> u32 {
        let [r, g, b] = self.low.map(u32::from);
        ((self.enable as u32) << 24) | (r << 16) | (g << 8) | b
    }

    fn high_word(&self) -> u32 {
        let [r, g, b] = self.high.map(u32::from);
        ((self.alpha as u32) << 24) | (r << 16) | (g << 8) | b
    }
}

/// Channels a pixel matrix writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelChannels {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl PixelChannels {
    const fn control_bits(self) -> u32 {
        (if self.a { 1 << 17 } else { 0 })
            | (if self.r { 1 << 23 } else { 0 })
            | (if self.g { 1 << 22 } else { 0 })
            | (if self.b { 1 << 21 } else { 0 })
    }
}

/// Pixel-pipe state recorded by the setters and consumed when a target is bound or a draw is
/// encoded.
#[derive(Debug, Clone, Default)]
pub(crate) struct TargetState {
    /// Snapshot of the last bound target and whether it was bound with premultiplied output.
    pub bound: Option<PixelBuffer>,
    pub bound_premult: bool,
    /// `[x, y, right, bottom]`.
    pub scissor: [i32; 4],
    pub scissor_set: bool,
    pub scissor_enabled: bool,
    pub scissor_dirty: bool,
    pub mirror: Orientation,
    pub mirror_dirty: bool,
    pub gamma: GammaConversion,
    pub gamma_dirty: bool,
    pub flexa_mode: bool,
    pub flexa_dirty: bool,
    pub src_alpha: (GlobalAlpha, u8),
    pub dst_alpha: (GlobalAlpha, u8),
    pub matrix_enable: u32,
    pub mask_enabled: bool,
    pub stripe: bool,
    pub scissor_layer: Option<PixelBuffer>,
}

impl TargetState {
    pub fn scissor_enable_bits(&self) -> u32 {
        if self.scissor_enabled {
            regs::control::SCISSOR_ENABLE
        } else {
            0
        }
    }

    pub fn mask_enable_bits(&self) -> u32 {
        if self.mask_enabled {
            regs::control::MASK_ENABLE
        } else {
            0
        }
    }

    pub fn stripe_bits(&self) -> u32 {
        if self.stripe {
            regs::control::STRIPE_MODE
        } else {
            0
        }
    }

    /// Value of the `GLOBAL_ALPHA` register.
    pub fn global_alpha_word(&self) -> u32 {
        let (src_mode, src_value) = self.src_alpha;
        let (dst_mode, dst_value) = self.dst_alpha;
        let src = match src_mode {
            GlobalAlpha::Normal => 0,
            GlobalAlpha::Global => 1,
            GlobalAlpha::Scaled => 2,
        } | ((src_value as u32) << 2);
        let dst = match dst_mode {
            GlobalAlpha::Normal => 0,
            GlobalAlpha::Global => 0x400,
            GlobalAlpha::Scaled => 0x800,
        } | ((dst_value as u32) << 12);
        src | dst
    }

    pub fn global_alpha_active(&self) -> bool {
        self.src_alpha.0 != GlobalAlpha::Normal || self.dst_alpha.0 != GlobalAlpha::Normal
    }

    fn any_dirty(&self) -> bool {
        self.scissor_dirty || self.mirror_dirty || self.gamma_dirty || self.flexa_dirty
    }
}

impl<K: VgKernel> RenderContext<K> {
    /// Binds `target` for the next draw.
    ///
    /// Nothing is emitted when the target matches the last binding and no dirty bit is set.
    /// Otherwise pending work against the previous target is flushed and the target states are
    /// reprogrammed. `apply_premult` selects premultiplied output for targets that store
    /// straight alpha.
    pub(crate) fn set_render_target(&mut self, target: &PixelBuffer, apply_premult: bool) -> VgResult<()> {
        let changed = self.state.bound.as_ref() != Some(target) || self.state.bound_premult != apply_premult;
        if !changed && !self.state.any_dirty() {
            return Ok(());
        }

        if !target.is_allocated() {
            return Err(VgError::invalid("render target has no memory"));
        }
        validate_target_buffer(target, self.capabilities())?;

        match self.flush() {
            Ok(()) | Err(VgError::NotSupport(_)) => {}
            Err(err) => return Err(err),
        }

        let format = target.format;
        let mut config = format.target_code();
        if format.is_packed_yuv() {
            config |= target.yuv_standard.hw_code() | target.swizzle.hw_code();
        }
        if self.state.flexa_mode {
            config |= regs::target::FLEXA;
        }
        let mirrored = if self.config().is_gc355() {
            Orientation::TopBottom
        } else {
            Orientation::BottomTop
        };
        if self.state.mirror == mirrored {
            config |= regs::target::MIRROR;
        }
        config |= target.compress.hw_code() << regs::target::COMPRESS_SHIFT;
        if target.premultiplied() || apply_premult {
            config |= regs::target::PREMULTIPLY_DST;
        }
        if self.has(Capabilities::PREMULTIPLY) {
            config |= regs::target::ALPHA_DIVIDE;
        }
        config |= regs::target::READ_DESTINATION | self.state.gamma.hw_code();
        self.push_state(regs::TARGET_CONFIG, config)?;
        self.state.mirror_dirty = false;
        self.state.gamma_dirty = false;

        let tess_bytes = self.tessellation().buffer_bytes;
        if self.state.flexa_dirty && !self.state.flexa_mode && tess_bytes != 0 {
            self.push_state(regs::FLEXA_CONTROL, tess_bytes - 64)?;
            self.push_state(regs::FLEXA_CONTROL, tess_bytes)?;
            self.state.flexa_dirty = false;
        }

        if let Some(uv) = target.uv_plane() {
            self.push_state(regs::TARGET_UV_ADDRESS, uv.address)?;
        }
        if let Some(alpha) = target.alpha_plane() {
            self.push_state(regs::TARGET_ALPHA_ADDRESS, alpha.address)?;
        }
        self.push_state(regs::TARGET_ADDRESS, target.address())?;

        let mut stride = if format.is_24bit() {
            target.stride() / 3 * 4
        } else {
            target.stride()
        };
        if target.tiling == Tiling::Tiled {
            stride |= regs::target::TILED_STRIDE;
        }
        self.push_state(regs::TARGET_STRIDE, stride)?;

        let extent = if self.state.scissor_set {
            let [_, _, right, bottom] = self.state.scissor;
            (right as u32 & 0xFFFF) | ((bottom as u32) << 16)
        } else {
            target.width | (target.height << 16)
        };
        self.push_state(regs::TARGET_EXTENT, extent)?;
        self.state.scissor_dirty = false;

        if changed {
            trace!(address = target.address(), width = target.width, height = target.height, "render target bound");
            self.state.bound = Some(*target);
            self.state.bound_premult = apply_premult;
        }
        Ok(())
    }

    /// Restricts drawing to the box `[x, right) x [y, bottom)`.
    pub fn set_scissor(&mut self, x: i32, y: i32, right: i32, bottom: i32) -> VgResult<()> {
        if right < x || bottom < y {
            return Err(VgError::invalid(format!(
                "scissor box ({x}, {y})..({right}, {bottom}) is inverted"
            )));
        }
        self.state.scissor = [x, y, right, bottom];
        self.state.scissor_set = true;
        self.state.scissor_dirty = true;
        Ok(())
    }

    /// Turns on per-pixel scissoring through the scissor layer. A no-op on parts without mask
    /// support.
    pub fn enable_scissor(&mut self) -> VgResult<()> {
        if self.has(Capabilities::MASK) && !self.state.scissor_enabled {
            self.state.scissor_enabled = true;
            self.state.scissor_dirty = true;
        }
        Ok(())
    }

    pub fn disable_scissor(&mut self) -> VgResult<()> {
        if self.has(Capabilities::MASK) && self.state.scissor_enabled {
            self.state.scissor_enabled = false;
            self.state.scissor_dirty = true;
        }
        Ok(())
    }

    pub fn set_mirror(&mut self, orientation: Orientation) -> VgResult<()> {
        self.require(Capabilities::MIRROR, "mirror")?;
        self.state.mirror = orientation;
        self.state.mirror_dirty = true;
        Ok(())
    }

    pub fn set_gamma(&mut self, gamma: GammaConversion) -> VgResult<()> {
        self.require(Capabilities::GAMMA, "gamma conversion")?;
        self.state.gamma = gamma;
        self.state.gamma_dirty = true;
        Ok(())
    }

    /// Global alpha applied to image sources by subsequent blits.
    pub fn source_global_alpha(&mut self, mode: GlobalAlpha, value: u8) -> VgResult<()> {
        self.require(Capabilities::GLOBAL_ALPHA, "global alpha")?;
        self.state.src_alpha = (mode, value);
        Ok(())
    }

    /// Global alpha applied to the destination by subsequent blits.
    pub fn dest_global_alpha(&mut self, mode: GlobalAlpha, value: u8) -> VgResult<()> {
        self.require(Capabilities::GLOBAL_ALPHA, "global alpha")?;
        self.state.dst_alpha = (mode, value);
        Ok(())
    }

    pub fn set_global_alpha(
        &mut self,
        src_mode: GlobalAlpha,
        src_value: u8,
        dst_mode: GlobalAlpha,
        dst_value: u8,
    ) -> VgResult<()> {
        self.source_global_alpha(src_mode, src_value)?;
        self.dest_global_alpha(dst_mode, dst_value)
    }

    pub fn set_color_key(&mut self, keys: &[ColorKey; 4]) -> VgResult<()> {
        self.require(Capabilities::COLOR_KEY, "color key")?;
        for (i, key) in (0u32..).zip(keys) {
            self.push_state(regs::COLOR_KEY_LOW + i, key.low_word())?;
            self.push_state(regs::COLOR_KEY_HIGH + i, key.high_word())?;
        }
        Ok(())
    }

    /// Loads a 4x5 color matrix applied to blit sources. Entries are 8.8 fixed point, so each
    /// must lie in `[-128, 127]`.
    pub fn set_pixel_matrix(&mut self, matrix: &[f32; 20], channels: PixelChannels) -> VgResult<()> {
        self.require(Capabilities::PIXEL_MATRIX, "pixel matrix")?;
        let enable = channels.control_bits();
        if enable != 0 {
            if let Some(bad) = matrix.iter().find(|v| !(-128.0..=127.0).contains(*v)) {
                return Err(VgError::invalid(format!("pixel matrix entry {bad} out of range")));
            }
            for (i, v) in (0u32..).zip(matrix) {
                let fixed = (v * 256.0) as i16;
                self.push_state(regs::PIXEL_MATRIX + i, fixed as i32 as u32)?;
            }
        }
        self.state.matrix_enable = enable;
        Ok(())
    }

    /// Weights of the 3-tap Gaussian filter, center first.
    pub fn gaussian_filter(&mut self, w0: f32, w1: f32, w2: f32) -> VgResult<()> {
        self.require(Capabilities::GAUSSIAN_BLUR, "gaussian filter")?;
        self.push_state(regs::GAUSSIAN_W0, (w0 * 256.0) as u32)?;
        self.push_state(regs::GAUSSIAN_W1, (w1 * 256.0) as u32)?;
        self.push_state(regs::GAUSSIAN_W2, (w2 * 256.0) as u32)
    }

    /// Palette for indexed sources.
    pub fn set_clut(&mut self, colors: &[u32]) -> VgResult<()> {
        self.require(Capabilities::INDEX_FORMAT, "indexed images")?;
        self.push_clut(regs::CLUT, colors)
    }

    pub fn enable_dither(&mut self) -> VgResult<()> {
        self.require(Capabilities::DITHER, "dither")?;
        self.push_state(regs::DITHER_LOW, DITHER_TABLE_LOW)?;
        self.push_state(regs::DITHER_HIGH, DITHER_TABLE_HIGH)
    }

    pub fn disable_dither(&mut self) -> VgResult<()> {
        self.require(Capabilities::DITHER, "dither")?;
        self.push_state(regs::DITHER_LOW, !0)?;
        self.push_state(regs::DITHER_HIGH, !0)
    }

    pub fn set_stripe_mode(&mut self, enabled: bool) -> VgResult<()> {
        self.require(Capabilities::STRIPE_MODE, "stripe mode")?;
        self.state.stripe = enabled;
        Ok(())
    }

    fn flexa_reset_pending(&mut self) -> VgResult<()> {
        match self.kernel_mut().check(FLEXA_RESET_STATUS)? {
            1 => Err(VgError::Timeout(0)),
            _ => Ok(()),
        }
    }

    /// Switches the target into flexa streaming mode.
    pub fn flexa_enable(&mut self) -> VgResult<()> {
        self.require(Capabilities::FLEXA, "flexa streaming")?;
        self.kernel_mut().dispatch(KernelRequest::FlexaEnable)?;
        self.state.flexa_mode = true;
        self.flexa_reset_pending()?;
        self.state.flexa_dirty = true;
        debug!("flexa streaming enabled");
        Ok(())
    }

    pub fn flexa_disable(&mut self) -> VgResult<()> {
        self.require(Capabilities::FLEXA, "flexa streaming")?;
        self.kernel_mut().dispatch(KernelRequest::FlexaDisable)?;
        self.state.flexa_mode = false;
        self.flexa_reset_pending()?;
        self.state.flexa_dirty = true;
        debug!("flexa streaming disabled");
        Ok(())
    }

    pub fn flexa_set_background(&mut self, buffer: &PixelBuffer) -> VgResult<()> {
        self.require(Capabilities::FLEXA, "flexa streaming")?;
        let address = buffer.address();
        self.kernel_mut()
            .dispatch(KernelRequest::FlexaSetBackgroundAddress { address })?;
        Ok(())
    }

    pub fn flexa_stop_frame(&mut self) -> VgResult<()> {
        self.require(Capabilities::FLEXA, "flexa streaming")?;
        self.kernel_mut().dispatch(KernelRequest::FlexaStopFrame)?;
        Ok(())
    }
}
