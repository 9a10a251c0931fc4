//! Pixel codecs for the packed RGB formats the reference executor understands.
//!
//! Format codes are the hardware codes programmed into `TARGET_CONFIG` / `IMAGE_CONFIG`: the low
//! nibble selects the bit layout and bits 4..5 select the channel order. Channel orders are listed
//! least-significant field first.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Unpacks the `0xAABBGGRR` color word used by color registers.
    pub const fn from_abgr32(c: u32) -> Self {
        Self {
            r: c as u8,
            g: (c >> 8) as u8,
            b: (c >> 16) as u8,
            a: (c >> 24) as u8,
        }
    }

    pub const fn to_abgr32(self) -> u32 {
        (self.r as u32) | ((self.g as u32) << 8) | ((self.b as u32) << 16) | ((self.a as u32) << 24)
    }

    /// BT.709 luma, truncated.
    pub fn luminance(self) -> u8 {
        (0.2126f32 * self.r as f32 + 0.7152f32 * self.g as f32 + 0.0722f32 * self.b as f32) as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    R,
    G,
    B,
    A,
    /// Padding; reads as opaque alpha.
    X,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    Rgba8888,
    Rgbx8888,
    Rgb565,
    Rgba4444,
    Rgba5551,
    Rgba2222,
    Alpha8,
    Luminance8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelLayout {
    family: Family,
    swizzle: u32,
}

fn channel_order(swizzle: u32) -> [Channel; 4] {
    match swizzle {
        0x00 => [Channel::B, Channel::G, Channel::R, Channel::A],
        0x10 => [Channel::A, Channel::B, Channel::G, Channel::R],
        0x20 => [Channel::R, Channel::G, Channel::B, Channel::A],
        _ => [Channel::A, Channel::R, Channel::G, Channel::B],
    }
}

impl PixelLayout {
    /// Layout for a render-target format code.
    pub fn from_target_code(code: u32) -> Option<Self> {
        let family = match code & 0x0F {
            0x0 => Family::Alpha8,
            0x1 => Family::Rgb565,
            0x2 => Family::Rgbx8888,
            0x3 => Family::Rgba8888,
            0x4 => Family::Rgba4444,
            0x5 => Family::Rgba5551,
            0x6 => Family::Luminance8,
            0x7 => Family::Rgba2222,
            _ => return None,
        };
        if code & !0x3F != 0 {
            return None;
        }
        Some(Self {
            family,
            swizzle: code & 0x30,
        })
    }

    /// Layout for an image-source format code.
    pub fn from_source_code(code: u32) -> Option<Self> {
        if code & !0x3F != 0 {
            return None;
        }
        let family = match code & 0x0F {
            0x0 => Family::Luminance8,
            0x2 => Family::Alpha8,
            0x3 => Family::Rgba4444,
            0x4 => Family::Rgba5551,
            0x5 => Family::Rgb565,
            0x6 => Family::Rgbx8888,
            0x7 => Family::Rgba8888,
            _ => return None,
        };
        Some(Self {
            family,
            swizzle: code & 0x30,
        })
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self.family {
            Family::Rgba8888 | Family::Rgbx8888 => 4,
            Family::Rgb565 | Family::Rgba4444 | Family::Rgba5551 => 2,
            Family::Rgba2222 | Family::Alpha8 | Family::Luminance8 => 1,
        }
    }

    pub fn is_luminance(&self) -> bool {
        self.family == Family::Luminance8
    }

    /// Fields as `(channel, bits)`, least significant first.
    fn fields(&self) -> Vec<(Channel, u32)> {
        let order = channel_order(self.swizzle);
        match self.family {
            Family::Rgba8888 => order.iter().map(|&c| (c, 8)).collect(),
            Family::Rgbx8888 => order
                .iter()
                .map(|&c| (if c == Channel::A { Channel::X } else { c }, 8))
                .collect(),
            Family::Rgba4444 => order.iter().map(|&c| (c, 4)).collect(),
            Family::Rgba2222 => order.iter().map(|&c| (c, 2)).collect(),
            Family::Rgba5551 => order
                .iter()
                .map(|&c| (c, if c == Channel::A { 1 } else { 5 }))
                .collect(),
            Family::Rgb565 => {
                if self.swizzle == 0x20 {
                    vec![(Channel::R, 5), (Channel::G, 6), (Channel::B, 5)]
                } else {
                    vec![(Channel::B, 5), (Channel::G, 6), (Channel::R, 5)]
                }
            }
            Family::Alpha8 => vec![(Channel::A, 8)],
            Family::Luminance8 => vec![(Channel::R, 8)],
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Rgba8 {
        let mut word = 0u32;
        for (i, b) in bytes.iter().take(self.bytes_per_pixel()).enumerate() {
            word |= (*b as u32) << (8 * i);
        }

        let mut px = Rgba8::new(0, 0, 0, 0xFF);
        let mut shift = 0;
        for (channel, bits) in self.fields() {
            let max = (1u32 << bits) - 1;
            let v = (word >> shift) & max;
            let v8 = ((v * 255 + max / 2) / max) as u8;
            match channel {
                Channel::R => px.r = v8,
                Channel::G => px.g = v8,
                Channel::B => px.b = v8,
                Channel::A => px.a = v8,
                Channel::X => {}
            }
            shift += bits;
        }
        match self.family {
            Family::Luminance8 => {
                px.g = px.r;
                px.b = px.r;
            }
            Family::Alpha8 => {
                px.r = 0;
                px.g = 0;
                px.b = 0;
            }
            _ => {}
        }
        px
    }

    /// Packs `px` into `out[..bytes_per_pixel()]`. Luminance targets store the red channel as-is.
    pub fn encode(&self, px: Rgba8, out: &mut [u8]) {
        let mut word = 0u32;
        let mut shift = 0;
        for (channel, bits) in self.fields() {
            let max = (1u32 << bits) - 1;
            let v8 = match channel {
                Channel::R => px.r,
                Channel::G => px.g,
                Channel::B => px.b,
                Channel::A => px.a,
                Channel::X => 0xFF,
            } as u32;
            word |= ((v8 * max + 127) / 255) << shift;
            shift += bits;
        }
        for (i, b) in out.iter_mut().take(self.bytes_per_pixel()).enumerate() {
            *b = (word >> (8 * i)) as u8;
        }
    }
}
