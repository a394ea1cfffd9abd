// YUV -> RGB conversion through lookup tables (BT.709, limited range, 8 bit).
// The difference renderer converts every output pixel, so the per-sample
// multiplications are precomputed once.

/// 16.16 fixed point coefficients.
const Y_GAIN: i32 = 76_309; // 1.164 * 65536
const V_TO_R: i32 = 117_504; // 1.793
const U_TO_G: i32 = -13_954; // -0.213
const V_TO_G: i32 = -34_903; // -0.533
const U_TO_B: i32 = 138_453; // 2.112
const ROUND: i32 = 1 << 15;

pub struct YuvToRgbLut {
    luma: [i32; 256],
    v_r: [i32; 256],
    u_g: [i32; 256],
    v_g: [i32; 256],
    u_b: [i32; 256],
}

impl YuvToRgbLut {
    /// Build all tables once.
    pub fn new() -> Self {
        let mut lut = Self {
            luma: [0; 256],
            v_r: [0; 256],
            u_g: [0; 256],
            v_g: [0; 256],
            u_b: [0; 256],
        };
        for v in 0..256usize {
            let s = v as i32;
            lut.luma[v] = (s - 16) * Y_GAIN;
            lut.v_r[v] = (s - 128) * V_TO_R;
            lut.u_g[v] = (s - 128) * U_TO_G;
            lut.v_g[v] = (s - 128) * V_TO_G;
            lut.u_b[v] = (s - 128) * U_TO_B;
        }
        lut
    }

    #[inline]
    pub fn to_rgb(&self, y: u8, u: u8, v: u8) -> [u8; 3] {
        let l = self.luma[y as usize];
        let r = l + self.v_r[v as usize];
        let g = l + self.u_g[u as usize] + self.v_g[v as usize];
        let b = l + self.u_b[u as usize];
        [clip(r), clip(g), clip(b)]
    }

    /// RGB gray of a mid-level (no difference) YUV sample: (128,128,128) -> 130.
    pub fn neutral_gray(&self) -> u8 {
        self.to_rgb(128, 128, 128)[0]
    }
}

impl Default for YuvToRgbLut {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn clip(fixed: i32) -> u8 {
    ((fixed + ROUND) >> 16).clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_gray_converts_to_130() {
        let lut = YuvToRgbLut::new();
        assert_eq!(lut.to_rgb(128, 128, 128), [130, 130, 130]);
        assert_eq!(lut.neutral_gray(), 130);
    }

    #[test]
    fn range_ends_saturate() {
        let lut = YuvToRgbLut::new();
        assert_eq!(lut.to_rgb(0, 128, 128), [0, 0, 0]);
        assert_eq!(lut.to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(lut.to_rgb(255, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn chroma_moves_channels_apart() {
        let lut = YuvToRgbLut::new();
        let [r, g, b] = lut.to_rgb(128, 128, 200);
        assert!(r > 130 && g < 130);
        assert_eq!(b, 130);
    }
}
