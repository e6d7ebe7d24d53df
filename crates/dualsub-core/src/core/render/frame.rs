//! RGBA frame buffer and alpha compositing

use crate::core::{CoreError, CoreResult, Dimensions};

/// One decoded video frame, tightly packed RGBA8
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// A transparent-black frame
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Dimensions::new(width, height).rgba_len()],
        }
    }

    /// Wraps an existing buffer, checking its length
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> CoreResult<Self> {
        let expected = Dimensions::new(width, height).rgba_len();
        if data.len() != expected {
            return Err(CoreError::InvalidInput(format!(
                "RGBA buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Fills the frame with one color
    pub fn fill(&mut self, color: [u8; 4]) {
        for pixel in self.data.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.index(x, y);
        let mut out = [0; 4];
        out.copy_from_slice(&self.data[idx..idx + 4]);
        Some(out)
    }

    /// Source-over blends `color` at (x, y) scaled by `coverage` (0-255)
    ///
    /// Out-of-bounds coordinates are ignored.
    pub fn blend(&mut self, x: i32, y: i32, color: [u8; 4], coverage: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 || coverage == 0 {
            return;
        }
        let alpha = (u16::from(coverage) * u16::from(color[3])) / 255;
        if alpha == 0 {
            return;
        }
        let idx = self.index(x as u32, y as u32);
        let inv_alpha = 255 - alpha;
        for channel in 0..3 {
            let dst = u16::from(self.data[idx + channel]);
            let src = u16::from(color[channel]);
            self.data[idx + channel] = ((src * alpha + dst * inv_alpha + 127) / 255) as u8;
        }
        self.data[idx + 3] = 255;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(Frame::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            Frame::from_rgba(2, 2, vec![0; 15]),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_full_coverage_replaces_pixel() {
        let mut frame = Frame::new(2, 2);
        frame.blend(1, 1, [200, 100, 50, 255], 255);
        assert_eq!(frame.pixel(1, 1), Some([200, 100, 50, 255]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_partial_coverage_mixes() {
        let mut frame = Frame::new(1, 1);
        frame.fill([0, 0, 0, 255]);
        frame.blend(0, 0, [255, 255, 255, 255], 128);
        let [r, g, b, a] = frame.pixel(0, 0).unwrap();
        assert!((127..=129).contains(&r));
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(a, 255);
    }

    #[test]
    fn test_blend_out_of_bounds_is_ignored() {
        let mut frame = Frame::new(1, 1);
        frame.blend(-1, 0, [255; 4], 255);
        frame.blend(0, 5, [255; 4], 255);
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(frame.pixel(1, 0), None);
    }
}
