//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data. Text is encoded
//! with the configured device encoding as it is appended; command bytes are
//! emitted verbatim.

use crate::encoding::encode_text;
use encoding_rs::Encoding;

/// ESC/POS command builder
pub struct EscPosBuilder {
    buf: Vec<u8>,
    encoding: &'static Encoding,
}

impl EscPosBuilder {
    /// Create a new builder using the given text encoding for device output
    pub fn new(encoding: &'static Encoding) -> Self {
        let mut buf = Vec::with_capacity(4096);
        // Initialize printer (ESC @)
        buf.extend_from_slice(&[0x1B, 0x40]);
        Self { buf, encoding }
    }

    // === Text Output ===

    /// Write text (encoded for the device)
    pub fn text(&mut self, s: &str) -> &mut Self {
        let encoded = encode_text(s, self.encoding);
        self.buf.extend_from_slice(&encoded);
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Print and feed n lines (ESC d n)
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x64, lines]);
        self
    }

    // === Alignment ===

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    // === Text Style ===

    /// Enable bold text
    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    /// Disable bold text
    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    // === Paper Control ===

    /// Cut paper (full cut, GS V 0)
    pub fn cut(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x00]);
        self
    }

    /// Full cut after feeding n lines (GS V 66 n). Lets the printer manage
    /// cutter-to-head distance, wasting less top margin on the next receipt
    /// than separate feed() + cut() calls.
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x42, lines]);
        self
    }

    // === Cash Drawer ===

    /// Open cash drawer (pin 2, ESC p 0 t1 t2)
    pub fn open_drawer(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x70, 0x00, 25, 250]);
        self
    }

    /// Open cash drawer (pin 5)
    pub fn open_drawer_pin5(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x70, 0x01, 25, 250]);
        self
    }

    // === Raw Commands ===

    /// Write raw bytes directly (pre-rendered rasters, vendor commands)
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    // === Build ===

    /// Build the final byte buffer
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(encoding_rs::UTF_8)
    }
}

// ============================================================================
// Image Processing
// ============================================================================

/// Process an image file and return ESC/POS raster data
///
/// The image will be:
/// - Resized to fit max width (384 dots)
/// - Converted to 1-bit monochrome with transparency treated as white
/// - Encoded as GS v 0 raster graphics
///
/// Returns None when the file is missing or unreadable; a store without a
/// logo is a normal condition, not an error.
#[cfg(feature = "image")]
#[tracing::instrument]
pub fn process_logo(path: &str) -> Option<Vec<u8>> {
    use image::GenericImageView;
    use tracing::{info, warn};

    let img = match image::open(path) {
        Ok(i) => {
            info!(path = path, dimensions = ?i.dimensions(), "logo image opened");
            i
        }
        Err(e) => {
            warn!(path = path, error = %e, "logo not usable, skipping");
            return None;
        }
    };

    let (w, h) = img.dimensions();

    // Resize if too wide (max 384 dots for 58mm/80mm)
    let max_width = 384;
    let (new_w, new_h) = if w > max_width {
        let ratio = max_width as f64 / w as f64;
        (max_width, (h as f64 * ratio) as u32)
    } else {
        (w, h)
    };

    let resized = img.resize(new_w, new_h, image::imageops::FilterType::Nearest);

    // Raster bit image command GS v 0
    let x_bytes = new_w.div_ceil(8);

    let mut data = Vec::new();

    // GS v 0 m xL xH yL yH
    data.extend_from_slice(&[0x1D, 0x76, 0x30, 0x00]);
    data.push(x_bytes as u8);
    data.push((x_bytes >> 8) as u8);
    data.push(new_h as u8);
    data.push((new_h >> 8) as u8);

    // Convert to RGBA for transparency handling
    let rgba = resized.to_rgba8();

    for y in 0..new_h {
        for x_byte in 0..x_bytes {
            let mut byte = 0u8;
            for bit in 0..8 {
                let x = x_byte * 8 + bit;
                if x < new_w {
                    let pixel = rgba.get_pixel(x, y);

                    let alpha = pixel[3];
                    if alpha >= 128 {
                        // Opaque - check luminance
                        let luma = (0.299 * pixel[0] as f32
                            + 0.587 * pixel[1] as f32
                            + 0.114 * pixel[2] as f32) as u8;

                        // Dark enough = print black (1)
                        if luma < 128 {
                            byte |= 1 << (7 - bit);
                        }
                    }
                    // Transparent = white (0)
                }
            }
            data.push(byte);
        }
    }

    // Newline after image
    data.push(0x0A);

    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_basic() {
        let mut b = EscPosBuilder::default();
        b.center().bold().line("TOKO MAJU").bold_off().left().line("Jl. Sudirman 12");

        let data = b.build();
        // Starts with ESC @ init
        assert_eq!(&data[..2], &[0x1B, 0x40]);
        let s = String::from_utf8_lossy(&data);
        assert!(s.contains("TOKO MAJU"));
        assert!(s.contains("Jl. Sudirman 12"));
    }

    #[test]
    fn test_cut_command() {
        let mut b = EscPosBuilder::default();
        b.line("x").cut();

        let data = b.build();
        assert!(data.windows(3).any(|w| w == [0x1D, 0x56, 0x00]));
    }

    #[test]
    fn test_drawer_pulse() {
        let mut b = EscPosBuilder::default();
        b.open_drawer();

        let data = b.build();
        assert!(data.windows(5).any(|w| w == [0x1B, 0x70, 0x00, 25, 250]));
    }

    #[test]
    fn test_gbk_text_encoded() {
        let mut b = EscPosBuilder::new(encoding_rs::GBK);
        b.line("\u{4F60}\u{597D}");

        let data = b.build();
        // GBK for 你好 is 0xC4 0xE3 0xBA 0xC3
        assert!(data.windows(4).any(|w| w == [0xC4, 0xE3, 0xBA, 0xC3]));
    }

    #[test]
    fn test_missing_logo_is_none() {
        #[cfg(feature = "image")]
        assert!(process_logo("/nonexistent/logo.png").is_none());
    }
}
