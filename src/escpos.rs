//! Minimal ESC/POS binary command builder for thermal receipt printers.
//!
//! Produces the raw byte stream written by the `file` print channel. Text is
//! encoded as CP850 so Spanish names (ñ, á, ¿) survive on common 58mm printers.

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// ESC t code page number for PC850 (Multilingual Latin I).
const CODE_PAGE_PC850: u8 = 2;

/// Builder for generating ESC/POS binary command buffers.
///
/// ```rust,ignore
/// let mut b = EscPosBuilder::new();
/// b.init().latin_mode()
///     .center().bold(true).text("TURCO'S HOUSE\n").bold(false)
///     .left().text("2 Azulito        Q70.00\n")
///     .feed(3)
///     .cut();
/// let data = b.build();
/// ```
pub struct EscPosBuilder {
    buffer: Vec<u8>,
    latin: bool,
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EscPosBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            latin: false,
        }
    }

    /// ESC @: Initialize printer, reset to defaults.
    pub fn init(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x40]);
        self
    }

    /// ESC t n: Select character code page.
    pub fn code_page(&mut self, page: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x74, page]);
        self
    }

    /// Select PC850 and encode subsequent text with it.
    pub fn latin_mode(&mut self) -> &mut Self {
        self.code_page(CODE_PAGE_PC850);
        self.latin = true;
        self
    }

    /// ESC E n: Bold on/off.
    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x45, u8::from(on)]);
        self
    }

    /// ESC a 0: Left-align.
    pub fn left(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 0]);
        self
    }

    /// ESC a 1: Centre-align.
    pub fn center(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 1]);
        self
    }

    /// Append text: CP850 in latin mode, otherwise ASCII with `?` for the rest.
    pub fn text(&mut self, s: &str) -> &mut Self {
        if self.latin {
            self.buffer.extend(encode_cp850(s));
        } else {
            self.buffer
                .extend(s.chars().map(|ch| if ch.is_ascii() { ch as u8 } else { b'?' }));
        }
        self
    }

    pub fn lf(&mut self) -> &mut Self {
        self.buffer.push(LF);
        self
    }

    /// ESC d n: Feed n lines.
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x64, lines]);
        self
    }

    /// GS V A 16: Partial cut with 16-dot feed.
    pub fn cut(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[GS, 0x56, 0x41, 0x10]);
        self
    }

    /// Consume the builder and return the binary ESC/POS payload.
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

// ---------------------------------------------------------------------------
// CP850 encoding
// ---------------------------------------------------------------------------

/// Encode a string to CP850. ASCII passes through, Spanish letters and
/// punctuation are mapped, anything else becomes `?`.
fn encode_cp850(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| {
            if ch.is_ascii() {
                ch as u8
            } else {
                latin_to_cp850(ch).unwrap_or(b'?')
            }
        })
        .collect()
}

fn latin_to_cp850(ch: char) -> Option<u8> {
    match ch {
        'á' => Some(0xA0),
        'é' => Some(0x82),
        'í' => Some(0xA1),
        'ó' => Some(0xA2),
        'ú' => Some(0xA3),
        'ü' => Some(0x81),
        'ñ' => Some(0xA4),
        'Á' => Some(0xB5),
        'É' => Some(0x90),
        'Í' => Some(0xD6),
        'Ó' => Some(0xE0),
        'Ú' => Some(0xE9),
        'Ü' => Some(0x9A),
        'Ñ' => Some(0xA5),
        '¿' => Some(0xA8),
        '¡' => Some(0xAD),
        '°' => Some(0xF8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_code_page() {
        let mut b = EscPosBuilder::new();
        b.init().latin_mode();
        assert_eq!(b.build(), vec![0x1B, 0x40, 0x1B, 0x74, 2]);
    }

    #[test]
    fn test_bold_center_text() {
        let mut b = EscPosBuilder::new();
        b.center().bold(true).text("HI").bold(false);
        assert_eq!(
            b.build(),
            vec![0x1B, 0x61, 1, 0x1B, 0x45, 1, b'H', b'I', 0x1B, 0x45, 0]
        );
    }

    #[test]
    fn test_feed_and_cut() {
        let mut b = EscPosBuilder::new();
        b.feed(3).cut();
        assert_eq!(b.build(), vec![0x1B, 0x64, 3, 0x1D, 0x56, 0x41, 0x10]);
    }

    #[test]
    fn test_spanish_text_in_latin_mode() {
        let mut b = EscPosBuilder::new();
        b.latin_mode().text("Niño ¡sí!");
        let data = b.build();
        assert_eq!(
            &data[3..],
            &[b'N', b'i', 0xA4, b'o', b' ', 0xAD, b's', 0xA1, b'!']
        );
    }

    #[test]
    fn test_non_ascii_without_latin_mode() {
        let mut b = EscPosBuilder::new();
        b.text("año").lf();
        assert_eq!(b.build(), vec![b'a', b'?', b'o', b'\n']);
    }
}
