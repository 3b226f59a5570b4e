use std::path::Path;

use super::{OverlayError, Rgb};

const RECORD_SIZE: usize = 5;

/// One overlay record: sprites drawn while I equals `address` use `color`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayEntry {
    pub address: u16,
    pub color: Rgb,
}

/// Per-program color remapping.
///
/// Record 0 is the background color, record 1 the default sprite color. Every later record
/// overrides the sprite color for draws whose index register equals its address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorOverlay {
    entries: Vec<OverlayEntry>,
}

impl ColorOverlay {
    /// Builds an overlay from already decoded entries.
    pub fn new(entries: Vec<OverlayEntry>) -> Result<Self, OverlayError> {
        if entries.len() < 2 {
            return Err(OverlayError::TooFewRecords {
                count: entries.len(),
            });
        }
        Ok(Self { entries })
    }

    /// Decodes the binary record format: 2 bytes big-endian address, then R, G, B.
    pub fn parse(bytes: &[u8]) -> Result<Self, OverlayError> {
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(OverlayError::TrailingBytes { len: bytes.len() });
        }

        let entries = bytes
            .chunks_exact(RECORD_SIZE)
            .map(|record| OverlayEntry {
                address: u16::from_be_bytes([record[0], record[1]]),
                color: Rgb::new(record[2], record[3], record[4]),
            })
            .collect();

        Self::new(entries)
    }

    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn background(&self) -> Rgb {
        self.entries[0].color
    }

    pub fn default_sprite_color(&self) -> Rgb {
        self.entries[1].color
    }

    /// Color for a sprite drawn with the index register at `index`.
    pub fn sprite_color(&self, index: u16) -> Rgb {
        self.entries[2..]
            .iter()
            .find(|entry| entry.address == index)
            .map_or(self.default_sprite_color(), |entry| entry.color)
    }

    pub fn entries(&self) -> &[OverlayEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: u16, r: u8, g: u8, b: u8) -> [u8; 5] {
        let [hi, lo] = address.to_be_bytes();
        [hi, lo, r, g, b]
    }

    #[test]
    fn parses_big_endian_addresses() {
        let bytes = [record(0, 1, 2, 3), record(0, 4, 5, 6), record(0x2A4, 7, 8, 9)].concat();
        let overlay = ColorOverlay::parse(&bytes).unwrap();

        assert_eq!(overlay.entries().len(), 3);
        assert_eq!(overlay.entries()[2].address, 0x2A4);
        assert_eq!(overlay.background(), Rgb::new(1, 2, 3));
        assert_eq!(overlay.default_sprite_color(), Rgb::new(4, 5, 6));
    }

    #[test]
    fn sprite_color_prefers_matching_record() {
        let bytes = [
            record(0x000, 0, 0, 0),
            record(0x300, 0xFF, 0xFF, 0xFF),
            record(0x300, 0xFF, 0, 0),
            record(0x310, 0, 0xFF, 0),
            record(0x310, 0, 0, 0xFF),
        ]
        .concat();
        let overlay = ColorOverlay::parse(&bytes).unwrap();

        // record 1 shares an address with record 2, but only records 2.. are searched
        assert_eq!(overlay.sprite_color(0x300), Rgb::new(0xFF, 0, 0));
        // first match wins
        assert_eq!(overlay.sprite_color(0x310), Rgb::new(0, 0xFF, 0));
        assert_eq!(overlay.sprite_color(0x320), Rgb::WHITE);
    }

    #[test]
    fn rejects_too_few_records() {
        let err = ColorOverlay::parse(&record(0, 1, 2, 3)).unwrap_err();
        assert!(matches!(err, OverlayError::TooFewRecords { count: 1 }));

        let err = ColorOverlay::parse(&[]).unwrap_err();
        assert!(matches!(err, OverlayError::TooFewRecords { count: 0 }));
    }

    #[test]
    fn rejects_partial_record() {
        let mut bytes = [record(0, 1, 2, 3), record(0, 4, 5, 6)].concat();
        bytes.push(0xAA);

        let err = ColorOverlay::parse(&bytes).unwrap_err();
        assert!(matches!(err, OverlayError::TrailingBytes { len: 11 }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ColorOverlay::load(Path::new("/nonexistent/chip8-overlay/none.col")).unwrap_err();
        assert!(matches!(err, OverlayError::Io(_)));
    }
}
