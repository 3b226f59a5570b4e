use std::{
    fs,
    path::{Path, PathBuf},
};

use chip8_overlay::machine::{Chip8, LoadError, MAX_PROGRAM_SIZE, Rgb, StepResult};

/// Scratch directory unique to one test, removed on drop.
struct Scratch(PathBuf);

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "chip8-overlay-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn write(&self, file: &str, bytes: &[u8]) -> PathBuf {
        let path = self.0.join(file);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn record(address: u16, r: u8, g: u8, b: u8) -> [u8; 5] {
    let [hi, lo] = address.to_be_bytes();
    [hi, lo, r, g, b]
}

// LD I, 000 ; DRW V0, V0, 5 ; halt
const DRAW_GLYPH_ZERO: [u8; 6] = [0xA0, 0x00, 0xD0, 0x05, 0x00, 0x00];

#[test]
fn loads_program_without_overlay() {
    let scratch = Scratch::new("plain");
    let rom = scratch.write("game.ch8", &DRAW_GLYPH_ZERO);

    let mut chip8 = Chip8::new();
    chip8.load_file(&rom).unwrap();

    assert_eq!(chip8.pc(), 0x200);
    assert!(chip8.overlay().is_none());
    assert_eq!(&chip8.memory()[0x200..0x206], &DRAW_GLYPH_ZERO);

    chip8.step();
    chip8.step();
    assert_eq!(chip8.pixel(0, 0), Rgb::WHITE.packed());
    assert_eq!(chip8.step().result, StepResult::Halt);
}

#[test]
fn picks_up_overlay_next_to_program() {
    let scratch = Scratch::new("overlay");
    let rom = scratch.write("game.ch8", &DRAW_GLYPH_ZERO);
    let overlay: Vec<u8> = [
        record(0x000, 0x20, 0x20, 0x40),
        record(0x000, 0x00, 0x00, 0xFF),
        record(0x000, 0xFF, 0x80, 0x00),
    ]
    .concat();
    scratch.write("game.col", &overlay);

    let mut chip8 = Chip8::new();
    chip8.load_file(&rom).unwrap();

    let table = chip8.overlay().unwrap();
    assert_eq!(table.entries().len(), 3);
    assert_eq!(chip8.background(), Rgb::new(0x20, 0x20, 0x40));

    chip8.step();
    chip8.step();
    assert_eq!(chip8.pixel(0, 0), 0xFF8000);
}

#[test]
fn malformed_overlay_only_disables_colors() {
    let scratch = Scratch::new("malformed");
    let rom = scratch.write("game.ch8", &DRAW_GLYPH_ZERO);

    let mut overlay: Vec<u8> = [record(0, 1, 2, 3), record(0, 4, 5, 6)].concat();
    overlay.push(0xAA);
    scratch.write("game.col", &overlay);

    let mut chip8 = Chip8::new();
    chip8.load_file(&rom).unwrap();
    assert!(chip8.overlay().is_none());
    assert_eq!(chip8.background(), Rgb::BLACK);

    // a single record is too few
    scratch.write("game.col", &record(0, 1, 2, 3));
    chip8.load_file(&rom).unwrap();
    assert!(chip8.overlay().is_none());
}

#[test]
fn oversized_program_is_rejected() {
    let scratch = Scratch::new("oversized");
    let rom = scratch.write("big.ch8", &vec![0x12; MAX_PROGRAM_SIZE + 1]);

    let mut chip8 = Chip8::new();
    let err = chip8.load_file(&rom).unwrap_err();
    assert!(matches!(err, LoadError::TooLarge { .. }));
    assert_eq!(chip8.pc(), 0);
    assert_eq!(chip8.memory()[0x200], 0);
}

#[test]
fn missing_program_reports_path() {
    let scratch = Scratch::new("missing");
    let rom = scratch.path().join("nope.ch8");

    let mut chip8 = Chip8::new();
    let err = chip8.load_file(&rom).unwrap_err();
    let LoadError::Io { path, .. } = &err else {
        panic!("expected io error, got {err:?}");
    };
    assert_eq!(path, &rom);
    assert!(err.to_string().contains("nope.ch8"));
}
