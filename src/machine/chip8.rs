use std::path::Path;

use rand::RngCore;

use super::{
    ColorOverlay, DISPLAY_SIZE, DISPLAY_X, DISPLAY_Y, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS,
    Framebuffer, LoadError, Opcode, OverlayError, Pixel, Rgb, Step, StepResult, TraceSink,
};
use crate::u4;

// Memory map fixed by the platform
pub const PROGRAM_START_ADDRESS: usize = 0x200;
pub const MEMORY_SIZE: usize = 4096;
/// Largest program the loader accepts.
pub const MAX_PROGRAM_SIZE: usize = 0xE00;
pub const STACK_SIZE: usize = 16;

/// Extension of the color overlay file that sits next to a program.
pub const OVERLAY_EXTENSION: &str = "col";

/// Virtual machine state
pub struct Chip8 {
    /// 4KB memory array, font at 0x000, program from 0x200
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// 64x32 packed-RGB cells, zero is off
    pub(crate) display: Framebuffer,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Return addresses, `sp` is the number of slots in use
    pub(crate) stack: [u16; STACK_SIZE],
    pub(crate) sp: u8,

    /// Delay timer: decrements at 60Hz until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements at 60Hz, the host beeps while non-zero
    pub(crate) sound_timer: u8,

    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; 16],

    pub(crate) overlay: Option<ColorOverlay>,
    pub(crate) rng: Box<dyn RngCore>,

    pub(crate) sink: Option<Box<dyn TraceSink>>,
    pub(crate) tracing: bool,
    /// Number of instructions executed so far
    pub(crate) op_count: u64,
}

impl Chip8 {
    /// Creates a zeroed machine with the font in place and PC at 0.
    pub fn new() -> Self {
        let mut memory = [0; MEMORY_SIZE];
        memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);

        Chip8 {
            memory,
            display: [0; DISPLAY_SIZE],
            pc: 0,
            i: 0,
            v: [0; 16],
            stack: [0; STACK_SIZE],
            sp: 0,
            delay_timer: 0,
            sound_timer: 0,
            keypad: [false; 16],
            overlay: None,
            rng: Box::new(rand::rng()),
            sink: None,
            tracing: false,
            op_count: 0,
        }
    }

    /// Creates a machine that reports anomalies and, once enabled, traces to `sink`.
    pub fn with_sink(sink: Box<dyn TraceSink>) -> Self {
        let mut chip8 = Self::new();
        chip8.sink = Some(sink);
        chip8
    }

    /// Replaces the random source used by `Cxkk`.
    pub fn with_rng(mut self, rng: Box<dyn RngCore>) -> Self {
        self.rng = rng;
        self
    }

    /// Turns the per-instruction trace on or off. Without a sink this has no effect.
    pub fn set_tracing(&mut self, enabled: bool) {
        self.tracing = enabled;
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing && self.sink.is_some()
    }

    /// Copies a program to 0x200 and points PC at it.
    ///
    /// Oversized programs are rejected before any memory is touched.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), LoadError> {
        if rom.len() > MAX_PROGRAM_SIZE {
            return Err(LoadError::TooLarge {
                size: rom.len(),
                max_size: MAX_PROGRAM_SIZE,
            });
        }

        let rom_end = PROGRAM_START_ADDRESS + rom.len();
        self.memory[PROGRAM_START_ADDRESS..rom_end].copy_from_slice(rom);
        self.pc = PROGRAM_START_ADDRESS as u16;

        Ok(())
    }

    /// Loads a program from disk along with its color overlay, if one exists.
    ///
    /// The overlay is looked up at the same path with the extension replaced by `col`.
    /// A missing or malformed overlay only disables overlay mode.
    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let rom = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load(&rom)?;
        tracing::info!("loaded {} ({} bytes)", path.display(), rom.len());

        let overlay_path = path.with_extension(OVERLAY_EXTENSION);
        self.overlay = match ColorOverlay::load(&overlay_path) {
            Ok(overlay) => {
                tracing::info!(
                    "color overlay {} with {} records",
                    overlay_path.display(),
                    overlay.entries().len()
                );
                Some(overlay)
            }
            Err(OverlayError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no color overlay at {}", overlay_path.display());
                None
            }
            Err(e) => {
                tracing::warn!("color overlay disabled ({}): {e}", overlay_path.display());
                None
            }
        };

        Ok(())
    }

    pub fn set_overlay(&mut self, overlay: Option<ColorOverlay>) {
        self.overlay = overlay;
    }

    pub fn overlay(&self) -> Option<&ColorOverlay> {
        self.overlay.as_ref()
    }

    /// Executes a single instruction (fetch, decode, execute).
    pub fn step(&mut self) -> Step {
        let (Some(&high), Some(&low)) = (
            self.memory.get(usize::from(self.pc)),
            self.memory.get(usize::from(self.pc) + 1),
        ) else {
            self.report(format!("fetch out of bounds at {:#05X}", self.pc));
            return Step::new(StepResult::OutOfBounds);
        };

        self.step_opcode(u16::from_be_bytes([high, low]))
    }

    /// Executes `opcode` as if it had been fetched from PC.
    pub fn step_opcode(&mut self, opcode: u16) -> Step {
        self.op_count += 1;
        let (count, pc) = (self.op_count, self.pc);
        self.trace(|| format!("{count:>8} {pc:#05X} {opcode:#06X} >"));

        let step = self.execute(Opcode::decode(opcode));

        self.trace(|| format!("{count:>8} {pc:#05X} {opcode:#06X} < {:?}", step.result));
        if step.result != StepResult::Continue {
            tracing::debug!("stopped with {:?} at {pc:#05X} ({opcode:#06X})", step.result);
        }
        step
    }

    /// Decrements both timers once. Call at 60Hz.
    pub fn tick(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }

    /// Overwrites the whole keypad.
    pub fn set_keypad(&mut self, keys: [bool; 16]) {
        self.keypad = keys;
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;
    }

    pub fn keypad(&self) -> &[bool; 16] {
        &self.keypad
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.display
    }

    /// Packed color of the cell at column `x`, row `y`; zero when off.
    pub fn pixel(&self, x: usize, y: usize) -> Pixel {
        debug_assert!(x < DISPLAY_X && y < DISPLAY_Y);
        self.display[y * DISPLAY_X + x]
    }

    pub fn is_lit(&self, x: usize, y: usize) -> bool {
        self.pixel(x, y) != 0
    }

    /// Color a host should paint unlit cells with.
    pub fn background(&self) -> Rgb {
        self.overlay
            .as_ref()
            .map_or(Rgb::BLACK, ColorOverlay::background)
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn index(&self) -> u16 {
        self.i
    }

    pub fn set_index(&mut self, i: u16) {
        self.i = i;
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn set_register(&mut self, x: u4, value: u8) {
        self.v[x] = value;
    }

    /// Active return addresses, oldest first.
    pub fn stack(&self) -> &[u16] {
        &self.stack[..usize::from(self.sp)]
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn op_count(&self) -> u64 {
        self.op_count
    }

    /// Bounds-checked range `[start, start + len)`; `None` if any byte lies outside memory.
    pub(crate) fn mem_range(&self, start: u16, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::from(start);
        let end = start + len;
        (end <= MEMORY_SIZE).then_some(start..end)
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}
