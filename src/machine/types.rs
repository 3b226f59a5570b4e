use std::path::PathBuf;

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
pub const DISPLAY_SIZE: usize = DISPLAY_X * DISPLAY_Y;

/// A packed `0x00RRGGBB` pixel. Zero means the pixel is off; any other value is lit.
pub type Pixel = u32;
/// Row-major framebuffer, index = row * DISPLAY_X + col.
pub type Framebuffer = [Pixel; DISPLAY_SIZE];

/// Outcome of executing a single instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// The instruction completed, keep stepping.
    Continue,
    /// A `0000` word was fetched: the program asked to stop.
    Halt,
    /// An instruction computed a memory address past the end of memory.
    OutOfBounds,
    /// `2nnn` with all 16 return slots in use.
    StackOverflow,
    /// `00EE` with an empty call stack.
    StackUnderflow,
}

impl StepResult {
    /// True for the results that mean the machine stopped because of a fault.
    pub fn is_fault(self) -> bool {
        matches!(
            self,
            StepResult::OutOfBounds | StepResult::StackOverflow | StepResult::StackUnderflow
        )
    }
}

/// A step result together with the "frame dirty" side channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub result: StepResult,
    /// Set when the instruction changed at least one framebuffer cell.
    pub redraw: bool,
}

impl Step {
    pub(crate) const fn new(result: StepResult) -> Self {
        Self {
            result,
            redraw: false,
        }
    }

    pub(crate) const fn drawn(redraw: bool) -> Self {
        Self {
            result: StepResult::Continue,
            redraw,
        }
    }
}

/// A 24-bit color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn packed(self) -> Pixel {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    pub const fn from_packed(pixel: Pixel) -> Self {
        Self::new((pixel >> 16) as u8, (pixel >> 8) as u8, pixel as u8)
    }
}

/// Errors raised while loading a program.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read program {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Program is too large ({size} bytes), max size is {max_size} bytes")]
    TooLarge { size: usize, max_size: usize },
}

/// Reasons a color overlay was rejected.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("Failed to read color overlay: {0}")]
    Io(#[from] std::io::Error),

    #[error("Color overlay has {len} bytes, which is not a whole number of 5-byte records")]
    TrailingBytes { len: usize },

    #[error("Color overlay has {count} records, at least 2 are required")]
    TooFewRecords { count: usize },
}
