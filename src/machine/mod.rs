mod chip8;
mod execute;
mod font;
mod opcode;
mod overlay;
mod runner;
mod trace;
mod types;

pub use chip8::*;
pub use font::*;
pub use opcode::*;
pub use overlay::*;
pub use runner::*;
pub use trace::*;
pub use types::*;
