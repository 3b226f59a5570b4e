pub mod debugger;
pub mod logging;
pub mod machine;
mod nibble;

pub use nibble::u4;
