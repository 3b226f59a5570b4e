use clap::{Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;

use crate::machine::{Opcode, StepResult};
use crate::u4;

#[derive(Parser)]
#[command(multicall = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    #[command(visible_alias = "r")]
    Run,

    #[command(visible_alias = "p")]
    Pause,

    #[command(visible_alias = "s")]
    Step,

    #[command(visible_alias = "b")]
    Breakpoint {
        #[command(subcommand)]
        action: BreakpointAction,
    },

    Set {
        #[arg(value_parser = parse_set_target)]
        target: SetTarget,
        #[arg(value_parser = maybe_hex::<u16>)]
        value: u16,
    },

    #[command(visible_alias = "m")]
    Mem {
        #[arg(default_value = "0x200", value_parser = maybe_hex::<u16>)]
        start: u16,
        #[arg(default_value = "64", value_parser = maybe_hex::<u16>)]
        len: u16,
    },

    /// Disassemble `len` instructions from `start` (defaults to PC)
    #[command(visible_alias = "d")]
    Disasm {
        #[arg(value_parser = maybe_hex::<u16>)]
        start: Option<u16>,
        #[arg(default_value = "8", value_parser = maybe_hex::<u16>)]
        len: u16,
    },

    /// Full machine state, as written on a fault
    Dump,

    Trace {
        #[arg(value_enum)]
        mode: TraceMode,
    },

    #[command(visible_alias = "q")]
    Quit,
}

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    Ok,
    Breakpoints(Vec<u16>),
    MemDump { offset: u16, data: Vec<u8> },
    Disasm(Vec<DisasmLine>),
    Dump(Vec<String>),
    Quit,
}

/// One decoded instruction.
#[derive(Debug, PartialEq)]
pub struct DisasmLine {
    pub address: u16,
    pub raw: u16,
    pub opcode: Opcode,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Machine stopped: {0:?}")]
    Stopped(StepResult),
    #[error("Value out of range")]
    ValueOutOfRange,
    #[error("Address range {start:#05X}+{len} is outside memory")]
    AddressOutOfRange { start: u16, len: u16 },
    #[error("No trace sink attached (start with --trace <FILE>)")]
    NoTraceSink,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum BreakpointAction {
    #[command(visible_alias = "s")]
    Set {
        #[arg(value_parser = maybe_hex::<u16>)]
        addr: u16,
    },

    #[command(visible_alias = "c")]
    Clear {
        #[arg(value_parser = maybe_hex::<u16>)]
        addr: u16,
    },

    #[command(visible_alias = "l")]
    List,

    #[command(visible_alias = "ca")]
    ClearAll,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum TraceMode {
    On,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SetTarget {
    V(u4),
    I,
    Pc,
}

fn parse_set_target(s: &str) -> Result<SetTarget, String> {
    let lower = s.to_lowercase();

    match lower.as_str() {
        "index" | "i" => Ok(SetTarget::I),
        "pc" => Ok(SetTarget::Pc),

        _ if lower.starts_with('v') => {
            let hex_str = &lower[1..];
            match u8::from_str_radix(hex_str, 16) {
                Ok(val) if val < 16 => Ok(SetTarget::V(u4::new(val))),
                _ => Err(format!("Invalid register: '{}'", s)),
            }
        }

        _ => Err(format!("Unknown set target: '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, clap::Error> {
        Cli::try_parse_from(line.split_whitespace()).map(|cli| cli.command)
    }

    #[test]
    fn aliases() {
        assert_eq!(parse("r").unwrap(), Command::Run);
        assert_eq!(parse("p").unwrap(), Command::Pause);
        assert_eq!(parse("s").unwrap(), Command::Step);
        assert_eq!(parse("q").unwrap(), Command::Quit);
        assert_eq!(
            parse("b ca").unwrap(),
            Command::Breakpoint {
                action: BreakpointAction::ClearAll
            }
        );
    }

    #[test]
    fn numbers_accept_hex_or_decimal() {
        assert_eq!(
            parse("b s 0x20A").unwrap(),
            Command::Breakpoint {
                action: BreakpointAction::Set { addr: 0x20A }
            }
        );
        assert_eq!(
            parse("m 512 16").unwrap(),
            Command::Mem {
                start: 0x200,
                len: 16
            }
        );
    }

    #[test]
    fn defaults() {
        assert_eq!(
            parse("mem").unwrap(),
            Command::Mem {
                start: 0x200,
                len: 64
            }
        );
        assert_eq!(
            parse("d").unwrap(),
            Command::Disasm {
                start: None,
                len: 8
            }
        );
    }

    #[test]
    fn set_targets() {
        assert_eq!(
            parse("set vA 0xFF").unwrap(),
            Command::Set {
                target: SetTarget::V(u4::new(0xA)),
                value: 0xFF
            }
        );
        assert_eq!(
            parse("set index 3").unwrap(),
            Command::Set {
                target: SetTarget::I,
                value: 3
            }
        );
        assert!(parse("set v10 1").is_err());
        assert!(parse("set sp 1").is_err());
    }

    #[test]
    fn trace_modes() {
        assert_eq!(
            parse("trace on").unwrap(),
            Command::Trace {
                mode: TraceMode::On
            }
        );
        assert!(parse("trace maybe").is_err());
    }
}
