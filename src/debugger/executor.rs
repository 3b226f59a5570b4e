use std::collections::HashSet;

use super::commands::{
    BreakpointAction, Command, CommandError, CommandResult, DisasmLine, SetTarget, TraceMode,
};
use crate::machine::{Chip8, MEMORY_SIZE, Opcode, Runner, RunnerEvent, StepResult};

pub struct Executor {
    is_running: bool,
    runner: Runner,
    breakpoints: HashSet<u16>,
}

impl Executor {
    pub fn new(runner: Runner) -> Self {
        Self {
            is_running: false,
            runner,
            breakpoints: HashSet::new(),
        }
    }

    /// Advances the machine while in running mode. Breakpoints and stops drop back to paused.
    pub fn poll(&mut self, dt: f32) -> RunnerEvent {
        if !self.is_running {
            return RunnerEvent::Running { redraw: false };
        }

        let event = self
            .runner
            .update_with_breakpoints(dt, Some(&self.breakpoints));

        if matches!(event, RunnerEvent::HitBreakpoint | RunnerEvent::Stopped(_)) {
            self.is_running = false;
        }

        event
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.run();
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.pause();
                Ok(CommandResult::Ok)
            }
            Command::Step => self.step(),
            Command::Breakpoint { action } => Ok(self.handle_breakpoint(action)),
            Command::Set { target, value } => self.handle_set(target, value),
            Command::Mem { start, len } => self.handle_mem(start, len),
            Command::Disasm { start, len } => self.handle_disasm(start, len),
            Command::Dump => {
                let mut lines = Vec::new();
                self.chip8().dump_to(&mut lines);
                Ok(CommandResult::Dump(lines))
            }
            Command::Trace { mode } => self.handle_trace(mode),
            Command::Quit => Ok(CommandResult::Quit),
        }
    }

    pub fn run(&mut self) {
        self.is_running = true;
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    pub fn step(&mut self) -> Result<CommandResult, CommandError> {
        match self.runner.step() {
            StepResult::Continue => Ok(CommandResult::Ok),
            stopped => Err(CommandError::Stopped(stopped)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn breakpoints(&self) -> &HashSet<u16> {
        &self.breakpoints
    }

    pub fn chip8(&self) -> &Chip8 {
        self.runner.chip8_ref()
    }

    pub fn runner_mut(&mut self) -> &mut Runner {
        &mut self.runner
    }

    fn handle_breakpoint(&mut self, action: BreakpointAction) -> CommandResult {
        match action {
            BreakpointAction::Set { addr } => {
                self.breakpoints.insert(addr);
            }
            BreakpointAction::Clear { addr } => {
                self.breakpoints.remove(&addr);
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
            }
            BreakpointAction::List => {
                let mut bps: Vec<u16> = self.breakpoints.iter().copied().collect();
                bps.sort_unstable();
                return CommandResult::Breakpoints(bps);
            }
        };

        CommandResult::Ok
    }

    fn handle_set(&mut self, target: SetTarget, value: u16) -> Result<CommandResult, CommandError> {
        match target {
            SetTarget::V(reg) => {
                let value = u8::try_from(value).map_err(|_| CommandError::ValueOutOfRange)?;
                self.runner.chip8_mut().set_register(reg, value);
            }
            SetTarget::I | SetTarget::Pc if usize::from(value) >= MEMORY_SIZE => {
                return Err(CommandError::ValueOutOfRange);
            }
            SetTarget::I => self.runner.chip8_mut().set_index(value),
            SetTarget::Pc => self.runner.chip8_mut().set_pc(value),
        }

        Ok(CommandResult::Ok)
    }

    fn handle_mem(&self, start: u16, len: u16) -> Result<CommandResult, CommandError> {
        let from = usize::from(start);
        let data = self
            .chip8()
            .memory()
            .get(from..from + usize::from(len))
            .ok_or(CommandError::AddressOutOfRange { start, len })?;

        Ok(CommandResult::MemDump {
            offset: start,
            data: data.to_vec(),
        })
    }

    fn handle_disasm(&self, start: Option<u16>, len: u16) -> Result<CommandResult, CommandError> {
        let start = start.unwrap_or_else(|| self.chip8().pc());
        let from = usize::from(start);
        let bytes = self
            .chip8()
            .memory()
            .get(from..from + usize::from(len) * 2)
            .ok_or(CommandError::AddressOutOfRange {
                start,
                len: len.saturating_mul(2),
            })?;

        let lines = bytes
            .chunks_exact(2)
            .zip((start..).step_by(2))
            .map(|(word, address)| {
                let raw = u16::from_be_bytes([word[0], word[1]]);
                DisasmLine {
                    address,
                    raw,
                    opcode: Opcode::decode(raw),
                }
            })
            .collect();

        Ok(CommandResult::Disasm(lines))
    }

    fn handle_trace(&mut self, mode: TraceMode) -> Result<CommandResult, CommandError> {
        let chip8 = self.runner.chip8_mut();
        chip8.set_tracing(mode == TraceMode::On);
        if mode == TraceMode::On && !chip8.is_tracing() {
            chip8.set_tracing(false);
            return Err(CommandError::NoTraceSink);
        }
        Ok(CommandResult::Ok)
    }
}
