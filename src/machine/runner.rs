use std::collections::HashSet;

use super::{Chip8, StepResult};
use crate::u4;

/// Instruction and timer rates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunnerConfig {
    pub cpu_hz: f32,
    pub timer_hz: f32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cpu_hz: 700.0,
            timer_hz: 60.0,
        }
    }
}

/// What happened during one `update`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerEvent {
    /// Still running; `redraw` is set if any instruction changed the framebuffer.
    Running { redraw: bool },
    HitBreakpoint,
    /// The machine halted or faulted. The runner will not step it again.
    Stopped(StepResult),
}

/// High-level emulator runner that paces instructions and timers by wall-clock time.
pub struct Runner {
    chip8: Chip8,
    config: RunnerConfig,
    cpu_dt_accumulator: f32,
    timer_dt_accumulator: f32,
    stopped: Option<StepResult>,
}

impl Runner {
    pub fn new(chip8: Chip8) -> Self {
        Self::with_config(chip8, RunnerConfig::default())
    }

    pub fn with_config(chip8: Chip8, config: RunnerConfig) -> Self {
        Self {
            chip8,
            config,
            cpu_dt_accumulator: 0.0,
            timer_dt_accumulator: 0.0,
            stopped: None,
        }
    }

    /// Update emulator by delta time, handles both CPU and timer cycles.
    ///
    /// Runs as many CPU cycles and timer updates as needed based on the elapsed time `dt`.
    pub fn update(&mut self, dt: f32) -> RunnerEvent {
        self.update_with_breakpoints(dt, None)
    }

    /// Like `update` but checks for breakpoints after each CPU cycle.
    pub fn update_with_breakpoints(
        &mut self,
        dt: f32,
        breakpoints: Option<&HashSet<u16>>,
    ) -> RunnerEvent {
        if let Some(result) = self.stopped {
            return RunnerEvent::Stopped(result);
        }

        let cpu_time_step = 1.0 / self.config.cpu_hz;
        let timer_time_step = 1.0 / self.config.timer_hz;

        self.cpu_dt_accumulator += dt;
        self.timer_dt_accumulator += dt;

        while self.timer_dt_accumulator >= timer_time_step {
            self.timer_dt_accumulator -= timer_time_step;
            self.chip8.tick();
        }

        let mut redraw = false;
        while self.cpu_dt_accumulator >= cpu_time_step {
            self.cpu_dt_accumulator -= cpu_time_step;

            let step = self.chip8.step();
            redraw |= step.redraw;

            if step.result != StepResult::Continue {
                self.stopped = Some(step.result);
                self.cpu_dt_accumulator = 0.0;
                return RunnerEvent::Stopped(step.result);
            }

            if let Some(breakpoints) = breakpoints
                && breakpoints.contains(&self.chip8.pc)
            {
                // Don't catch up on the time spent paused
                self.cpu_dt_accumulator = 0.0;
                return RunnerEvent::HitBreakpoint;
            }
        }

        RunnerEvent::Running { redraw }
    }

    /// Single-steps regardless of elapsed time, for debuggers.
    pub fn step(&mut self) -> StepResult {
        if let Some(result) = self.stopped {
            return result;
        }
        let result = self.chip8.step().result;
        if result != StepResult::Continue {
            self.stopped = Some(result);
        }
        result
    }

    pub fn stopped(&self) -> Option<StepResult> {
        self.stopped
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.chip8.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed)
    }

    pub fn set_keypad(&mut self, keys: [bool; 16]) {
        self.chip8.set_keypad(keys)
    }

    pub fn config(&self) -> RunnerConfig {
        self.config
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    /// Mutable access to the machine. Editing PC or memory also clears a stopped state.
    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        self.stopped = None;
        &mut self.chip8
    }
}
