use super::{
    Chip8, DISPLAY_X, DISPLAY_Y, GLYPH_SIZE, Opcode, OpcodeAlu, Rgb, STACK_SIZE, Step, StepResult,
};
use crate::u4;

const FLAG: usize = 0xF;

impl Chip8 {
    pub(crate) fn execute(&mut self, opcode: Opcode) -> Step {
        self.pc = self.pc.wrapping_add(2);

        match opcode {
            Opcode::Halt => {
                self.pc = self.pc.wrapping_sub(2);
                return Step::new(StepResult::Halt);
            }
            Opcode::ClearDisplay => {
                let redraw = self.display.iter().any(|&cell| cell != 0);
                self.display.fill(0);
                return Step::drawn(redraw);
            }
            Opcode::Return => {
                if self.sp == 0 {
                    return self.fault(StepResult::StackUnderflow);
                }
                self.sp -= 1;
                self.pc = self.stack[usize::from(self.sp)];
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn.wrapping_add(self.v[0].into());
            }
            Opcode::Call { nnn } => {
                if usize::from(self.sp) == STACK_SIZE {
                    return self.fault(StepResult::StackOverflow);
                }
                self.stack[usize::from(self.sp)] = self.pc;
                self.sp += 1;
                self.pc = nnn;
            }
            Opcode::SkipRegEqualImm { x, kk } => {
                self.skip_if(self.v[x] == kk);
            }
            Opcode::SkipRegNotEqualImm { x, kk } => {
                self.skip_if(self.v[x] != kk);
            }
            Opcode::SkipRegEqualReg { x, y } => {
                self.skip_if(self.v[x] == self.v[y]);
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                self.skip_if(self.v[x] != self.v[y]);
            }
            Opcode::SetRegImm { x, kk } => {
                self.v[x] = kk;
            }
            Opcode::AddRegImm { x, kk } => {
                self.v[x] = self.v[x].wrapping_add(kk);
            }
            Opcode::Alu { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, kk } => {
                let rand_byte = self.rng.next_u32() as u8;
                self.v[x] = rand_byte & kk;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                return self.execute_draw(x, y, n);
            }
            Opcode::SkipIfPressed { x } => {
                self.skip_if(self.keypad[u4::from_low_bits(self.v[x])]);
            }
            Opcode::SkipIfNotPressed { x } => {
                self.skip_if(!self.keypad[u4::from_low_bits(self.v[x])]);
            }
            Opcode::WaitForKey { x } => {
                self.execute_wait_for_key(x);
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::FontChar { x } => {
                let digit = self.v[x];
                if digit > 0xF {
                    self.report(format!(
                        "invalid font digit {digit:#04X} in V{x:X} at {:#05X}",
                        self.pc.wrapping_sub(2)
                    ));
                }
                self.i = u16::from(digit) * GLYPH_SIZE;
            }
            Opcode::Bcd { x } => {
                let value = self.v[x];
                let Some(range) = self.mem_range(self.i, 3) else {
                    return self.fault(StepResult::OutOfBounds);
                };
                self.memory[range].copy_from_slice(&[value / 100, (value / 10) % 10, value % 10]);
            }
            Opcode::StoreRegs { x } => {
                let count = usize::from(x) + 1;
                let Some(range) = self.mem_range(self.i, count) else {
                    return self.fault(StepResult::OutOfBounds);
                };
                self.memory[range].copy_from_slice(&self.v[..count]);
            }
            Opcode::LoadRegs { x } => {
                let count = usize::from(x) + 1;
                let Some(range) = self.mem_range(self.i, count) else {
                    return self.fault(StepResult::OutOfBounds);
                };
                self.v[..count].copy_from_slice(&self.memory[range]);
            }
            Opcode::Unknown(raw) => {
                self.report(format!(
                    "bad opcode {raw:#06X} at {:#05X}",
                    self.pc.wrapping_sub(2)
                ));
            }
        };

        Step::new(StepResult::Continue)
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    /// Leaves PC on the faulting instruction.
    fn fault(&mut self, result: StepResult) -> Step {
        self.pc = self.pc.wrapping_sub(2);
        self.report(format!("{result:?} at {:#05X}", self.pc));
        Step::new(result)
    }

    /// Both outputs come from the operands read up front. Add and the subtractions write VF
    /// before Vx, the shifts write Vx before VF; the order only shows when `x == F`.
    ///
    /// The shifts read Vy, not Vx, as on the COSMAC VIP. Later interpreters shift Vx in
    /// place, so programs written for them only behave the same when `x == y`.
    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeAlu) {
        let (vx, vy) = (self.v[x], self.v[y]);
        match op {
            OpcodeAlu::Set => self.v[x] = vy,
            OpcodeAlu::Or => self.v[x] |= vy,
            OpcodeAlu::And => self.v[x] &= vy,
            OpcodeAlu::Xor => self.v[x] ^= vy,
            OpcodeAlu::Add => {
                let (res, overflow) = vx.overflowing_add(vy);
                self.v[FLAG] = u8::from(overflow);
                self.v[x] = res;
            }
            OpcodeAlu::Sub => {
                self.v[FLAG] = u8::from(vx > vy);
                self.v[x] = vx.wrapping_sub(vy);
            }
            OpcodeAlu::SubReverse => {
                self.v[FLAG] = u8::from(vx <= vy);
                self.v[x] = vy.wrapping_sub(vx);
            }
            OpcodeAlu::ShiftRight => {
                self.v[x] = vy >> 1;
                self.v[FLAG] = vy & 1;
            }
            OpcodeAlu::ShiftLeft => {
                self.v[x] = vy << 1;
                self.v[FLAG] = vy >> 7;
            }
        }
    }

    /// XOR-draws `n` rows from memory[I..], wrapping at the screen edges.
    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Step {
        let Some(sprite) = self.mem_range(self.i, usize::from(n)) else {
            return self.fault(StepResult::OutOfBounds);
        };

        let x_pos = usize::from(self.v[x]);
        let y_pos = usize::from(self.v[y]);
        let color = self.sprite_color();

        self.v[FLAG] = 0;
        let mut redraw = false;

        for (row, addr) in sprite.enumerate() {
            let sprite_byte = self.memory[addr];
            let line = ((y_pos + row) % DISPLAY_Y) * DISPLAY_X;

            for col in 0..8 {
                if sprite_byte & (0x80 >> col) == 0 {
                    continue;
                }

                let cell = &mut self.display[line + (x_pos + col) % DISPLAY_X];
                if *cell != 0 {
                    *cell = 0;
                    self.v[FLAG] = 1;
                } else {
                    *cell = color;
                }
                redraw = true;
            }
        }

        Step::drawn(redraw)
    }

    /// Packed color for sprites drawn by the current instruction, never zero.
    fn sprite_color(&self) -> u32 {
        let color = match &self.overlay {
            Some(overlay) => overlay.sprite_color(self.i),
            None => Rgb::WHITE,
        };
        // a black overlay color still has to read as lit
        color.packed().max(1)
    }

    /// Stores the lowest pressed key in Vx, or repeats this instruction next step.
    fn execute_wait_for_key(&mut self, x: u4) {
        match self.keypad.iter().position(|&pressed| pressed) {
            Some(key) => self.v[x] = key as u8,
            None => self.pc = self.pc.wrapping_sub(2),
        }
    }
}
