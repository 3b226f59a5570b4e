use std::fmt;

use crate::u4;

/// Decoded instructions.
///
/// The fields (x, y, n, kk, nnn) correspond to the operands encoded in the opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// 0000 - Stop the program.
    Halt,
    /// 00E0 - Clear the display.
    ClearDisplay,
    /// 00EE - Return from a subroutine.
    Return,

    /// 1nnn - Jump to location nnn.
    Jump { nnn: u16 },
    /// Bnnn - Jump to location nnn + V0.
    JumpWithOffset { nnn: u16 },
    /// 2nnn - Call subroutine at nnn.
    Call { nnn: u16 },

    /// 3xkk - Skip next instruction if Vx == kk.
    SkipRegEqualImm { x: u4, kk: u8 },
    /// 4xkk - Skip next instruction if Vx != kk.
    SkipRegNotEqualImm { x: u4, kk: u8 },
    /// 5xy0 - Skip next instruction if Vx == Vy.
    SkipRegEqualReg { x: u4, y: u4 },
    /// 9xy0 - Skip next instruction if Vx != Vy.
    SkipRegNotEqualReg { x: u4, y: u4 },

    /// 6xkk - Set Vx = kk.
    SetRegImm { x: u4, kk: u8 },
    /// 7xkk - Set Vx = Vx + kk, no carry.
    AddRegImm { x: u4, kk: u8 },
    /// Annn - Set I = nnn.
    SetIndexImm { nnn: u16 },
    /// Fx1E - Set I = I + Vx.
    AddIndexReg { x: u4 },

    /// 8xyN - ALU operations.
    Alu { x: u4, y: u4, op: OpcodeAlu },
    /// Cxkk - Set Vx = random byte AND kk.
    Random { x: u4, kk: u8 },

    /// Dxyn - Display n-byte sprite starting at I at (Vx, Vy).
    Draw { x: u4, y: u4, n: u4 },

    /// Ex9E - Skip next instruction if key Vx is pressed.
    SkipIfPressed { x: u4 },
    /// ExA1 - Skip next instruction if key Vx is not pressed.
    SkipIfNotPressed { x: u4 },
    /// Fx0A - Wait for a key press, store the key in Vx.
    WaitForKey { x: u4 },

    /// Fx07 - Set Vx = delay timer.
    ReadDelayTimer { x: u4 },
    /// Fx15 - Set delay timer = Vx.
    SetDelayTimer { x: u4 },
    /// Fx18 - Set sound timer = Vx.
    SetSoundTimer { x: u4 },

    /// Fx29 - Set I = location of the glyph for digit Vx.
    FontChar { x: u4 },
    /// Fx33 - Store BCD of Vx at I, I+1, I+2.
    Bcd { x: u4 },
    /// Fx55 - Store V0..=Vx at I.
    StoreRegs { x: u4 },
    /// Fx65 - Load V0..=Vx from I.
    LoadRegs { x: u4 },

    /// Any word that matches no instruction.
    Unknown(u16),
}

/// ALU operations for the 8xyN instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpcodeAlu {
    /// 8xy0 - Vx = Vy
    Set,
    /// 8xy1 - Vx = Vx OR Vy
    Or,
    /// 8xy2 - Vx = Vx AND Vy
    And,
    /// 8xy3 - Vx = Vx XOR Vy
    Xor,
    /// 8xy4 - Vx = Vx + Vy, VF = carry
    Add,
    /// 8xy5 - Vx = Vx - Vy, VF = Vx > Vy
    Sub,
    /// 8xy6 - Vx = Vy >> 1, VF = old bit 0 of Vy
    ShiftRight,
    /// 8xy7 - Vx = Vy - Vx, VF = !(Vx > Vy)
    SubReverse,
    /// 8xyE - Vx = Vy << 1, VF = old bit 7 of Vy
    ShiftLeft,
}

impl Opcode {
    /// Decode a 16-bit raw opcode into an `Opcode` enum variant.
    pub fn decode(opcode: u16) -> Self {
        let nibble = (
            ((opcode & 0xF000) >> 12) as u8,
            ((opcode & 0x0F00) >> 8) as u8,
            ((opcode & 0x00F0) >> 4) as u8,
            (opcode & 0x000F) as u8,
        );

        let x = u4::new(nibble.1);
        let y = u4::new(nibble.2);
        let n = u4::new(nibble.3);
        let kk = (opcode & 0x00FF) as u8;
        let nnn = opcode & 0x0FFF;

        match nibble {
            (0x0, 0x0, 0x0, 0x0) => Opcode::Halt,
            (0x0, 0x0, 0xE, 0x0) => Opcode::ClearDisplay,
            (0x0, 0x0, 0xE, 0xE) => Opcode::Return,
            (0x1, _, _, _) => Opcode::Jump { nnn },
            (0x2, _, _, _) => Opcode::Call { nnn },
            (0x3, _, _, _) => Opcode::SkipRegEqualImm { x, kk },
            (0x4, _, _, _) => Opcode::SkipRegNotEqualImm { x, kk },
            (0x5, _, _, 0x0) => Opcode::SkipRegEqualReg { x, y },
            (0x6, _, _, _) => Opcode::SetRegImm { x, kk },
            (0x7, _, _, _) => Opcode::AddRegImm { x, kk },
            (0x8, _, _, _) => Opcode::Alu {
                x,
                y,
                op: match nibble.3 {
                    0x0 => OpcodeAlu::Set,
                    0x1 => OpcodeAlu::Or,
                    0x2 => OpcodeAlu::And,
                    0x3 => OpcodeAlu::Xor,
                    0x4 => OpcodeAlu::Add,
                    0x5 => OpcodeAlu::Sub,
                    0x6 => OpcodeAlu::ShiftRight,
                    0x7 => OpcodeAlu::SubReverse,
                    0xE => OpcodeAlu::ShiftLeft,
                    _ => return Opcode::Unknown(opcode),
                },
            },
            (0x9, _, _, 0x0) => Opcode::SkipRegNotEqualReg { x, y },
            (0xA, _, _, _) => Opcode::SetIndexImm { nnn },
            (0xB, _, _, _) => Opcode::JumpWithOffset { nnn },
            (0xC, _, _, _) => Opcode::Random { x, kk },
            (0xD, _, _, _) => Opcode::Draw { x, y, n },
            (0xE, _, 0x9, 0xE) => Opcode::SkipIfPressed { x },
            (0xE, _, 0xA, 0x1) => Opcode::SkipIfNotPressed { x },
            (0xF, _, 0x0, 0x7) => Opcode::ReadDelayTimer { x },
            (0xF, _, 0x0, 0xA) => Opcode::WaitForKey { x },
            (0xF, _, 0x1, 0x5) => Opcode::SetDelayTimer { x },
            (0xF, _, 0x1, 0x8) => Opcode::SetSoundTimer { x },
            (0xF, _, 0x1, 0xE) => Opcode::AddIndexReg { x },
            (0xF, _, 0x2, 0x9) => Opcode::FontChar { x },
            (0xF, _, 0x3, 0x3) => Opcode::Bcd { x },
            (0xF, _, 0x5, 0x5) => Opcode::StoreRegs { x },
            (0xF, _, 0x6, 0x5) => Opcode::LoadRegs { x },

            _ => Opcode::Unknown(opcode),
        }
    }
}

/// Assembly-style mnemonic, used by the disassembler.
impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Opcode::Halt => write!(f, "HALT"),
            Opcode::ClearDisplay => write!(f, "CLS"),
            Opcode::Return => write!(f, "RET"),
            Opcode::Jump { nnn } => write!(f, "JP {nnn:03X}"),
            Opcode::JumpWithOffset { nnn } => write!(f, "JP V0, {nnn:03X}"),
            Opcode::Call { nnn } => write!(f, "CALL {nnn:03X}"),
            Opcode::SkipRegEqualImm { x, kk } => write!(f, "SE V{x:X}, {kk:02X}"),
            Opcode::SkipRegNotEqualImm { x, kk } => write!(f, "SNE V{x:X}, {kk:02X}"),
            Opcode::SkipRegEqualReg { x, y } => write!(f, "SE V{x:X}, V{y:X}"),
            Opcode::SkipRegNotEqualReg { x, y } => write!(f, "SNE V{x:X}, V{y:X}"),
            Opcode::SetRegImm { x, kk } => write!(f, "LD V{x:X}, {kk:02X}"),
            Opcode::AddRegImm { x, kk } => write!(f, "ADD V{x:X}, {kk:02X}"),
            Opcode::SetIndexImm { nnn } => write!(f, "LD I, {nnn:03X}"),
            Opcode::AddIndexReg { x } => write!(f, "ADD I, V{x:X}"),
            Opcode::Alu { x, y, op } => {
                let name = match op {
                    OpcodeAlu::Set => "LD",
                    OpcodeAlu::Or => "OR",
                    OpcodeAlu::And => "AND",
                    OpcodeAlu::Xor => "XOR",
                    OpcodeAlu::Add => "ADD",
                    OpcodeAlu::Sub => "SUB",
                    OpcodeAlu::ShiftRight => "SHR",
                    OpcodeAlu::SubReverse => "SUBN",
                    OpcodeAlu::ShiftLeft => "SHL",
                };
                write!(f, "{name} V{x:X}, V{y:X}")
            }
            Opcode::Random { x, kk } => write!(f, "RND V{x:X}, {kk:02X}"),
            Opcode::Draw { x, y, n } => write!(f, "DRW V{x:X}, V{y:X}, {n:X}"),
            Opcode::SkipIfPressed { x } => write!(f, "SKP V{x:X}"),
            Opcode::SkipIfNotPressed { x } => write!(f, "SKNP V{x:X}"),
            Opcode::WaitForKey { x } => write!(f, "LD V{x:X}, K"),
            Opcode::ReadDelayTimer { x } => write!(f, "LD V{x:X}, DT"),
            Opcode::SetDelayTimer { x } => write!(f, "LD DT, V{x:X}"),
            Opcode::SetSoundTimer { x } => write!(f, "LD ST, V{x:X}"),
            Opcode::FontChar { x } => write!(f, "LD F, V{x:X}"),
            Opcode::Bcd { x } => write!(f, "LD B, V{x:X}"),
            Opcode::StoreRegs { x } => write!(f, "LD [I], V{x:X}"),
            Opcode::LoadRegs { x } => write!(f, "LD V{x:X}, [I]"),
            Opcode::Unknown(raw) => write!(f, "??? {raw:04X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_sub_dispatched_families() {
        assert_eq!(Opcode::decode(0x0000), Opcode::Halt);
        assert_eq!(Opcode::decode(0x00E0), Opcode::ClearDisplay);
        assert_eq!(Opcode::decode(0x00EE), Opcode::Return);
        assert_eq!(
            Opcode::decode(0x8AB6),
            Opcode::Alu {
                x: u4::new(0xA),
                y: u4::new(0xB),
                op: OpcodeAlu::ShiftRight
            }
        );
        assert_eq!(
            Opcode::decode(0xE39E),
            Opcode::SkipIfPressed { x: u4::new(3) }
        );
        assert_eq!(Opcode::decode(0xF265), Opcode::LoadRegs { x: u4::new(2) });
    }

    #[test]
    fn unmatched_patterns_are_unknown() {
        for raw in [0x00E1, 0x0123, 0x5121, 0x8128, 0x912F, 0xE1FF, 0xF1FF] {
            assert_eq!(Opcode::decode(raw), Opcode::Unknown(raw), "{raw:#06X}");
        }
    }

    #[test]
    fn mnemonics() {
        assert_eq!(Opcode::decode(0xD125).to_string(), "DRW V1, V2, 5");
        assert_eq!(Opcode::decode(0x6A0F).to_string(), "LD VA, 0F");
        assert_eq!(Opcode::decode(0x8AB6).to_string(), "SHR VA, VB");
        assert_eq!(Opcode::decode(0x2ABC).to_string(), "CALL ABC");
        assert_eq!(Opcode::decode(0x0123).to_string(), "??? 0123");
    }
}
