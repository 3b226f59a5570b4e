use std::io::Write;

use super::{Chip8, MEMORY_SIZE};

/// Line-oriented output for the instruction trace and the diagnostic dump.
///
/// The machine never opens or closes anything itself; the host decides where lines go.
#[cfg_attr(test, mockall::automock)]
pub trait TraceSink {
    fn write_line(&mut self, line: &str);
}

/// Collects lines in memory.
impl TraceSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

/// Writes each line, newline terminated, to any `io::Write`.
pub struct WriterSink<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for WriterSink<W> {
    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.writer, "{line}") {
            // report once, a broken sink would otherwise flood the log
            if !self.failed {
                tracing::warn!("trace sink write failed: {e}");
                self.failed = true;
            }
        }
    }
}

/// Forwards lines to the `tracing` subscriber at debug level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn write_line(&mut self, line: &str) {
        tracing::debug!(target: "chip8_overlay::trace", "{line}");
    }
}

const DUMP_ROW: usize = 16;

impl Chip8 {
    /// Writes registers, PC, I, SP, timers, the overlay table, and a full memory hex dump.
    pub fn dump_to(&self, sink: &mut dyn TraceSink) {
        sink.write_line("=== machine state ===");
        sink.write_line(&format!(
            "PC: {:#05X}  I: {:#05X}  SP: {}",
            self.pc, self.i, self.sp
        ));
        sink.write_line(&format!(
            "DT: {:#04X}  ST: {:#04X}  ops: {}",
            self.delay_timer, self.sound_timer, self.op_count
        ));

        for (idx, regs) in self.v.chunks(4).enumerate() {
            let line = regs
                .iter()
                .enumerate()
                .map(|(j, value)| format!("V{:X}: {value:#04X}", idx * 4 + j))
                .collect::<Vec<_>>()
                .join("  ");
            sink.write_line(&line);
        }

        let stack = self.stack[..usize::from(self.sp)]
            .iter()
            .map(|addr| format!("{addr:#05X}"))
            .collect::<Vec<_>>();
        sink.write_line(&format!("Stack: [{}]", stack.join(", ")));

        match &self.overlay {
            Some(overlay) => {
                sink.write_line(&format!("Overlay: {} records", overlay.entries().len()));
                for (idx, entry) in overlay.entries().iter().enumerate() {
                    sink.write_line(&format!(
                        "  {idx:2}: {:#05X} -> #{:06X}",
                        entry.address,
                        entry.color.packed()
                    ));
                }
            }
            None => sink.write_line("Overlay: disabled"),
        }

        sink.write_line("Memory:");
        for offset in (0..MEMORY_SIZE).step_by(DUMP_ROW) {
            let bytes = self.memory[offset..offset + DUMP_ROW]
                .iter()
                .map(|byte| format!("{byte:02X}"))
                .collect::<Vec<_>>();
            sink.write_line(&format!("{offset:03X}: {}", bytes.join(" ")));
        }
    }

    /// Dumps the machine state to its own sink, if it has one.
    pub fn dump(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            self.dump_to(sink.as_mut());
            self.sink = Some(sink);
        }
    }

    pub(crate) fn trace(&mut self, line: impl FnOnce() -> String) {
        if self.tracing
            && let Some(sink) = self.sink.as_mut()
        {
            sink.write_line(&line());
        }
    }

    /// Reports a recoverable anomaly to both the sink and the log.
    pub(crate) fn report(&mut self, message: String) {
        tracing::warn!("{message}");
        if let Some(sink) = self.sink.as_mut() {
            sink.write_line(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{ColorOverlay, OverlayEntry, Rgb};

    #[test]
    fn dump_contains_every_section() {
        let mut chip8 = Chip8::new();
        chip8.load(&[0x61, 0x2A]).unwrap();
        chip8.step();
        chip8
            .set_overlay(Some(
                ColorOverlay::new(vec![
                    OverlayEntry {
                        address: 0,
                        color: Rgb::new(0x10, 0x20, 0x30),
                    },
                    OverlayEntry {
                        address: 0,
                        color: Rgb::WHITE,
                    },
                ])
                .unwrap(),
            ));

        let mut lines: Vec<String> = Vec::new();
        chip8.dump_to(&mut lines);

        assert!(lines.iter().any(|l| l == "PC: 0x202  I: 0x000  SP: 0"));
        assert!(lines.iter().any(|l| l.starts_with("V0: 0x00  V1: 0x2A")));
        assert!(lines.iter().any(|l| l == "Overlay: 2 records"));
        assert!(lines.iter().any(|l| l == "   0: 0x000 -> #102030"));
        assert!(lines.iter().any(|l| l.starts_with("200: 61 2A 00")));
        assert!(lines.iter().any(|l| l.starts_with("FF0: ")));
        // header + 2 state lines + 4 register rows + stack + overlay(3) + "Memory:" + 256 rows
        assert_eq!(lines.len(), 1 + 2 + 4 + 1 + 3 + 1 + MEMORY_SIZE / DUMP_ROW);
    }

    #[test]
    fn dump_uses_injected_sink() {
        let mut sink = MockTraceSink::new();
        sink.expect_write_line()
            .withf(|line: &str| line == "Overlay: disabled")
            .times(1)
            .return_const(());
        sink.expect_write_line().return_const(());

        let mut chip8 = Chip8::with_sink(Box::new(sink));
        chip8.dump();
    }

    #[test]
    fn writer_sink_terminates_lines() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_line("one");
        sink.write_line("two");
        assert_eq!(sink.into_inner(), b"one\ntwo\n");
    }
}
