use std::{
    collections::HashSet,
    fs::File,
    io::BufWriter,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget, Wrap},
};

use chip8_overlay::{
    debugger::{Cli, Command, CommandResult, DisasmLine, Executor},
    logging,
    machine::{
        Chip8, DISPLAY_X, DISPLAY_Y, MEMORY_SIZE, Opcode, Rgb, Runner, RunnerConfig, RunnerEvent,
        TracingSink, WriterSink,
    },
};

const KEY_MAP: [char; 16] = [
    'x', '1', '2', '3', // 0x0-0x3
    'q', 'w', 'e', 'a', // 0x4-0x7
    's', 'd', 'z', 'c', // 0x8-0xB
    '4', 'r', 'f', 'v', // 0xC-0xF
];

/// Keypad drawn in its physical COSMAC VIP arrangement.
const KEYPAD_LAYOUT: [[usize; 4]; 4] = [
    [0x1, 0x2, 0x3, 0xC],
    [0x4, 0x5, 0x6, 0xD],
    [0x7, 0x8, 0x9, 0xE],
    [0xA, 0x0, 0xB, 0xF],
];

const SIDE_WIDTH: u16 = 30;

/// Terminals on Linux don't report key releases, so a key counts as held until it has not
/// repeated for this long.
const KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(50);

/// Pressed keys with the instant each was last seen.
#[derive(Default)]
struct KeyLatch {
    pressed_at: [Option<Instant>; 16],
}

impl KeyLatch {
    fn press(&mut self, key: usize, now: Instant) {
        self.pressed_at[key] = Some(now);
    }

    /// Releases keys that timed out. Returns true if any key changed.
    fn expire(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for slot in &mut self.pressed_at {
            if let Some(at) = slot
                && now.duration_since(*at) > KEY_RELEASE_TIMEOUT
            {
                *slot = None;
                changed = true;
            }
        }
        changed
    }

    fn keypad(&self) -> [bool; 16] {
        self.pressed_at.map(|at| at.is_some())
    }
}

struct App {
    executor: Executor,
    keys: KeyLatch,
    input: String,
    output: String,
    should_quit: bool,
    last_tick: Instant,
    last_command: Option<Command>,
}

impl App {
    fn new(runner: Runner) -> Self {
        Self {
            executor: Executor::new(runner),
            keys: KeyLatch::default(),
            input: String::new(),
            output: String::from("Type a command, e.g. `step`, `run`, `b s 0x20A`, `disasm`"),
            should_quit: false,
            last_tick: Instant::now(),
            last_command: None,
        }
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            let dt = self.last_tick.elapsed().as_secs_f32();
            self.last_tick = Instant::now();

            match self.executor.poll(dt) {
                RunnerEvent::HitBreakpoint => {
                    self.output = format!("Hit breakpoint at {:03X}", self.executor.chip8().pc());
                }
                RunnerEvent::Stopped(result) => {
                    self.output = format!(
                        "Stopped: {result:?} at {:03X} (`dump` for full state)",
                        self.executor.chip8().pc()
                    );
                }
                RunnerEvent::Running { .. } => {}
            }

            terminal.draw(|frame| self.draw(frame))?;

            if self.keys.expire(Instant::now()) {
                self.push_keypad();
            }

            if event::poll(Duration::from_millis(16))?
                && let Event::Key(key) = event::read()?
            {
                self.handle_key_event(key);
            }
        }

        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn push_keypad(&mut self) {
        let keypad = self.keys.keypad();
        self.executor.runner_mut().set_keypad(keypad);
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        // While running, the keyboard belongs to the program; Esc returns to the prompt
        if self.executor.is_running() {
            if key.code == KeyCode::Esc {
                self.executor.pause();
                self.output = "Paused".to_string();
            } else if let KeyCode::Char(c) = key.code
                && let Some(idx) = KEY_MAP.iter().position(|&k| k == c.to_ascii_lowercase())
            {
                self.keys.press(idx, Instant::now());
                self.push_keypad();
            }
            return;
        }

        if key.kind != KeyEventKind::Press {
            return;
        }
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Enter => self.submit(),
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            _ => {}
        }
    }

    /// Runs the typed command. An empty line repeats the previous one.
    fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);

        let command = if line.trim().is_empty() {
            match self.last_command.clone() {
                Some(command) => command,
                None => return,
            }
        } else {
            match Cli::try_parse_from(line.split_whitespace()) {
                Ok(cli) => cli.command,
                Err(e) => {
                    self.output = e.to_string();
                    self.last_command = None;
                    return;
                }
            }
        };

        self.last_command = Some(command.clone());
        self.output = match self.executor.execute(command) {
            Ok(CommandResult::Quit) => {
                self.should_quit = true;
                return;
            }
            Ok(result) => describe(
                result,
                self.executor.chip8().pc(),
                self.executor.breakpoints(),
            ),
            Err(e) => e.to_string(),
        };
    }
}

/// Human-readable text for a command's result.
fn describe(result: CommandResult, pc: u16, breakpoints: &HashSet<u16>) -> String {
    match result {
        CommandResult::Ok | CommandResult::Quit => "OK".to_string(),
        CommandResult::Breakpoints(list) if list.is_empty() => "No breakpoints".to_string(),
        CommandResult::Breakpoints(list) => {
            let list: Vec<String> = list.iter().map(|addr| format!("{addr:03X}")).collect();
            format!("Breakpoints: {}", list.join(" "))
        }
        CommandResult::MemDump { offset, data } => data
            .chunks(16)
            .zip((usize::from(offset)..).step_by(16))
            .map(|(row, addr)| {
                let bytes: Vec<String> = row.iter().map(|b| format!("{b:02X}")).collect();
                format!("{addr:03X}: {}", bytes.join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        CommandResult::Disasm(lines) => lines
            .iter()
            .map(|line| disasm_text(line, pc, breakpoints))
            .collect::<Vec<_>>()
            .join("\n"),
        CommandResult::Dump(lines) => lines.join("\n"),
    }
}

fn disasm_text(line: &DisasmLine, pc: u16, breakpoints: &HashSet<u16>) -> String {
    let marker = match (line.address == pc, breakpoints.contains(&line.address)) {
        (true, _) => '>',
        (false, true) => '*',
        (false, false) => ' ',
    };
    format!(
        "{marker}{:03X}  {:04X}  {}",
        line.address, line.raw, line.opcode
    )
}

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + SIDE_WIDTH;
        const MIN_HEIGHT: u16 = DISPLAY_Y as u16 + 2 + 3 + 3;
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            let center = area.centered(Constraint::Length(45), Constraint::Length(3));
            Paragraph::new(format!("Terminal is too small ({MIN_WIDTH}x{MIN_HEIGHT} min)"))
                .style(Style::default().fg(Color::Red))
                .alignment(Alignment::Center)
                .block(Block::bordered())
                .render(center, buf);
            return;
        }

        let [main, side] = Layout::horizontal([
            Constraint::Min(DISPLAY_X as u16 + 2),
            Constraint::Length(SIDE_WIDTH),
        ])
        .areas(area);
        let [screen, output, prompt] = Layout::vertical([
            Constraint::Length(DISPLAY_Y as u16 + 2),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .areas(main);
        let [registers, code, bottom] = Layout::vertical([
            Constraint::Length(9),
            Constraint::Min(5),
            Constraint::Length(6),
        ])
        .areas(side);
        let [stack, keypad] =
            Layout::horizontal([Constraint::Min(10), Constraint::Length(11)]).areas(bottom);

        self.render_screen(screen, buf);
        self.render_registers(registers, buf);
        self.render_code(code, buf);
        self.render_stack(stack, buf);
        self.render_keypad(keypad, buf);

        Paragraph::new(self.output.as_str())
            .wrap(Wrap { trim: false })
            .block(Block::bordered().title(" Output "))
            .render(output, buf);
        Paragraph::new(format!("> {}", self.input))
            .block(Block::bordered().title(" Command "))
            .render(prompt, buf);
    }
}

impl App {
    fn render_screen(&self, area: Rect, buf: &mut Buffer) {
        let chip8 = self.executor.chip8();
        let background = Style::default().bg(to_color(chip8.background()));

        let rows: Vec<Line> = chip8
            .framebuffer()
            .chunks_exact(DISPLAY_X)
            .map(|row| {
                row.iter()
                    .map(|&cell| match cell {
                        0 => Span::styled(" ", background),
                        lit => Span::styled("█", background.fg(to_color(Rgb::from_packed(lit)))),
                    })
                    .collect()
            })
            .collect();

        let (state, color) = match (self.executor.is_running(), chip8.is_tracing()) {
            (true, _) => (" RUNNING ", Color::Green),
            (false, true) => (" PAUSED, tracing ", Color::Yellow),
            (false, false) => (" PAUSED ", Color::Yellow),
        };
        let overlay = match chip8.overlay() {
            Some(overlay) => format!(" overlay: {} records ", overlay.entries().len()),
            None => " no overlay ".to_string(),
        };

        Paragraph::new(rows)
            .alignment(Alignment::Center)
            .block(
                Block::bordered()
                    .title(Line::from(" Display ").left_aligned())
                    .title(Line::styled(state, Style::default().fg(color)).centered())
                    .title(Line::from(overlay).right_aligned()),
            )
            .render(area, buf);
    }

    fn render_registers(&self, area: Rect, buf: &mut Buffer) {
        let chip8 = self.executor.chip8();
        let mut lines = vec![
            Line::from(format!(
                "PC {:03X}  I {:03X}  SP {:X}",
                chip8.pc(),
                chip8.index(),
                chip8.stack().len()
            )),
            Line::from(format!(
                "DT {:02X}   ST {:02X}",
                chip8.delay_timer(),
                chip8.sound_timer()
            )),
            Line::from(format!("ops {}", chip8.op_count())),
        ];
        lines.extend(chip8.registers().chunks(4).enumerate().map(|(row, regs)| {
            let cells: Vec<String> = regs
                .iter()
                .enumerate()
                .map(|(col, value)| format!("V{:X} {value:02X}", row * 4 + col))
                .collect();
            Line::from(cells.join(" "))
        }));

        Paragraph::new(lines)
            .block(Block::bordered().title(" Registers "))
            .render(area, buf);
    }

    /// Disassembly starting two instructions before PC.
    fn render_code(&self, area: Rect, buf: &mut Buffer) {
        let chip8 = self.executor.chip8();
        let pc = chip8.pc();
        let rows = usize::from(area.height.saturating_sub(2));
        let start = pc.saturating_sub(4);

        let lines: Vec<Line> = (start..)
            .step_by(2)
            .take(rows)
            .take_while(|&addr| usize::from(addr) + 1 < MEMORY_SIZE)
            .map(|address| {
                let at = usize::from(address);
                let raw = u16::from_be_bytes([chip8.memory()[at], chip8.memory()[at + 1]]);
                let line = DisasmLine {
                    address,
                    raw,
                    opcode: Opcode::decode(raw),
                };
                let text = disasm_text(&line, pc, self.executor.breakpoints());
                if address == pc {
                    Line::styled(text, Style::default().add_modifier(Modifier::REVERSED))
                } else {
                    Line::from(text)
                }
            })
            .collect();

        Paragraph::new(lines)
            .block(Block::bordered().title(" Code "))
            .render(area, buf);
    }

    fn render_stack(&self, area: Rect, buf: &mut Buffer) {
        let max_lines = usize::from(area.height.saturating_sub(2));
        let stack = self.executor.chip8().stack();

        // newest frames on top
        let mut lines: Vec<Line> = stack
            .iter()
            .enumerate()
            .rev()
            .map(|(depth, addr)| Line::from(format!("{depth:X} {addr:03X}")))
            .collect();
        if lines.is_empty() {
            lines.push(Line::from("empty"));
        }
        if lines.len() > max_lines && max_lines > 0 {
            lines.truncate(max_lines - 1);
            lines.push(Line::from("..."));
        }

        Paragraph::new(lines)
            .block(Block::bordered().title(" Stack "))
            .render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        let keypad = self.executor.chip8().keypad();
        let held = Style::default().fg(Color::Black).bg(Color::White);

        let lines: Vec<Line> = KEYPAD_LAYOUT
            .iter()
            .map(|row| {
                let spans: Vec<Span> = row
                    .iter()
                    .map(|&key| {
                        let style = if keypad[key] { held } else { Style::default() };
                        Span::styled(format!("{key:X} "), style)
                    })
                    .collect();
                Line::from(spans)
            })
            .collect();

        Paragraph::new(lines)
            .block(Block::bordered().title(" Keys "))
            .render(area, buf);
    }
}

/// Terminal debugger for CHIP-8 programs with color overlays
///
/// Logs go to stderr; redirect it (`2>dbg.log`) when using `-v`.
#[derive(Parser)]
#[command(about)]
struct Args {
    /// Path to the ROM file to load; a `.col` file beside it is used as the color overlay
    rom_path: PathBuf,

    /// Instructions per second while running
    #[arg(long, default_value_t = 700.0)]
    hz: f32,

    /// File that receives the instruction trace (`trace on`)
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.verbose > 0 {
        logging::init(args.verbose).context("Failed to initialize logging")?;
    }
    anyhow::ensure!(args.hz > 0.0, "--hz must be positive");

    let mut chip8 = match &args.trace {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create trace file {}", path.display()))?;
            Chip8::with_sink(Box::new(WriterSink::new(BufWriter::new(file))))
        }
        // trace lines are logged at debug level, visible from -vv
        None if args.verbose > 1 => Chip8::with_sink(Box::new(TracingSink)),
        None => Chip8::new(),
    };
    chip8
        .load_file(&args.rom_path)
        .context("Failed to load ROM")?;

    let config = RunnerConfig {
        cpu_hz: args.hz,
        ..RunnerConfig::default()
    };
    let mut app = App::new(Runner::with_config(chip8, config));

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}
