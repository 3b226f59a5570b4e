use std::{fs::File, io::BufWriter, path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use clap::{ArgAction, Parser};
use pixels::{Pixels, SurfaceTexture};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, KeyCode, NamedKey},
    window::{Window, WindowId},
};

use chip8_overlay::{
    logging,
    machine::{
        Chip8, DISPLAY_X, DISPLAY_Y, Rgb, Runner, RunnerConfig, RunnerEvent, StepResult,
        WriterSink,
    },
};

/// Mapping from physical keyboard keys to CHIP-8 hex keypad (0x0-0xF).
const KEY_MAP: [KeyCode; 16] = [
    KeyCode::KeyX,   // 0x00
    KeyCode::Digit1, // 0x01
    KeyCode::Digit2, // 0x02
    KeyCode::Digit3, // 0x03
    KeyCode::KeyQ,   // 0x04
    KeyCode::KeyW,   // 0x05
    KeyCode::KeyE,   // 0x06
    KeyCode::KeyA,   // 0x07
    KeyCode::KeyS,   // 0x08
    KeyCode::KeyD,   // 0x09
    KeyCode::KeyZ,   // 0x0A
    KeyCode::KeyC,   // 0x0B
    KeyCode::Digit4, // 0x0C
    KeyCode::KeyR,   // 0x0D
    KeyCode::KeyF,   // 0x0E
    KeyCode::KeyV,   // 0x0F
];

struct App {
    pixels: Option<Pixels<'static>>,
    window: Option<Arc<Window>>,
    scale: u32,

    runner: Runner,
    keys: [bool; 16],
    /// Whether the machine writes to a trace file of its own.
    has_trace_file: bool,
    /// Set when the surface must be repainted even though the machine drew nothing.
    dirty: bool,
    /// Used for delta time calculation.
    last_frame_instant: Instant,

    /// Stores the result of the application to be returned from main.
    exit_result: anyhow::Result<()>,
}

impl App {
    fn new(runner: Runner, scale: u32, has_trace_file: bool) -> Self {
        Self {
            pixels: None,
            window: None,
            scale,
            runner,
            keys: [false; 16],
            has_trace_file,
            dirty: true,
            last_frame_instant: Instant::now(),
            exit_result: Ok(()),
        }
    }

    fn process_display(&mut self) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };
        let chip8 = self.runner.chip8_ref();
        let background = chip8.background();

        for (cell, pxl) in chip8
            .framebuffer()
            .iter()
            .zip(pixels.frame_mut().chunks_exact_mut(4))
        {
            let color = if *cell == 0 {
                background
            } else {
                Rgb::from_packed(*cell)
            };
            pxl.copy_from_slice(&[color.r, color.g, color.b, 0xff]);
        }
    }

    /// Writes the machine state where the user will find it, then turns the stop into an error.
    fn report_fault(&mut self, result: StepResult) -> anyhow::Error {
        let chip8 = self.runner.chip8_mut();
        if self.has_trace_file {
            chip8.dump();
        } else {
            chip8.dump_to(&mut WriterSink::new(std::io::stderr()));
        }
        anyhow::anyhow!("machine stopped with {result:?} at {:#05X}", chip8.pc())
    }

    fn try_resumed(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = {
            let size = LogicalSize::new(
                DISPLAY_X as u32 * self.scale,
                DISPLAY_Y as u32 * self.scale,
            );
            let min_size = LogicalSize::new(DISPLAY_X as u32, DISPLAY_Y as u32);

            Arc::new(
                event_loop
                    .create_window(
                        Window::default_attributes()
                            .with_title("chip8-overlay")
                            .with_inner_size(size)
                            .with_min_inner_size(min_size),
                    )
                    .context("Failed to create window")?,
            )
        };

        self.window = Some(window.clone());
        self.pixels = {
            let window_size = window.inner_size();
            let surface_texture =
                SurfaceTexture::new(window_size.width, window_size.height, window.clone());

            let mut pixels = Pixels::new(DISPLAY_X as u32, DISPLAY_Y as u32, surface_texture)
                .context("Failed to create pixels surface")?;
            let Rgb { r, g, b } = self.runner.chip8_ref().background();
            pixels.clear_color(pixels::wgpu::Color {
                r: f64::from(r) / 255.0,
                g: f64::from(g) / 255.0,
                b: f64::from(b) / 255.0,
                a: 1.0,
            });

            window.request_redraw();
            Some(pixels)
        };

        // Avoid large dt on first frame
        self.last_frame_instant = Instant::now();
        self.dirty = true;
        Ok(())
    }

    fn try_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> anyhow::Result<()> {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(pixels) = self.pixels.as_mut() {
                    pixels
                        .resize_surface(size.width, size.height)
                        .context("Failed to resize pixels surface")?;
                }
                self.dirty = true;
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - self.last_frame_instant).as_secs_f32();
                self.last_frame_instant = now;

                let redraw = match self.runner.update(dt) {
                    RunnerEvent::Running { redraw } => redraw,
                    RunnerEvent::HitBreakpoint => false,
                    RunnerEvent::Stopped(result) if result.is_fault() => {
                        return Err(self.report_fault(result));
                    }
                    RunnerEvent::Stopped(_) => {
                        tracing::info!("program halted");
                        event_loop.exit();
                        return Ok(());
                    }
                };

                if redraw || self.dirty {
                    self.process_display();
                    if let Some(pixels) = self.pixels.as_ref() {
                        pixels.render().context("Pixels render error")?;
                    }
                    self.dirty = false;
                }

                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(key) = KEY_MAP.iter().position(|&k| k == event.physical_key) {
                    self.keys[key] = event.state == ElementState::Pressed;
                    self.runner.set_keypad(self.keys);
                }
            }

            _ => (),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.try_resumed(event_loop) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.try_window_event(event_loop, event) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }
}

/// CHIP-8 emulator with color overlay support.
///
/// Keys 1-4, Q-R, A-F, Z-V map to CHIP-8 keys.
/// Escape is used to exit the emulator.
/// A `.col` file next to the ROM is picked up as its color overlay.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Instructions per second
    #[arg(long, default_value_t = 700.0)]
    hz: f32,

    /// Write an instruction trace, and the state dump on a fault, to this file
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Window scale factor
    #[arg(long, default_value_t = 10)]
    scale: u32,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.verbose).context("Failed to initialize logging")?;
    anyhow::ensure!(args.hz > 0.0, "--hz must be positive");

    let mut chip8 = match &args.trace {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create trace file {}", path.display()))?;
            let mut chip8 = Chip8::with_sink(Box::new(WriterSink::new(BufWriter::new(file))));
            chip8.set_tracing(true);
            chip8
        }
        None => Chip8::new(),
    };
    chip8
        .load_file(&args.rom_path)
        .context("Failed to load ROM")?;

    let config = RunnerConfig {
        cpu_hz: args.hz,
        ..RunnerConfig::default()
    };
    let runner = Runner::with_config(chip8, config);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(runner, args.scale, args.trace.is_some());
    event_loop
        .run_app(&mut app)
        .context("Error occurred during event loop execution")?;

    // Return the result captured during the event loop
    app.exit_result
}
