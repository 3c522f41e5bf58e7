use std::{path::PathBuf, time::Duration};

use clap::Parser;
use gametime::{Clock, FrequencyNumExt as _, FrequencyTicker, TimeStamp};
use geck::{Extent2, PipelineDesc, RenderContext, ShaderSource, ShaderStage, StageSource};
use miette::IntoDiagnostic as _;
use winit::{
    dpi::{LogicalSize, PhysicalSize},
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use crate::{
    config::DemoConfig,
    game::Game,
    renderer::{FrameStatus, RectConstants, Renderer},
};

mod config;
mod game;
mod renderer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Demo config file.
    #[arg(default_value = "geck.toml")]
    config: PathBuf,
}

const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];

macro_rules! ok_log_err {
    ($result:expr) => {
        match $result {
            Ok(ok) => Some(ok),
            Err(err) => {
                tracing::error!("{err:?}");
                None
            }
        }
    };
}

fn install_tracing_subscriber() {
    use tracing_subscriber::layer::SubscriberExt as _;
    if let Err(err) = tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish()
            .with(tracing_error::ErrorLayer::default()),
    ) {
        panic!("Failed to install tracing subscriber: {}", err);
    }
}

fn extent(size: PhysicalSize<u32>) -> Extent2 {
    Extent2::new(size.width, size.height)
}

/// Keys currently held, mapped to a direction.
#[derive(Default)]
struct Keys {
    left: bool,
    right: bool,
    up: bool,
    down: bool,
}

impl Keys {
    fn set(&mut self, key: VirtualKeyCode, pressed: bool) -> bool {
        let slot = match key {
            VirtualKeyCode::Left | VirtualKeyCode::A => &mut self.left,
            VirtualKeyCode::Right | VirtualKeyCode::D => &mut self.right,
            VirtualKeyCode::Up | VirtualKeyCode::W => &mut self.up,
            VirtualKeyCode::Down | VirtualKeyCode::S => &mut self.down,
            _ => return false,
        };
        *slot = pressed;
        true
    }

    fn direction(&self) -> [f32; 2] {
        let axis = |neg: bool, pos: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
        [axis(self.left, self.right), axis(self.up, self.down)]
    }
}

struct App {
    window: Window,
    game: Game,
    keys: Keys,
    clock: Clock,
    ticker: FrequencyTicker,
    last_tick: TimeStamp,
    pending_resize: Option<Extent2>,

    // Renderer is tethered to the device and must go first.
    renderer: Option<Renderer>,
    context: Option<RenderContext>,
}

impl App {
    fn new(config: DemoConfig, window: Window) -> miette::Result<Self> {
        let stages = [
            StageSource {
                stage: ShaderStage::Vertex,
                source: ShaderSource::from_file(&config.shaders.vertex).into_diagnostic()?,
            },
            StageSource {
                stage: ShaderStage::Fragment,
                source: ShaderSource::from_file(&config.shaders.fragment).into_diagnostic()?,
            },
        ];

        let drawable = extent(window.inner_size());
        let desc = PipelineDesc::default().with_push_constants(RectConstants::RANGE);
        let context = RenderContext::new(&window, drawable, config.context.clone(), &stages, desc)
            .into_diagnostic()?;

        if let Some(adapter) = context.device().adapter() {
            tracing::info!("rendering on {} ({:?})", adapter.name, adapter.kind);
        }

        let renderer = Renderer::new(&context, CLEAR_COLOR)?;

        let mut game = Game::new([drawable.width as f32, drawable.height as f32]);
        game.add_startup_system(game::spawn_scene)
            .add_system(game::steer_player)
            .add_system(game::move_entities)
            .add_dispose_system(game::despawn_all);
        game.startup();

        let clock = Clock::new();
        let ticker = FrequencyTicker::new(config.target_fps.max(1).hz(), clock.now());

        Ok(App {
            window,
            game,
            keys: Keys::default(),
            last_tick: clock.now(),
            clock,
            ticker,
            pending_resize: None,
            renderer: Some(renderer),
            context: Some(context),
        })
    }

    fn handle_event(&mut self, event: Event<'_, ()>, flow: &mut ControlFlow) {
        match event {
            Event::WindowEvent { window_id, event } if window_id == self.window.id() => {
                match event {
                    WindowEvent::CloseRequested => *flow = ControlFlow::Exit,
                    WindowEvent::Resized(size) => {
                        let size = extent(size);
                        self.pending_resize = Some(size);
                        if !size.is_empty() {
                            self.game.set_bounds([size.width as f32, size.height as f32]);
                        }
                    }
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                virtual_keycode: Some(key),
                                state,
                                ..
                            },
                        ..
                    } => {
                        if key == VirtualKeyCode::Escape {
                            *flow = ControlFlow::Exit;
                        } else if self.keys.set(key, state == ElementState::Pressed) {
                            self.game.set_input(self.keys.direction());
                        }
                    }
                    _ => {}
                }
            }
            Event::MainEventsCleared => {
                let step = self.clock.step();

                let mut ticked = false;
                for now in self.ticker.ticks(step.now) {
                    let span = now - self.last_tick;
                    self.last_tick = now;
                    self.game.update(Duration::from_nanos(span.as_nanos()));
                    ticked = true;
                }
                if ticked {
                    self.window.request_redraw();
                }

                if *flow != ControlFlow::Exit {
                    *flow = match self.ticker.next_tick() {
                        Some(tick) => ControlFlow::WaitUntil(self.clock.stamp_instant(tick)),
                        None => ControlFlow::Wait,
                    };
                }
            }
            Event::RedrawRequested(window_id) if window_id == self.window.id() => {
                if ok_log_err!(self.redraw()).is_none() {
                    *flow = ControlFlow::Exit;
                }
            }
            Event::LoopDestroyed => self.shutdown(),
            _ => {}
        }
    }

    fn redraw(&mut self) -> miette::Result<()> {
        let (Some(context), Some(renderer)) = (&mut self.context, &mut self.renderer) else {
            return Ok(());
        };

        if let Some(size) = self.pending_resize.take() {
            if context.resize(size).into_diagnostic()? {
                tracing::debug!("swap chain resized to {}x{}", size.width, size.height);
            }
        }

        match renderer.draw(context, &self.game.sprites())? {
            FrameStatus::Presented | FrameStatus::Skipped => {}
            FrameStatus::Stale => {
                let size = extent(self.window.inner_size());
                tracing::debug!(
                    "swap chain is stale, rebuilding for {}x{}",
                    size.width,
                    size.height
                );
                context.rebuild(size).into_diagnostic()?;
            }
        }

        Ok(())
    }

    fn shutdown(&mut self) {
        self.game.dispose();
        drop(self.renderer.take());
        drop(self.context.take());
        tracing::info!("shut down");
    }
}

fn main() -> miette::Result<()> {
    install_tracing_subscriber();

    let args = Args::parse();
    let config = DemoConfig::load(&args.config)?;

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title(&config.window.title)
        .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
        .with_resizable(config.window.resizable)
        .build(&event_loop)
        .into_diagnostic()?;

    let mut app = App::new(config, window)?;

    event_loop.run(move |event, _, flow| app.handle_event(event, flow))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_keys_cancel() {
        let mut keys = Keys::default();
        assert!(keys.set(VirtualKeyCode::Left, true));
        assert_eq!(keys.direction(), [-1.0, 0.0]);

        assert!(keys.set(VirtualKeyCode::D, true));
        assert_eq!(keys.direction(), [0.0, 0.0]);

        assert!(keys.set(VirtualKeyCode::Left, false));
        assert!(keys.set(VirtualKeyCode::S, true));
        assert_eq!(keys.direction(), [1.0, 1.0]);
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        let mut keys = Keys::default();
        assert!(!keys.set(VirtualKeyCode::Space, true));
        assert_eq!(keys.direction(), [0.0, 0.0]);
    }
}
