//! Input and window events, and the pump that feeds them to the scene.
//!
//! The engine does not own an event source: the host supplies one (a window
//! system, a test fixture, a replay log) behind [`EventSource`], and
//! [`EventPump`] runs on the host's foreground thread translating events
//! into scene operations. Expose damage becomes an OS-surface dirty region,
//! resizes go through the coalescing resize queue, close requests shut the
//! scene down. Pointer and key events are the host's business; the pump
//! only forwards them to an optional callback.

use std::fmt::Display;
use std::sync::Arc;

use bitflags::bitflags;

use crate::geometry::Rect;
use crate::render::backend::SurfaceSize;
use crate::scene::SceneContext;

/// A mouse button that can be pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MouseButton::Left => write!(f, "Left"),
            MouseButton::Middle => write!(f, "Middle"),
            MouseButton::Right => write!(f, "Right"),
        }
    }
}

bitflags! {
    pub struct Modifiers: u8 {
        const SHIFT   = 0b0001;
        const CONTROL = 0b0010;
        const ALT     = 0b0100;
        const META    = 0b1000;
    }
}

impl Display for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Modifiers::SHIFT) {
            parts.push("Shift");
        }
        if self.contains(Modifiers::CONTROL) {
            parts.push("Control");
        }
        if self.contains(Modifiers::ALT) {
            parts.push("Alt");
        }
        if self.contains(Modifiers::META) {
            parts.push("Meta");
        }
        if parts.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

/// One event delivered by the host's windowing layer.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer moved to a new position (scene coordinates).
    PointerMove { x: i32, y: i32 },
    /// Mouse button pressed.
    PointerDown { x: i32, y: i32, button: MouseButton },
    /// Mouse button released.
    PointerUp { x: i32, y: i32, button: MouseButton },
    /// Scroll wheel, in lines.
    Wheel { dx: i32, dy: i32 },
    /// Key pressed. `key` is the host's key name.
    KeyDown { key: String, modifiers: Modifiers },
    /// Key released.
    KeyUp { key: String, modifiers: Modifiers },
    /// A character was produced.
    KeyPress { character: char },
    /// The window system damaged part of the surface; repaint it.
    Expose { rect: Rect },
    /// The window changed size.
    Resized { width: u32, height: u32 },
    /// The window wants to close.
    CloseRequested,
}

/// The host-side event supplier. Blocks until the next event; `None` means
/// the source is exhausted and the pump should stop.
pub trait EventSource: Send {
    fn next_event(&mut self) -> Option<InputEvent>;
}

/// Callback for the events the scene itself does not consume.
pub type InputHandler = Box<dyn FnMut(&InputEvent) + Send>;

/// Foreground loop translating host events into scene operations.
pub struct EventPump {
    ctx: Arc<SceneContext>,
    source: Box<dyn EventSource>,
    handler: Option<InputHandler>,
}

impl EventPump {
    pub fn new(ctx: Arc<SceneContext>, source: Box<dyn EventSource>) -> Self {
        Self { ctx, source, handler: None }
    }

    /// Installs the callback that receives pointer and key events.
    pub fn with_handler(mut self, handler: InputHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Runs until the source is exhausted, a close is requested, or the
    /// scene shuts down. Call this on the host's event thread.
    pub fn run(mut self) {
        while self.ctx.is_processing() {
            let Some(event) = self.source.next_event() else { break };
            if !self.dispatch(event) {
                break;
            }
        }
    }

    /// Handles one event. Returns false when pumping should stop.
    pub fn dispatch(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::Expose { rect } => {
                log::trace!("expose {rect:?}");
                self.ctx.enqueue_surface_region(rect);
            }
            InputEvent::Resized { width, height } => {
                self.ctx.request_resize(SurfaceSize::new(width, height));
            }
            InputEvent::CloseRequested => {
                self.ctx.shutdown();
                return false;
            }
            ref input => {
                if let Some(handler) = &mut self.handler {
                    handler(input);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::render::backend::DrawingEngine;
    use crate::render::backends::raster::{RasterEngine, RasterImageDecoder, RasterTextEngine};
    use parking_lot::Mutex;

    fn context() -> Arc<SceneContext> {
        let engine = RasterEngine::new();
        let config = EngineConfig::default();
        let surface = engine
            .create_surface(SurfaceSize::new(config.viewport.width, config.viewport.height))
            .unwrap();
        Arc::new(SceneContext::new(
            surface,
            &config,
            Arc::new(RasterTextEngine::new()),
            Arc::new(RasterImageDecoder::new()),
        ))
    }

    struct Scripted(Vec<InputEvent>);

    impl EventSource for Scripted {
        fn next_event(&mut self) -> Option<InputEvent> {
            if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            }
        }
    }

    #[test]
    fn expose_queues_a_surface_region() {
        let ctx = context();
        let source = Scripted(vec![InputEvent::Expose { rect: Rect::new(0, 0, 10, 10) }]);
        EventPump::new(ctx.clone(), Box::new(source)).run();

        let region = ctx.next_region().expect("region queued");
        assert!(region.os_surface);
        assert_eq!(region.rect, Rect::new(0, 0, 10, 10));
    }

    #[test]
    fn resize_goes_through_the_resize_queue() {
        let ctx = context();
        let source = Scripted(vec![
            InputEvent::Resized { width: 320, height: 200 },
            InputEvent::Resized { width: 640, height: 480 },
        ]);
        EventPump::new(ctx.clone(), Box::new(source)).run();

        assert!(ctx.apply_pending_resize().unwrap());
        assert_eq!(ctx.with_surface(|s| s.size()), SurfaceSize::new(640, 480));
    }

    #[test]
    fn close_request_shuts_the_scene_down() {
        let ctx = context();
        let source = Scripted(vec![
            InputEvent::CloseRequested,
            // never reached
            InputEvent::Expose { rect: Rect::new(0, 0, 1, 1) },
        ]);
        EventPump::new(ctx.clone(), Box::new(source)).run();

        assert!(!ctx.is_processing());
        assert!(ctx.next_region().is_none());
    }

    #[test]
    fn input_events_reach_the_handler() {
        let ctx = context();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let source = Scripted(vec![
            InputEvent::PointerMove { x: 5, y: 6 },
            InputEvent::KeyDown { key: "a".into(), modifiers: Modifiers::CONTROL },
        ]);
        EventPump::new(ctx, Box::new(source))
            .with_handler(Box::new(move |ev| sink.lock().push(ev.clone())))
            .run();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], InputEvent::PointerMove { x: 5, y: 6 });
    }

    #[test]
    fn modifiers_display_joins_names() {
        let mods = Modifiers::SHIFT | Modifiers::ALT;
        assert_eq!(mods.to_string(), "Shift+Alt");
        assert_eq!(Modifiers::empty().to_string(), "None");
    }
}
