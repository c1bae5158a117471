pub mod cache;
pub mod config;
pub mod drawable;
pub mod engine;
pub mod errors;
pub mod event;
pub mod geometry;
pub mod hash;
pub mod region;
pub mod render;
pub mod render_loop;
pub mod scene;
pub mod style;
pub mod unit;

pub use config::{CacheConfig, EngineConfig};
pub use drawable::DrawKind;
pub use engine::Engine;
pub use errors::RenderError;
pub use event::{EventPump, EventSource, InputEvent};
pub use geometry::{Overlap, Rect};
pub use scene::SceneContext;
pub use style::{Alignment, Brush, Color, FontSpec, ShadowSpec, StyleAttr};
pub use unit::{Command, UnitId, UnitKey};
