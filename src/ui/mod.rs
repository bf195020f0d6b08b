pub mod plain_renderer;
pub mod renderer;
pub mod theme;
pub mod widgets;

pub use plain_renderer::PlainRenderer;
pub use renderer::{Renderer, SpinnerHandle, UiError, UiResult};
pub use theme::{OutputMode, Theme};
pub use widgets::{KeyValue, MessageBlock, NoticeLevel, TableSpec};
