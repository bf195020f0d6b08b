pub mod chunk;
pub mod config;
pub mod controller;
pub mod document;
pub mod line_buffer;
pub mod session;
pub mod stream;
pub mod terminal;
pub mod view;

pub use chunk::{ChunkDecoder, Placement};
pub use controller::{
    cancel_task, CancelEndpoint, CancelOutcome, PageContext, TaskController, TaskId,
};
pub use document::MarkupDocument;
pub use line_buffer::{Line, LineBuffer, LineChange};
pub use session::WatchSession;
pub use stream::{
    CloseReason, ConnectionState, LineSink, StreamOptions, TaskStream, Transport, TransportEvent,
};
pub use terminal::TerminalTarget;
pub use view::{Console, NodeId, OutputView, RenderTarget};
