pub mod header;
pub mod session;

pub use header::{ExcerptWord, QueueInfo};
pub use session::{ExcerptCursor, ExcerptView, MessageIter, ReaderSession};
