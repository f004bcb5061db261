pub mod relay;
pub mod sse;

pub use relay::{ChangeKind, LetterChange, RealtimeRelay, SERVER_ORIGIN};
