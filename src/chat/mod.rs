pub mod attachment;
pub mod session;
pub mod state;

pub use attachment::{Attachment, classify, object_path};
pub use session::{LiveSession, Session};
pub use state::ChatState;
