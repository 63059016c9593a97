pub mod backend;
pub mod bridge;
pub mod router;
pub mod state;

pub use backend::BackendSession;
pub use bridge::SessionBridge;
pub use router::{classify, route, Intent, RouterReply};
pub use state::ConnectionState;
