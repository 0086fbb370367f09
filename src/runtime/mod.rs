pub mod event;
pub mod registry;
pub mod session;

pub use event::SessionEvent;
pub use registry::SessionRegistry;
pub use session::{PortfolioSnapshot, RealtimeSession};
