pub mod events;
pub mod manager;
pub mod session;
pub mod tts;

pub use events::{EventQueue, ServerEvent};
pub use manager::{Catalog, NewSimConfig, SessionManager, PROTOCOL_VERSION};
pub use session::{Session, SessionSnapshot, World, WorldUpdate};
