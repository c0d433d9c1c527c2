pub mod events;
pub mod player;
pub mod session;
pub mod stats;

pub use events::*;
pub use player::*;
pub use session::*;
pub use stats::*;
