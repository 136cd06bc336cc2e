pub mod error;
pub mod program;
pub mod save;
pub mod state;

pub use error::StoryError;
pub use program::*;
pub use save::*;
pub use state::*;

pub const PLAYER_KEY: &str = "mc";
