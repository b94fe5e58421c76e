mod project;
mod pulse;
mod quest;
mod session;
mod task;

pub use project::*;
pub use pulse::*;
pub use quest::*;
pub use session::*;
pub use task::*;
