mod command;
mod fs;
mod types;

pub use command::*;
pub use fs::*;
pub use types::*;
