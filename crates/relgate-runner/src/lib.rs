pub mod config;
pub mod doctor;
pub mod propagation;
pub mod queries;
pub mod recorder;
pub mod runner;
pub mod script;
pub mod sequencer;
pub mod snapshot;
pub mod util;

pub use config::*;
pub use doctor::*;
pub use propagation::*;
pub use queries::*;
pub use recorder::*;
pub use runner::*;
pub use script::*;
pub use sequencer::*;
pub use snapshot::*;
pub use util::*;
