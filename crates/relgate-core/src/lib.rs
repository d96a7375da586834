pub mod diff;
pub mod engine;
pub mod error;
pub mod ids;
pub mod model;
pub mod order;
pub mod propagation;
pub mod records;
pub mod version;

pub use diff::*;
pub use engine::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use order::*;
pub use propagation::*;
pub use records::*;
pub use version::*;
