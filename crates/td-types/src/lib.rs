pub mod errors;
pub mod job;
pub mod metric;
pub mod scalar;
pub mod session;

pub use errors::*;
pub use job::*;
pub use metric::*;
pub use scalar::*;
pub use session::*;
