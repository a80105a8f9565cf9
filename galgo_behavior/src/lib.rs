pub mod host;
pub mod slots;

pub use host::*;
pub use slots::*;
