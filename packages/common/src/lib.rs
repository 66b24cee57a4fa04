pub mod error;
pub mod index;
pub mod result;
pub mod visitor;

pub use error::*;
pub use index::*;
pub use result::*;
pub use visitor::*;
