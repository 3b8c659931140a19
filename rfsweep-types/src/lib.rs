pub mod consts;
pub mod error;
pub mod range;
pub mod record;
pub mod style;

pub use consts::*;
pub use error::*;
pub use range::*;
pub use record::*;
pub use style::*;
