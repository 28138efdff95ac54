mod private;
mod public;

pub(crate) use private::*;
pub use public::*;
