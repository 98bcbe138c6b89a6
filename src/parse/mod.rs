#[allow(clippy::module_inception)]
mod parse;

pub use self::parse::*;
