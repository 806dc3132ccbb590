//! Interactive command surface
//!
//! Lines starting with `/` are commands; any other text is sent to global chat.

mod dispatcher;
mod help;
mod parse;

pub use dispatcher::*;
pub use help::HELP_TEXT;
pub use parse::*;
