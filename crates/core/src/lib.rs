mod commands;
mod config;
mod convert;
mod core;
mod decorators;
mod editing;
mod events;
mod fixers;
mod ops;
mod plugin;
mod range;
mod value;

pub use crate::commands::*;
pub use crate::config::*;
pub use crate::convert::*;
pub use crate::core::*;
pub use crate::decorators::*;
pub use crate::editing::*;
pub use crate::events::*;
pub use crate::fixers::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::range::*;
pub use crate::value::*;
