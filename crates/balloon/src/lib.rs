mod actions;
mod controller;
mod focus;
mod form;
mod keystrokes;
mod panel;
mod position;
mod protocol;

pub use crate::actions::*;
pub use crate::controller::*;
pub use crate::focus::*;
pub use crate::form::*;
pub use crate::keystrokes::*;
pub use crate::panel::*;
pub use crate::position::*;
pub use crate::protocol::*;
