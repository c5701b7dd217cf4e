//! Shared input and output types exchanged with collaborators.

mod chain;
mod views;

pub use chain::*;
pub use views::*;
