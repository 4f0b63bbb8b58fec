#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod controller;
mod diff;
mod error;
mod executor;
mod item;
mod list;
mod op;
mod tracer;

pub use controller::*;
pub use diff::*;
pub use error::*;
pub use executor::*;
pub use item::*;
pub use list::*;
pub use op::*;
pub use tracer::*;
