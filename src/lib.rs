#[macro_use]
extern crate lazy_static;

pub mod api;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod hass;
pub mod model;
pub mod retry;
pub mod sensor;
pub mod settings;
pub mod sync;

pub use error::Error;
