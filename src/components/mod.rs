//! Components a device can expose: sensors and switches, built on the
//! attribute store and driven by read/write hooks.

mod base;
mod sensor;
mod switch;

pub use base::{Component, ComponentKind, FnReader, IdleReader, Reader, ValueSlot, Writer};
pub use sensor::{sensor, SensorKind};
pub use switch::switch;
