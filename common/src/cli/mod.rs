//! CLI policy shared by the binaries.

mod color;

pub use color::ColorWhen;
