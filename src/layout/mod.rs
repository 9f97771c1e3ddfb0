pub mod dimensions;
pub mod grid;
