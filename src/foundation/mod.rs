pub mod composite;
pub mod error;
