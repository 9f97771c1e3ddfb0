pub mod batch;
pub mod cache;
pub mod cancel;
pub mod encode;
pub mod file;
pub mod options;
pub mod progress;
pub mod service;
