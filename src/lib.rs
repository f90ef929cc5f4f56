pub mod app;
pub mod assemble;
pub mod config;
pub mod domain;
pub mod driver;
pub mod ecmwf;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod partition;
pub mod splitter;
pub mod templates;
