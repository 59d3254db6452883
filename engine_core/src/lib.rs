#![forbid(unsafe_code)]

pub mod image;
pub mod jobs;
pub mod logging;
pub mod observability;
