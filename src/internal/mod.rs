pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod probe;
pub mod rng;
pub mod stub;
pub mod stub_template;
pub mod vm;
