pub mod common;

pub use common::{init_logging, DataArgs, RunArgs};
