#[macro_use]
extern crate log;

pub mod beatcheck;
pub mod child_record;
pub mod cli;
pub mod clock;
pub mod directory_monitor;
pub mod env;
pub mod error;
pub mod event_receiver;
pub mod heartbeat;
pub mod httpcheck;
pub mod logging;
pub mod message;
pub mod process_monitor;
pub mod process_spec;
pub mod scheduler;
pub mod spawner;
pub mod supervisor;

pub use miette::Result;
