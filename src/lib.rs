pub mod catalog;
pub mod cli;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod install;
pub mod lock;
pub mod notify;
pub mod orchestrator;
pub mod output;
pub mod reboot;
pub mod record;
pub mod rollback;
pub mod status;
pub mod store;
pub mod sync;
pub mod sysfs;
pub mod verify;
