pub mod chassis;
pub mod command;
pub mod config;
pub mod console;
pub mod runtime;
pub mod teleop;
