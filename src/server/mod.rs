mod builder;
mod handler;
pub mod keys;
mod persistence;
pub mod state;

#[allow(clippy::module_inception)]
mod server;

pub use builder::ReplayServerBuilder;
pub use server::{Error, ReplayServer, ReplayServerHandle};
