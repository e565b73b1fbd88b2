//! shellproc command line front end

pub mod commands;
pub mod logging;
pub mod router;

pub use router::{dispatch, Cli, Commands, ConfigAction};
