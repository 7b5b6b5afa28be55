//! CLI command implementations.

pub mod admin;
pub mod run;
pub mod tree;

pub use admin::AdminCommand;
pub use run::RunCommand;
pub use tree::TreeCommand;
