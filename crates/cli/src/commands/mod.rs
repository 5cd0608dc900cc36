pub mod build;
pub mod deploy;
pub mod init;
pub mod project;
pub mod validate;

pub use project::TargetArgs;
