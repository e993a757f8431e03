pub mod config;
pub mod jobs;
pub mod process;
pub mod publish;
pub mod status;
