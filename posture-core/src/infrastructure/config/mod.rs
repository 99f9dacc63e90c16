pub mod project;

pub use project::{ProjectConfig, load_project_config};
