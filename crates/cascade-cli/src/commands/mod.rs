pub mod build;
pub mod expand;
pub mod project;
pub mod prompt;
pub mod reporter;
pub mod status;
pub mod workspaces;
