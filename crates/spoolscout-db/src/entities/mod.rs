pub mod filaments;
pub mod project_filaments;
pub mod projects;
