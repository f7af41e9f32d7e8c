use sea_orm_migration::prelude::*;

mod m0001_create_filaments;
mod m0002_create_projects;
mod m0003_create_project_filaments;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m0001_create_filaments::Migration),
            Box::new(m0002_create_projects::Migration),
            Box::new(m0003_create_project_filaments::Migration),
        ]
    }
}
