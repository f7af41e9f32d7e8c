use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProjectFilaments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectFilaments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProjectFilaments::ProjectId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProjectFilaments::FilamentId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProjectFilaments::Quantity)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(ProjectFilaments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Rows are always listed per project.
        manager
            .create_index(
                Index::create()
                    .name("idx_project_filaments_project_id")
                    .table(ProjectFilaments::Table)
                    .col(ProjectFilaments::ProjectId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProjectFilaments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProjectFilaments {
    Table,
    Id,
    ProjectId,
    FilamentId,
    Quantity,
    CreatedAt,
}
