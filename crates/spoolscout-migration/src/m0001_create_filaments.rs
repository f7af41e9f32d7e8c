use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Filaments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Filaments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Filaments::Name).text().not_null())
                    .col(ColumnDef::new(Filaments::Material).text().not_null())
                    .col(ColumnDef::new(Filaments::Color).text().not_null())
                    .col(
                        ColumnDef::new(Filaments::Diameter)
                            .decimal_len(4, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Filaments::Price).decimal_len(10, 2).not_null())
                    .col(ColumnDef::new(Filaments::Brand).text().null())
                    .col(ColumnDef::new(Filaments::Description).text().null())
                    .col(ColumnDef::new(Filaments::TemperatureRange).text().null())
                    .col(ColumnDef::new(Filaments::Properties).text().null())
                    .col(
                        ColumnDef::new(Filaments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Filaments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Filaments {
    Table,
    Id,
    Name,
    Material,
    Color,
    Diameter,
    Price,
    Brand,
    Description,
    TemperatureRange,
    Properties,
    CreatedAt,
}
