use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "filaments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub material: String,
    pub color: String,
    #[sea_orm(column_type = "Decimal(Some((4, 2)))")]
    pub diameter: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub temperature_range: Option<String>,
    pub properties: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::project_filaments::Entity")]
    ProjectFilaments,
}

impl Related<super::project_filaments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectFilaments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
