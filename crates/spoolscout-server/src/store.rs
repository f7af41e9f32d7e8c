use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};
use spoolscout_db::entities::{filaments, project_filaments, projects};

use crate::{
    models::{
        Filament, NewFilament, NewProject, NewProjectFilament, Project, ProjectFilament,
    },
    search,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

/// Filament and project persistence as seen by the HTTP layer.
#[async_trait::async_trait]
pub trait FilamentStore: Send + Sync {
    async fn list_filaments(&self) -> Result<Vec<Filament>, StoreError>;
    async fn get_filament(&self, id: i32) -> Result<Option<Filament>, StoreError>;
    async fn create_filament(&self, new: NewFilament) -> Result<Filament, StoreError>;
    async fn search_filaments(&self, query: &str) -> Result<Vec<Filament>, StoreError>;

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;
    async fn get_project(&self, id: i32) -> Result<Option<Project>, StoreError>;
    async fn create_project(&self, new: NewProject) -> Result<Project, StoreError>;

    async fn project_filaments(&self, project_id: i32)
    -> Result<Vec<ProjectFilament>, StoreError>;
    async fn add_project_filament(
        &self,
        project_id: i32,
        new: NewProjectFilament,
    ) -> Result<ProjectFilament, StoreError>;

    /// Whether the backing database answers right now.
    async fn ping(&self) -> bool;
}

#[derive(Clone)]
pub struct DbStore {
    db: Arc<DatabaseConnection>,
}

impl DbStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl FilamentStore for DbStore {
    async fn list_filaments(&self) -> Result<Vec<Filament>, StoreError> {
        let rows = filaments::Entity::find()
            .order_by_asc(filaments::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Filament::from).collect())
    }

    async fn get_filament(&self, id: i32) -> Result<Option<Filament>, StoreError> {
        let row = filaments::Entity::find_by_id(id).one(&*self.db).await?;
        Ok(row.map(Filament::from))
    }

    async fn create_filament(&self, new: NewFilament) -> Result<Filament, StoreError> {
        let model = filaments::ActiveModel {
            id: NotSet,
            name: Set(new.name),
            material: Set(new.material),
            color: Set(new.color),
            diameter: Set(new.diameter),
            price: Set(new.price),
            brand: Set(new.brand),
            description: Set(new.description),
            temperature_range: Set(new.temperature_range),
            properties: Set(new.properties),
            created_at: Set(chrono::Utc::now().into()),
        };
        let row = model.insert(&*self.db).await?;
        Ok(row.into())
    }

    async fn search_filaments(&self, query: &str) -> Result<Vec<Filament>, StoreError> {
        let terms = search::search_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let rows = filaments::Entity::find()
            .filter(search::search_condition(&terms))
            .order_by_asc(filaments::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Filament::from).collect())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows = projects::Entity::find()
            .order_by_asc(projects::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn get_project(&self, id: i32) -> Result<Option<Project>, StoreError> {
        let row = projects::Entity::find_by_id(id).one(&*self.db).await?;
        Ok(row.map(Project::from))
    }

    async fn create_project(&self, new: NewProject) -> Result<Project, StoreError> {
        let model = projects::ActiveModel {
            id: NotSet,
            name: Set(new.name),
            description: Set(new.description),
            created_at: Set(chrono::Utc::now().into()),
        };
        let row = model.insert(&*self.db).await?;
        Ok(row.into())
    }

    async fn project_filaments(
        &self,
        project_id: i32,
    ) -> Result<Vec<ProjectFilament>, StoreError> {
        let rows = project_filaments::Entity::find()
            .filter(project_filaments::Column::ProjectId.eq(project_id))
            .order_by_asc(project_filaments::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(ProjectFilament::from).collect())
    }

    async fn add_project_filament(
        &self,
        project_id: i32,
        new: NewProjectFilament,
    ) -> Result<ProjectFilament, StoreError> {
        let model = project_filaments::ActiveModel {
            id: NotSet,
            project_id: Set(project_id),
            filament_id: Set(new.filament_id),
            quantity: Set(new.quantity),
            created_at: Set(chrono::Utc::now().into()),
        };
        let row = model.insert(&*self.db).await?;
        Ok(row.into())
    }

    async fn ping(&self) -> bool {
        match self.db.ping().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "database ping failed");
                false
            }
        }
    }
}
