use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spoolscout_db::entities::{filaments, project_filaments, projects};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filament {
    pub id: i32,
    pub name: String,
    pub material: String,
    pub color: String,
    pub diameter: Decimal,
    pub price: Decimal,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub temperature_range: Option<String>,
    pub properties: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

impl From<filaments::Model> for Filament {
    fn from(m: filaments::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            material: m.material,
            color: m.color,
            diameter: m.diameter,
            price: m.price,
            brand: m.brand,
            description: m.description,
            temperature_range: m.temperature_range,
            properties: m.properties,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFilament {
    pub name: String,
    pub material: String,
    pub color: String,
    pub diameter: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub temperature_range: Option<String>,
    #[serde(default)]
    pub properties: Option<String>,
}

impl NewFilament {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("name", &self.name),
            ("material", &self.material),
            ("color", &self.color),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must be non-empty"));
            }
        }
        if self.diameter <= Decimal::ZERO {
            return Err("diameter must be positive".to_string());
        }
        if self.price < Decimal::ZERO {
            return Err("price must not be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

impl From<projects::Model> for Project {
    fn from(m: projects::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewProject {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must be non-empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFilament {
    pub id: i32,
    pub project_id: i32,
    pub filament_id: i32,
    pub quantity: i32,
    pub created_at: DateTime<FixedOffset>,
}

impl From<project_filaments::Model> for ProjectFilament {
    fn from(m: project_filaments::Model) -> Self {
        Self {
            id: m.id,
            project_id: m.project_id,
            filament_id: m.filament_id,
            quantity: m.quantity,
            created_at: m.created_at,
        }
    }
}

fn default_quantity() -> i32 {
    1
}

/// Body of `POST /api/projects/:id/filaments`; the project comes from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProjectFilament {
    pub filament_id: i32,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

impl NewProjectFilament {
    pub fn validate(&self) -> Result<(), String> {
        if self.quantity < 1 {
            return Err("quantity must be at least 1".to_string());
        }
        Ok(())
    }
}
