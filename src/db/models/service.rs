//! Service catalog models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServicePackage {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub base_price: f64,
    pub duration_minutes: i32,
    pub category: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceModule {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub duration_minutes: i32,
    pub category: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of `package_modules`
#[derive(Debug, Clone, FromRow)]
pub struct PackageModuleLink {
    pub package_id: Uuid,
    pub module_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageWithModules {
    #[serde(flatten)]
    pub package: ServicePackage,
    pub modules: Vec<ServiceModule>,
    /// Base price plus every included module
    pub total_price: f64,
}

impl PackageWithModules {
    pub fn new(package: ServicePackage, modules: Vec<ServiceModule>) -> Self {
        let total_price = package.base_price + modules.iter().map(|m| m.price).sum::<f64>();
        Self {
            package,
            modules,
            total_price,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModuleRequest {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub duration_minutes: i32,
    pub category: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModuleListQuery {
    pub category: Option<String>,
}
