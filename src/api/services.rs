//! Service catalog endpoints. Reads are memoized in the in-process cache.

use axum::{extract::State, http::StatusCode, Json};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiQuery};
use super::validation::{
    validate_duration_minutes, validate_price, validate_required_text, validate_slug,
    MAX_NOTES_LENGTH, MAX_TEXT_LENGTH,
};
use crate::db::{
    CreateModuleRequest, ModuleListQuery, PackageModuleLink, PackageWithModules, ServiceModule,
    ServicePackage,
};
use crate::AppState;

const PACKAGES_KEY: &str = "packages:active";
const MODULES_PREFIX: &str = "modules:";

/// `modules:all` for the unfiltered list, `modules:category:<c>` otherwise.
/// The two namespaces never collide, whatever the category text is.
fn modules_key(category: Option<&str>) -> String {
    match category {
        Some(category) => format!("{}category:{}", MODULES_PREFIX, category),
        None => format!("{}all", MODULES_PREFIX),
    }
}

async fn load_packages(state: &AppState) -> Result<Vec<PackageWithModules>, ApiError> {
    let packages: Vec<ServicePackage> = sqlx::query_as(
        "SELECT * FROM service_packages WHERE is_active ORDER BY sort_order, name",
    )
    .fetch_all(&state.db)
    .await?;

    let modules: Vec<ServiceModule> =
        sqlx::query_as("SELECT * FROM service_modules WHERE is_active")
            .fetch_all(&state.db)
            .await?;

    let links: Vec<PackageModuleLink> =
        sqlx::query_as("SELECT package_id, module_id FROM package_modules")
            .fetch_all(&state.db)
            .await?;

    Ok(assemble_packages(packages, modules, links))
}

/// Attach each package's active modules, in module-name order
fn assemble_packages(
    packages: Vec<ServicePackage>,
    modules: Vec<ServiceModule>,
    links: Vec<PackageModuleLink>,
) -> Vec<PackageWithModules> {
    let modules_by_id: HashMap<Uuid, ServiceModule> =
        modules.into_iter().map(|m| (m.id, m)).collect();

    let mut included: HashMap<Uuid, Vec<ServiceModule>> = HashMap::new();
    for link in links {
        if let Some(module) = modules_by_id.get(&link.module_id) {
            included
                .entry(link.package_id)
                .or_default()
                .push(module.clone());
        }
    }

    packages
        .into_iter()
        .map(|package| {
            let mut modules = included.remove(&package.id).unwrap_or_default();
            modules.sort_by(|a, b| a.name.cmp(&b.name));
            PackageWithModules::new(package, modules)
        })
        .collect()
}

/// GET /api/v1/services/packages
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PackageWithModules>>, ApiError> {
    let packages = state
        .packages_cache
        .get_or_try_insert_with(PACKAGES_KEY, state.config.cache.catalog_ttl(), || {
            load_packages(&state)
        })
        .await?;

    Ok(Json(packages))
}

/// GET /api/v1/services/modules?category=
pub async fn list_modules(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ModuleListQuery>,
) -> Result<Json<Vec<ServiceModule>>, ApiError> {
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_lowercase);

    let key = modules_key(category.as_deref());
    let modules = state
        .modules_cache
        .get_or_try_insert_with(&key, state.config.cache.catalog_ttl(), || async {
            let modules: Vec<ServiceModule> = sqlx::query_as(
                "SELECT * FROM service_modules \
                 WHERE is_active AND ($1::text IS NULL OR category = $1) \
                 ORDER BY category, name",
            )
            .bind(category.as_deref())
            .fetch_all(&state.db)
            .await?;
            Ok::<_, ApiError>(modules)
        })
        .await?;

    Ok(Json(modules))
}

/// POST /api/v1/services/modules (admin)
pub async fn create_module(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<CreateModuleRequest>,
) -> Result<(StatusCode, Json<ServiceModule>), ApiError> {
    auth.require_admin()?;

    let mut errors = ValidationErrorBuilder::new();
    let slug = errors.check("slug", validate_slug(&request.slug));
    let name = errors.check(
        "name",
        validate_required_text(&request.name, "Name", MAX_TEXT_LENGTH),
    );
    let category = errors.check(
        "category",
        validate_required_text(&request.category, "Category", MAX_TEXT_LENGTH)
            .map(|c| c.to_lowercase()),
    );
    let price = errors.check("price", validate_price(request.price));
    let duration = errors.check(
        "durationMinutes",
        validate_duration_minutes(request.duration_minutes),
    );
    let description = super::validation::sanitize_text(&request.description);
    if description.chars().count() > MAX_NOTES_LENGTH {
        errors.add("description", "Description is too long");
    }

    let (Some(slug), Some(name), Some(category), Some(price), Some(duration)) =
        (slug, name, category, price, duration)
    else {
        return Err(errors
            .build()
            .unwrap_or_else(|| ApiError::bad_request("Invalid module")));
    };
    errors.finish()?;

    let module: ServiceModule = sqlx::query_as(
        "INSERT INTO service_modules (slug, name, description, price, duration_minutes, category) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(&slug)
    .bind(&name)
    .bind(&description)
    .bind(price)
    .bind(duration)
    .bind(&category)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::conflict(format!("A module with slug '{}' already exists", slug))
        }
        _ => ApiError::from(e),
    })?;

    let invalidated = state.modules_cache.invalidate_prefix(MODULES_PREFIX);
    state.packages_cache.delete(PACKAGES_KEY);
    tracing::info!(
        module_id = %module.id,
        slug = %module.slug,
        invalidated,
        "Service module created, catalog cache invalidated"
    );

    Ok((StatusCode::CREATED, Json(module)))
}
