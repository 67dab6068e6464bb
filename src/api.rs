// HTTP surface: tenant rollups, talent KPI and collaborator record writes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    app_state::AppState,
    core::{RecordId, TenantId, YearMonth},
    engine::{aggregate_business, talent_report, BusinessRollup, FilterContext, TalentReport},
    error::{AppError, AppResult},
    infrastructure::collections::DataCompleteness,
    models::EntityKind,
    services::dashboard::ViewMode,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuery {
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub shop_id: Option<String>,
    pub talent_id: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessResponse {
    pub tenant: TenantId,
    pub tenant_name: Option<String>,
    pub revision: u64,
    pub filter: FilterContext,
    pub rollup: BusinessRollup,
    pub completeness: DataCompleteness,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentResponse {
    pub tenant: TenantId,
    pub tenant_name: Option<String>,
    pub revision: u64,
    pub filter: FilterContext,
    pub report: TalentReport,
    pub completeness: DataCompleteness,
}

// Malformed path segments are bad requests; bad field values are validation errors

fn parse_tenant(raw: String) -> AppResult<TenantId> {
    let tenant = TenantId::new(raw);
    if tenant.is_blank() {
        return Err(AppError::BadRequest("Tenant id must not be blank".to_string()));
    }
    Ok(tenant)
}

fn parse_kind(raw: &str) -> AppResult<EntityKind> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Unknown record kind: {}", raw)))
}

fn parse_record_id(raw: String) -> AppResult<RecordId> {
    let id = RecordId::new(raw);
    if id.is_blank() {
        return Err(AppError::BadRequest("Record id must not be blank".to_string()));
    }
    Ok(id)
}

fn request_filter(state: &AppState, query: &ViewQuery, group: Option<String>) -> AppResult<FilterContext> {
    let filter = FilterContext::new()
        .with_utc_offset(state.config.utc_offset()?)
        .with_dates(query.date_start, query.date_end)
        .with_group(group);
    filter.validate()?;
    Ok(filter)
}

fn request_period(state: &AppState, query: &ViewQuery, filter: &FilterContext) -> AppResult<YearMonth> {
    match (query.year, query.month) {
        (Some(year), Some(month)) => YearMonth::new(year, month)
            .ok_or_else(|| AppError::Validation(format!("Invalid period {}-{}", year, month))),
        (None, None) => Ok(YearMonth::containing(state.clock.now(), filter.utc_offset())),
        _ => Err(AppError::Validation(
            "year and month must be given together".to_string(),
        )),
    }
}

// HTTP Handlers

pub async fn business_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<BusinessResponse>, AppError> {
    let tenant = parse_tenant(tenant)?;
    let filter = request_filter(&state, &query, query.shop_id.clone())?;
    let view = state.hub.view(&tenant, ViewMode::Business).await?;

    let rollup = aggregate_business(&tenant, view.collections.business_input(), &filter);
    Ok(Json(BusinessResponse {
        tenant,
        tenant_name: view.tenant_name.clone(),
        revision: view.revision,
        filter,
        rollup,
        completeness: view.completeness.clone(),
    }))
}

pub async fn talent_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<TalentResponse>, AppError> {
    let tenant = parse_tenant(tenant)?;
    let filter = request_filter(&state, &query, query.talent_id.clone())?;
    let period = request_period(&state, &query, &filter)?;
    let view = state.hub.view(&tenant, ViewMode::Talent).await?;

    let report = talent_report(&tenant, view.collections.talent_input(), period, &filter);
    Ok(Json(TalentResponse {
        tenant,
        tenant_name: view.tenant_name.clone(),
        revision: view.revision,
        filter,
        report,
        completeness: view.completeness.clone(),
    }))
}

pub async fn create_record_handler(
    State(state): State<AppState>,
    Path((tenant, kind)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let tenant = parse_tenant(tenant)?;
    let kind = parse_kind(&kind)?;
    let id = state.store.put(kind, &tenant, None, body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id, "kind": kind.as_str() }))))
}

pub async fn put_record_handler(
    State(state): State<AppState>,
    Path((tenant, kind, id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let tenant = parse_tenant(tenant)?;
    let kind = parse_kind(&kind)?;
    let id = parse_record_id(id)?;
    let id = state.store.put(kind, &tenant, Some(id), body).await?;
    Ok(Json(json!({ "id": id, "kind": kind.as_str() })))
}

pub async fn delete_record_handler(
    State(state): State<AppState>,
    Path((tenant, kind, id)): Path<(String, String, String)>,
) -> Result<Json<Value>, AppError> {
    let tenant = parse_tenant(tenant)?;
    let kind = parse_kind(&kind)?;
    let id = parse_record_id(id)?;
    if !state.store.delete(kind, &tenant, &id).await? {
        return Err(AppError::NotFound(format!("{} {} for tenant {}", kind, id, tenant)));
    }
    Ok(Json(json!({ "id": id, "kind": kind.as_str(), "deleted": true })))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Routes under `/api/v1`
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        // Rollups
        .route("/tenants/{tenant}/business", get(business_handler))
        .route("/tenants/{tenant}/talent", get(talent_handler))

        // Collaborator writes
        .route("/tenants/{tenant}/records/{kind}", post(create_record_handler))
        .route(
            "/tenants/{tenant}/records/{kind}/{id}",
            put(put_record_handler).delete(delete_record_handler),
        )

        .with_state(state)
}

/// Full application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", create_api_router(state))
}
