use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use crate::control::StatsReport;
use crate::gateway::{GatewayError, Mutation, PublishOutcome, StatusReport};
use crate::grants::AccessDecision;
use crate::model::{
    AccessGrant, GrantId, NewResource, Resource, ResourceId, ResourcePatch, SubjectId,
};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct ListResourcesQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct GrantQuery {
    pub subject_id: Option<SubjectId>,
    pub resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantRequest {
    pub resource_id: ResourceId,
    pub subject_id: Option<SubjectId>,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalGrantRequest {
    pub resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessRequest {
    pub resource_id: ResourceId,
    pub subject_id: Option<SubjectId>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<StatusReport> {
    Json(state.gateway.status().await)
}

pub async fn list_resources(
    State(state): State<AdminState>,
    Query(query): Query<ListResourcesQuery>,
) -> Json<Vec<Resource>> {
    Json(state.gateway.resources.list(query.include_inactive))
}

pub async fn create_resource(
    State(state): State<AdminState>,
    Json(new): Json<NewResource>,
) -> ApiResult<(StatusCode, Json<Mutation<Resource>>)> {
    let mutation = state.gateway.resources.create(new).await?;
    Ok((StatusCode::CREATED, Json(mutation)))
}

pub async fn get_resource(
    State(state): State<AdminState>,
    Path(id): Path<ResourceId>,
) -> ApiResult<Json<Resource>> {
    Ok(Json(state.gateway.resources.get(id)?))
}

pub async fn update_resource(
    State(state): State<AdminState>,
    Path(id): Path<ResourceId>,
    Json(patch): Json<ResourcePatch>,
) -> ApiResult<Json<Mutation<Resource>>> {
    Ok(Json(state.gateway.resources.update(id, patch).await?))
}

pub async fn delete_resource(
    State(state): State<AdminState>,
    Path(id): Path<ResourceId>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<Mutation<Resource>>> {
    let mutation = if query.hard {
        state.gateway.delete_resource(id).await?
    } else {
        state.gateway.resources.soft_delete(id).await?
    };
    Ok(Json(mutation))
}

pub async fn activate_resource(
    State(state): State<AdminState>,
    Path(id): Path<ResourceId>,
) -> ApiResult<Json<Mutation<Resource>>> {
    Ok(Json(state.gateway.resources.activate(id).await?))
}

pub async fn list_grants(
    State(state): State<AdminState>,
    Query(query): Query<GrantQuery>,
) -> Json<Vec<AccessGrant>> {
    let grants = &state.gateway.grants;
    let list = match (query.subject_id, query.resource_id) {
        (Some(subject), Some(resource)) => grants
            .list_by_subject(subject)
            .into_iter()
            .filter(|g| g.resource_id == resource)
            .collect(),
        (Some(subject), None) => grants.list_by_subject(subject),
        (None, Some(resource)) => grants.list_by_resource(resource),
        (None, None) => grants.list_all(),
    };
    Json(list)
}

/// Subject grants default to the configured lifetime; without a subject the
/// grant is global and permanent unless a ttl is given.
pub async fn create_grant(
    State(state): State<AdminState>,
    Json(req): Json<GrantRequest>,
) -> ApiResult<(StatusCode, Json<Mutation<AccessGrant>>)> {
    let grants = &state.gateway.grants;
    let ttl = req
        .ttl_secs
        .or_else(|| req.subject_id.map(|_| grants.default_ttl_secs()));
    let mutation = grants
        .create_grant(req.resource_id, req.subject_id, ttl)
        .await?;
    Ok((StatusCode::CREATED, Json(mutation)))
}

pub async fn create_global_grant(
    State(state): State<AdminState>,
    Json(req): Json<GlobalGrantRequest>,
) -> ApiResult<(StatusCode, Json<Mutation<AccessGrant>>)> {
    let mutation = state
        .gateway
        .grants
        .create_global_grant(req.resource_id)
        .await?;
    Ok((StatusCode::CREATED, Json(mutation)))
}

pub async fn remove_grant(
    State(state): State<AdminState>,
    Path(id): Path<GrantId>,
) -> ApiResult<Json<Mutation<AccessGrant>>> {
    Ok(Json(state.gateway.grants.remove_grant(id).await?))
}

pub async fn record_usage(
    State(state): State<AdminState>,
    Path(id): Path<GrantId>,
) -> ApiResult<Json<AccessGrant>> {
    Ok(Json(state.gateway.grants.record_usage(id)?))
}

pub async fn check_access(
    State(state): State<AdminState>,
    Json(req): Json<AccessRequest>,
) -> ApiResult<Json<AccessDecision>> {
    Ok(Json(
        state
            .gateway
            .grants
            .check_access(req.resource_id, req.subject_id)?,
    ))
}

pub async fn cleanup(State(state): State<AdminState>) -> ApiResult<Json<Mutation<Value>>> {
    let mutation = state.gateway.grants.cleanup_sweep().await?;
    Ok(Json(mutation.map(|removed| json!({ "removed": removed }))))
}

pub async fn reload(State(state): State<AdminState>) -> Json<PublishOutcome> {
    Json(state.gateway.publisher().publish("admin reload").await)
}

pub async fn get_config(State(state): State<AdminState>) -> ApiResult<impl IntoResponse> {
    let compiled = state
        .gateway
        .publisher()
        .preview()
        .map_err(GatewayError::from)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        compiled.text,
    ))
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<StatsReport> {
    Json(state.gateway.stats().await)
}
