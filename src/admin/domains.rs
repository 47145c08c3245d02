//! Domain ↔ certificate bindings.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::error::ApiError;
use crate::admin::AdminJson;
use crate::http::state::AppState;
use crate::net::{Bound, CertificateMaterial, DomainBinding};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindDomainRequest {
    pub host: String,
    /// Certificate chain and private key in one PEM document.
    pub certificate: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindDomainPemRequest {
    pub host: String,
    pub cert_pem: String,
    pub key_pem: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateDomainRequest {
    pub host: String,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub cert_pem: Option<String>,
    #[serde(default)]
    pub key_pem: Option<String>,
}

impl RotateDomainRequest {
    fn material(self) -> Result<CertificateMaterial, ApiError> {
        match (self.certificate, self.cert_pem, self.key_pem) {
            (Some(bundle), None, None) => Ok(CertificateMaterial::Bundle(bundle)),
            (None, Some(cert), Some(key)) => Ok(CertificateMaterial::Pem { cert, key }),
            _ => Err(ApiError::BadRequest(
                "provide either 'certificate' or both 'certPem' and 'keyPem'".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RotationResponse {
    pub current: Arc<DomainBinding>,
    pub previous: Arc<DomainBinding>,
}

pub async fn list_domains(State(state): State<AppState>) -> Json<Vec<Arc<DomainBinding>>> {
    Json(state.domains.list())
}

fn bound_response(bound: Bound) -> impl IntoResponse {
    let status = if bound.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(bound.binding))
}

pub async fn bind_domain(
    State(state): State<AppState>,
    AdminJson(req): AdminJson<BindDomainRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let material = CertificateMaterial::Bundle(req.certificate);
    Ok(bound_response(state.domains.bind(&req.host, &material)?))
}

pub async fn bind_domain_pem(
    State(state): State<AppState>,
    AdminJson(req): AdminJson<BindDomainPemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let material = CertificateMaterial::Pem {
        cert: req.cert_pem,
        key: req.key_pem,
    };
    Ok(bound_response(state.domains.bind(&req.host, &material)?))
}

pub async fn rotate_domain(
    State(state): State<AppState>,
    AdminJson(req): AdminJson<RotateDomainRequest>,
) -> Result<Json<RotationResponse>, ApiError> {
    let host = req.host.clone();
    let rotation = state.domains.rotate(&host, &req.material()?)?;
    Ok(Json(RotationResponse {
        current: rotation.current,
        previous: rotation.previous,
    }))
}

pub async fn delete_domain(
    State(state): State<AppState>,
    Path(host): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.domains.remove(&host) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no binding for host '{}'", host)))
    }
}
