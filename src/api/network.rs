use axum::{extract::Query, response::Response};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::services::network_detector::{
    detect_network, is_valid_ghana_phone, normalize_phone, Carrier,
};

#[derive(Debug, Deserialize)]
pub struct DetectQuery {
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub phone: String,
    pub valid: bool,
    pub network: Option<Carrier>,
}

/// GET /api/network/detect?phone=
pub async fn detect(Query(query): Query<DetectQuery>) -> Result<Response, AppError> {
    let phone = query
        .phone
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::validation("phone", "phone is required"))?;

    Ok(success_response(DetectResponse {
        phone: normalize_phone(&phone),
        valid: is_valid_ghana_phone(&phone),
        network: detect_network(&phone),
    }))
}
