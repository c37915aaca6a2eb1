use super::{error::ApiError, AppState};
use crate::{
    auth::bearer_token,
    generation::SaveOutcome,
    models::{Caller, GenerationRequest, InlineImage, SizePreset, UserIdentity},
};
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: String,
    pub size: Option<String>,
    /// Reference photos as data URLs.
    #[serde(default)]
    pub images: Vec<String>,
    pub logo_url: Option<String>,
    pub company_name: Option<String>,
    #[serde(alias = "sessionToken")]
    pub anonymous_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub image: String,
    pub model: String,
    pub banner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CaptionBody {
    #[serde(default)]
    pub prompt: String,
}

pub async fn generate(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<GenerateBody>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let user = authenticate(&state, &req).await?;
    let caller = Caller::from_parts(user, body.anonymous_token);

    let mut request = GenerationRequest::new(body.prompt)
        .with_size(SizePreset::resolve(body.size.as_deref()))
        .with_caller(caller);
    for (index, url) in body.images.iter().enumerate() {
        let image = InlineImage::from_data_url(url)
            .map_err(|e| ApiError::BadRequest(format!("Reference image {}: {}", index + 1, e)))?;
        request = request.with_reference_image(image);
    }
    if let Some(url) = body.logo_url.as_deref().filter(|url| !url.trim().is_empty()) {
        let logo = InlineImage::from_data_url(url)
            .map_err(|e| ApiError::BadRequest(format!("Logo: {}", e)))?;
        request = request.with_logo(logo);
    }
    if let Some(name) = body.company_name {
        request = request.with_brand_name(name);
    }

    let banner = state.generator.generate(request).await?;
    let banner_id = match banner.saved {
        SaveOutcome::Saved { id } => Some(id),
        SaveOutcome::Skipped | SaveOutcome::Failed => None,
    };

    Ok(HttpResponse::Ok().json(GenerateResponse {
        image: banner.artifact.to_data_url(),
        model: banner.artifact.model,
        banner_id,
    }))
}

pub async fn caption(
    state: web::Data<AppState>,
    body: web::Json<CaptionBody>,
) -> Result<HttpResponse, ApiError> {
    let caption = state.captions.write(&body.prompt).await?;
    Ok(HttpResponse::Ok().json(json!({ "caption": caption })))
}

pub async fn list_models(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let models = state.provider.list_models().await?;
    Ok(HttpResponse::Ok().json(json!({
        "models": models,
        "imageModels": state.image_models,
        "captionModels": state.caption_models,
    })))
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.storage.health_check().await {
        Ok(true) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Ok(false) => HttpResponse::ServiceUnavailable().json(json!({ "status": "degraded" })),
        Err(e) => {
            log::error!("Storage health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({ "status": "degraded" }))
        }
    }
}

/// Identity behind the bearer token, if one was sent.
async fn authenticate(
    state: &AppState,
    req: &HttpRequest,
) -> Result<Option<UserIdentity>, ApiError> {
    let token = match req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
    {
        Some(token) => token,
        None => return Ok(None),
    };

    let authenticator = state.auth.as_ref().ok_or_else(|| {
        ApiError::Unauthorized("bearer token sent but no authenticator is configured".into())
    })?;
    let user = authenticator
        .authenticate(token)
        .await
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let is_admin = user
        .email
        .as_deref()
        .map_or(false, |email| state.quota.is_admin_email(email));
    Ok(Some(if is_admin { user.admin() } else { user }))
}
