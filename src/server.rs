use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::error::{BulkError, FetchError, ProviderError, RetrievalError};
use crate::service::{CleanupOverrides, MixService};
use crate::types::{AudioFormat, EpisodeDescriptor};

/// 统一的 JSON 错误响应 {error, details?}
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        let status = match e {
            ProviderError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ProviderError::UserNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<RetrievalError> for ApiError {
    fn from(e: RetrievalError) -> Self {
        let status = match e {
            RetrievalError::Forbidden(_) => StatusCode::FORBIDDEN,
            RetrievalError::NotFound(_) => StatusCode::NOT_FOUND,
            RetrievalError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        let status = if let Some(fetch) = e.downcast_ref::<FetchError>() {
            match fetch {
                FetchError::NotFound { .. } => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else if let Some(BulkError::EmptyRequest) = e.downcast_ref::<BulkError>() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        Self {
            status,
            error: e.to_string(),
            details: Some(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Serialize)]
struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

fn success<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success { success: true, data })
}

#[derive(Debug, Default, Deserialize)]
struct ProfileRequest {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequest {
    url: Option<String>,
    episode_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BulkRequest {
    episodes: Option<Vec<EpisodeDescriptor>>,
    username: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// 创建并返回API路由器
pub fn create_router(service: Arc<MixService>) -> Router {
    Router::new()
        .route("/api/mixcloud", post(list_episodes))
        .route("/api/cleanup", get(cleanup_info).post(cleanup))
        .route("/api/download-mp3", post(download_mp3))
        .route("/api/download-m4a", post(download_m4a))
        .route("/api/download-all", post(download_all))
        .route("/api/download/:filename", get(serve_download))
        .with_state(service)
}

async fn list_episodes(
    State(service): State<Arc<MixService>>,
    body: Result<Json<ProfileRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let url = non_empty(request.url).ok_or_else(|| ApiError::bad_request("URL 为必填项"))?;

    let listing = service.list_episodes(&url).await.map_err(|e| {
        warn!("获取单集列表失败: {}", e);
        ApiError::from(e)
    })?;
    Ok(success(listing))
}

async fn cleanup_info(State(service): State<Arc<MixService>>) -> impl IntoResponse {
    success(service.cleanup_info().await)
}

async fn cleanup(
    State(service): State<Arc<MixService>>,
    body: Result<Json<CleanupOverrides>, JsonRejection>,
) -> impl IntoResponse {
    // 请求体缺失或无法解析时使用默认策略
    let overrides = body.map(|Json(b)| b).unwrap_or_default();
    let report = service.cleanup(overrides).await;
    success(json!({ "cleanup": report }))
}

async fn download_mp3(
    state: State<Arc<MixService>>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    download_single(state, body, AudioFormat::Mp3).await
}

async fn download_m4a(
    state: State<Arc<MixService>>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    download_single(state, body, AudioFormat::M4a).await
}

async fn download_single(
    State(service): State<Arc<MixService>>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
    format: AudioFormat,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let (url, name) = match (non_empty(request.url), non_empty(request.episode_name)) {
        (Some(url), Some(name)) => (url, name),
        _ => return Err(ApiError::bad_request("URL 和单集名称为必填项")),
    };

    let download = service.download_single(&url, &name, format).await.map_err(|e| {
        error!("下载失败 {}: {:#}", name, e);
        ApiError::from(e)
    })?;
    Ok(success(download))
}

async fn download_all(
    State(service): State<Arc<MixService>>,
    body: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let episodes = request
        .episodes
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("单集列表为必填项"))?;

    let owner = non_empty(request.username)
        .or_else(|| non_empty(Some(episodes[0].user.username.clone())))
        .unwrap_or_else(|| "mixcloud".to_string());

    let bulk = service.download_all(&episodes, &owner).await.map_err(|e| {
        error!("批量下载失败 ({}): {:#}", owner, e);
        ApiError::from(e)
    })?;
    Ok(success(bulk))
}

// 文件下载处理函数
async fn serve_download(
    State(service): State<Arc<MixService>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let download = service.open_download(&filename).await.map_err(|e| {
        warn!("拒绝文件请求 {}: {}", filename, e);
        ApiError::from(e)
    })?;

    info!("发送文件: {} ({} 字节)", download.name, download.len);

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", download.name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let body = Body::from_stream(ReaderStream::new(download.file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, download.kind.content_type())
        .header(header::CONTENT_LENGTH, download.len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map_err(|e| {
            error!("构建响应失败: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "构建响应失败")
        })
}
