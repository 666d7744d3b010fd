use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::constants::PROVIDER_TIMEOUT;
use crate::error::ProviderError;
use crate::types::EpisodeDescriptor;

const USER_AGENT: &str = concat!("rust-mixcloud-dl/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Default, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CloudcastPage {
    #[serde(default)]
    data: Vec<EpisodeDescriptor>,
    #[serde(default)]
    paging: Paging,
}

/// 从 Mixcloud 个人主页地址中取出用户名
pub fn parse_username(profile_url: &str) -> Result<String, ProviderError> {
    let invalid = || ProviderError::InvalidUrl(profile_url.to_string());

    let url = Url::parse(profile_url.trim()).map_err(|_| invalid())?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid());
    }
    match url.host_str() {
        Some("mixcloud.com") | Some("www.mixcloud.com") => {}
        _ => return Err(invalid()),
    }

    url.path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .map(|s| s.to_string())
        .ok_or_else(invalid)
}

pub struct MixcloudClient {
    client: Client,
    base_url: String,
    max_pages: u32,
}

impl MixcloudClient {
    pub fn new(base_url: &str, max_pages: u32) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(*PROVIDER_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_pages: max_pages.max(1),
        })
    }

    /// 获取用户的全部单集，沿 paging.next 翻页直到页数上限
    pub async fn fetch_episodes(&self, username: &str) -> Result<Vec<EpisodeDescriptor>, ProviderError> {
        let mut next = Some(format!("{}/{}/cloudcasts/", self.base_url, username));
        let mut episodes = Vec::new();
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages >= self.max_pages {
                warn!("已达到翻页上限 {}，停止获取 {} 的单集", self.max_pages, username);
                break;
            }
            pages += 1;

            debug!("请求 Mixcloud API: {}", url);
            let response = self.client.get(&url).send().await?;

            match response.status() {
                status if status.is_success() => {}
                StatusCode::NOT_FOUND => return Err(ProviderError::UserNotFound(username.to_string())),
                status => return Err(ProviderError::Status(status.as_u16())),
            }

            let page: CloudcastPage = response.json().await?;
            episodes.extend(page.data);
            next = page.paging.next.filter(|n| !n.is_empty());
        }

        info!("获取到 {} 的 {} 个单集 ({} 页)", username, episodes.len(), pages);
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn parses_profile_urls() {
        assert_eq!(parse_username("https://www.mixcloud.com/dj/").unwrap(), "dj");
        assert_eq!(parse_username("http://mixcloud.com/dj").unwrap(), "dj");
        assert_eq!(
            parse_username("https://www.mixcloud.com/dj/some-set/").unwrap(),
            "dj"
        );
        assert_eq!(parse_username("  https://www.mixcloud.com/dj/  ").unwrap(), "dj");
    }

    #[test]
    fn rejects_foreign_or_incomplete_urls() {
        for bad in [
            "https://soundcloud.com/dj/",
            "https://www.mixcloud.com/",
            "ftp://www.mixcloud.com/dj/",
            "mixcloud.com/dj",
            "",
        ] {
            assert!(
                matches!(parse_username(bad), Err(ProviderError::InvalidUrl(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    fn cloudcast(i: u32) -> serde_json::Value {
        json!({
            "key": format!("/dj/set-{}/", i),
            "name": format!("Set {}", i),
            "url": format!("https://www.mixcloud.com/dj/set-{}/", i),
            "user": {"name": "DJ", "username": "dj"},
            "created_time": "2024-05-01T20:00:00Z",
            "audio_length": 3600 + i,
            "play_count": 10,
            "pictures": {"medium": "https://thumbs/m.jpg"}
        })
    }

    // 本地模拟的分页 API：dj 有两页，其他用户不存在
    async fn spawn_fake_api() -> String {
        async fn cloudcasts(
            State(base): State<String>,
            Path(user): Path<String>,
            Query(query): Query<HashMap<String, String>>,
        ) -> impl IntoResponse {
            if user != "dj" {
                return (AxumStatus::NOT_FOUND, Json(json!({"error": {"type": "NotFound"}})));
            }
            let body = if query.get("offset").map(String::as_str) == Some("2") {
                json!({"data": [cloudcast(3)], "paging": {"previous": "x"}})
            } else {
                json!({
                    "data": [cloudcast(1), cloudcast(2)],
                    "paging": {"next": format!("{}/dj/cloudcasts/?offset=2", base)}
                })
            };
            (AxumStatus::OK, Json(body))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route("/:user/cloudcasts/", get(cloudcasts))
            .with_state(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    #[tokio::test]
    async fn follows_paging_next() {
        let base = spawn_fake_api().await;
        let client = MixcloudClient::new(&base, 20).unwrap();

        let episodes = client.fetch_episodes("dj").await.unwrap();

        let names: Vec<&str> = episodes.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Set 1", "Set 2", "Set 3"]);
        assert_eq!(episodes[0].user.username, "dj");
        assert_eq!(episodes[2].audio_length, Some(3603));
        assert_eq!(episodes[0].comment_count, None);
    }

    #[tokio::test]
    async fn page_cap_limits_requests() {
        let base = spawn_fake_api().await;
        let client = MixcloudClient::new(&base, 1).unwrap();

        let episodes = client.fetch_episodes("dj").await.unwrap();
        assert_eq!(episodes.len(), 2);
    }

    #[tokio::test]
    async fn unknown_user_is_user_not_found() {
        let base = spawn_fake_api().await;
        let client = MixcloudClient::new(&base, 20).unwrap();

        let err = client.fetch_episodes("ghost").await.unwrap_err();
        assert!(matches!(err, ProviderError::UserNotFound(user) if user == "ghost"));
    }
}
