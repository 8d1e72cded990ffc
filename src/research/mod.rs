//! 研究 / 资料补全提供方
//!
//! enrich_person(name) 依次尝试 Google Custom Search（需 GOOGLE_API_KEY 与 GOOGLE_CSE_ID）与 Wikipedia 摘要接口，
//! 都没有结果时返回 `{source: "none"}`。网络错误只降级到下一个来源，不向上抛。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const GOOGLE_CSE_URL: &str = "https://www.googleapis.com/customsearch/v1";
const WIKIPEDIA_SUMMARY_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/summary/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchSource {
    Google,
    Wikipedia,
    Local,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub source: ResearchSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchHit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ResearchResult {
    /// 未找到
    pub fn none() -> Self {
        Self::empty(ResearchSource::None)
    }

    pub fn empty(source: ResearchSource) -> Self {
        Self {
            source,
            title: None,
            description: None,
            extract: None,
            url: None,
            results: None,
            summary: None,
        }
    }
}

#[async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn enrich_person(&self, name: &str) -> Result<ResearchResult, String>;
}

/// 不联网：总是返回 none
#[derive(Debug, Clone, Default)]
pub struct NoResearch;

#[async_trait]
impl ResearchProvider for NoResearch {
    async fn enrich_person(&self, _name: &str) -> Result<ResearchResult, String> {
        Ok(ResearchResult::none())
    }
}

/// 本地固定结果（离线演示与测试）
#[derive(Debug, Clone)]
pub struct LocalResearch {
    summary: String,
}

impl LocalResearch {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

#[async_trait]
impl ResearchProvider for LocalResearch {
    async fn enrich_person(&self, name: &str) -> Result<ResearchResult, String> {
        let mut r = ResearchResult::empty(ResearchSource::Local);
        r.title = Some(name.to_string());
        r.summary = Some(self.summary.clone());
        Ok(r)
    }
}

/// Google CSE → Wikipedia → none
pub struct SmartResearchProvider {
    client: Client,
    google: Option<(String, String)>,
    google_url: String,
    wikipedia_url: String,
}

impl SmartResearchProvider {
    pub fn new(timeout_secs: u64, google_api_key: Option<String>, google_cse_id: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("omnisense/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        let google = match (google_api_key, google_cse_id) {
            (Some(k), Some(cx)) if !k.is_empty() && !cx.is_empty() => Some((k, cx)),
            _ => None,
        };
        Self {
            client,
            google,
            google_url: GOOGLE_CSE_URL.to_string(),
            wikipedia_url: WIKIPEDIA_SUMMARY_URL.to_string(),
        }
    }

    /// 从环境变量读取 Google 凭据
    pub fn from_env(timeout_secs: u64) -> Self {
        Self::new(
            timeout_secs,
            std::env::var("GOOGLE_API_KEY").ok(),
            std::env::var("GOOGLE_CSE_ID").ok(),
        )
    }

    /// 替换接口地址（自建代理）
    pub fn with_endpoints(mut self, google_url: impl Into<String>, wikipedia_url: impl Into<String>) -> Self {
        self.google_url = google_url.into();
        self.wikipedia_url = wikipedia_url.into();
        self
    }

    async fn google_search(&self, name: &str) -> anyhow::Result<Option<ResearchResult>> {
        let Some((key, cx)) = &self.google else {
            return Ok(None);
        };
        let res = self
            .client
            .get(&self.google_url)
            .query(&[("q", name), ("num", "3"), ("key", key.as_str()), ("cx", cx.as_str())])
            .send()
            .await?;
        if !res.status().is_success() {
            return Ok(None);
        }
        let body: Value = res.json().await?;
        let hits: Vec<SearchHit> = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .take(3)
                    .map(|it| SearchHit {
                        title: str_field(it, "title").unwrap_or_default(),
                        link: str_field(it, "link").unwrap_or_default(),
                        snippet: str_field(it, "snippet"),
                        display_link: str_field(it, "displayLink"),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if hits.is_empty() {
            return Ok(None);
        }
        let summary = hits
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{}. {} - {}", i + 1, h.title, h.snippet.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n");
        let mut r = ResearchResult::empty(ResearchSource::Google);
        r.results = Some(hits);
        r.summary = Some(summary);
        Ok(Some(r))
    }

    async fn wikipedia_summary(&self, name: &str) -> anyhow::Result<Option<ResearchResult>> {
        let mut url = Url::parse(&self.wikipedia_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("wikipedia url cannot be a base"))?
            .pop_if_empty()
            .push(name);
        let res = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if !res.status().is_success() {
            return Ok(None);
        }
        let body: Value = res.json().await?;
        let page_url = body
            .pointer("/content_urls/desktop/page")
            .or_else(|| body.pointer("/content_urls/mobile/page"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut r = ResearchResult::empty(ResearchSource::Wikipedia);
        r.title = str_field(&body, "title");
        r.description = str_field(&body, "description");
        r.extract = str_field(&body, "extract");
        r.url = page_url;
        Ok(Some(r))
    }
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl ResearchProvider for SmartResearchProvider {
    async fn enrich_person(&self, name: &str) -> Result<ResearchResult, String> {
        match self.google_search(name).await {
            Ok(Some(r)) => return Ok(r),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "google search failed"),
        }
        match self.wikipedia_summary(name).await {
            Ok(Some(r)) => return Ok(r),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "wikipedia lookup failed"),
        }
        Ok(ResearchResult::none())
    }
}
