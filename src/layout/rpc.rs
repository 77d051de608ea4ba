use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{LayoutClassifier, PageImage};
use crate::document::{Rect, Region, RegionKind};
use crate::errors::LayoutError;

/// One detection of a DocLayout server
#[derive(Debug, Deserialize)]
pub struct DetectedBox {
    /// x0, y0, x1, y1 in pixels of the submitted image
    pub xyxy: [f32; 4],
    pub conf: f32,
    pub cls: u32,
}

/// DocLayout inference response
#[derive(Debug, Deserialize)]
pub struct InferenceResponse {
    pub boxes: Vec<DetectedBox>,
    /// Class index (as string) to class name
    pub names: HashMap<String, String>,
}

/// Map a DocLayout class name to a region kind, `None` for ignored classes
pub fn map_class_name(name: &str) -> Option<RegionKind> {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "title" => Some(RegionKind::Title),
        "plain text" | "table_footnote" => Some(RegionKind::Text),
        "figure" => Some(RegionKind::Figure),
        "isolate_formula" => Some(RegionKind::Formula),
        "table" => Some(RegionKind::Table),
        other if other.ends_with("_caption") => Some(RegionKind::Text),
        _ => None,
    }
}

impl InferenceResponse {
    /// Regions in pixel space, unknown classes dropped
    pub fn into_regions(self) -> Vec<Region> {
        let names = self.names;
        self.boxes
            .into_iter()
            .filter_map(|detection| {
                let name = names.get(&detection.cls.to_string())?;
                let kind = map_class_name(name)?;
                let [x0, y0, x1, y1] = detection.xyxy;
                Some(Region::new(Rect::new(x0, y0, x1, y1), kind, detection.conf))
            })
            .collect()
    }
}

/// Layout classifier backed by a remote DocLayout inference server
#[derive(Debug, Clone)]
pub struct RpcLayoutClassifier {
    /// HTTP client for API requests
    client: Client,
    /// Server base URL
    host: String,
}

impl RpcLayoutClassifier {
    /// Create a client for `host`, with or without scheme
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("http://{}", host)
        };
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            host: host.trim_end_matches('/').to_string(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl LayoutClassifier for RpcLayoutClassifier {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn classify(&self, page: &PageImage) -> Result<Vec<Region>, LayoutError> {
        let body = page.to_png()?;
        let url = format!("{}/inference", self.host);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "image/png")
            .body(body)
            .send()
            .await
            .map_err(|e| LayoutError::Unavailable(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Layout server error ({}): {}", status, error_text);
            return Err(if status.is_server_error() {
                LayoutError::Unavailable(format!("{} - {}", status, error_text))
            } else {
                LayoutError::InvalidResponse(format!("{} - {}", status, error_text))
            });
        }

        let parsed = response
            .json::<InferenceResponse>()
            .await
            .map_err(|e| LayoutError::InvalidResponse(e.to_string()))?;

        let regions = parsed.into_regions();
        debug!("Layout server returned {} regions", regions.len());
        Ok(regions)
    }

    async fn health_check(&self) -> Result<(), LayoutError> {
        // Any HTTP answer means the server is up
        self.client
            .get(&self.host)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| LayoutError::Unavailable(format!("{}: {}", self.host, e)))
    }
}
