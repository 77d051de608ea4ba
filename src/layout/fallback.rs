use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

use super::{LayoutClassifier, PageImage};
use crate::document::Region;
use crate::errors::LayoutError;

/// Tries a primary classifier and falls back to a secondary when the primary
/// is unavailable. Other errors are returned as is.
#[derive(Debug, Clone)]
pub struct FallbackClassifier {
    primary: Arc<dyn LayoutClassifier>,
    secondary: Arc<dyn LayoutClassifier>,
}

impl FallbackClassifier {
    pub fn new(primary: Arc<dyn LayoutClassifier>, secondary: Arc<dyn LayoutClassifier>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl LayoutClassifier for FallbackClassifier {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn classify(&self, page: &PageImage) -> Result<Vec<Region>, LayoutError> {
        match self.primary.classify(page).await {
            Err(LayoutError::Unavailable(reason)) => {
                warn!(
                    "Layout classifier '{}' unavailable ({}), using '{}'",
                    self.primary.name(),
                    reason,
                    self.secondary.name()
                );
                self.secondary.classify(page).await
            }
            other => other,
        }
    }

    async fn health_check(&self) -> Result<(), LayoutError> {
        if let Err(e) = self.primary.health_check().await {
            warn!("Primary layout classifier failed health check: {}", e);
            return self.secondary.health_check().await;
        }
        Ok(())
    }
}
