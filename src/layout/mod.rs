/*!
 * Layout classification: page raster in, typed regions out.
 *
 * - `raster`: renders a page of the intermediate layer to a grayscale image
 * - `local`: in-process block classifier (text / figure)
 * - `rpc`: remote DocLayout inference server
 * - `fallback`: primary classifier with a fallback on unavailability
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::document::Region;
use crate::errors::LayoutError;

/// Common trait for layout classifiers
///
/// Regions are returned in the pixel space of the submitted image; use
/// `PageImage::to_page_space` to map them back to points.
#[async_trait]
pub trait LayoutClassifier: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Classify the regions of one page
    async fn classify(&self, page: &PageImage) -> Result<Vec<Region>, LayoutError>;

    /// Check that the backend can be reached
    async fn health_check(&self) -> Result<(), LayoutError>;
}

pub mod fallback;
pub mod local;
pub mod raster;
pub mod rpc;

pub use self::fallback::FallbackClassifier;
pub use self::local::RasterBlockClassifier;
pub use self::raster::{PageImage, REFERENCE_RESOLUTION};
pub use self::rpc::RpcLayoutClassifier;
