//! Image resolution for the Scaleway backend.

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};
use tracing::warn;

use crate::backend::ServerRequest;

use super::{ScalewayBackend, ScalewayBackendError};

const AVAILABLE: &str = "available";

impl ScalewayBackend {
    /// Resolves the request's image label to an image identifier.
    ///
    /// The newest available image matching the label wins. When nothing
    /// matches, the first available public image for the architecture is
    /// used instead.
    pub(super) async fn resolve_image_id(
        &self,
        request: &ServerRequest,
    ) -> Result<String, ScalewayBackendError> {
        let labelled = self
            .list_public_images(request, Some(&request.image_label))
            .await?;
        if let Some(id) = newest_available(labelled, &request.architecture) {
            return Ok(id);
        }

        let fallback = self.list_public_images(request, None).await?;
        let id = first_available(fallback, &request.architecture).ok_or_else(|| {
            ScalewayBackendError::ImageNotFound {
                label: request.image_label.clone(),
                arch: request.architecture.clone(),
                zone: request.zone.clone(),
            }
        })?;
        warn!(
            label = %request.image_label,
            arch = %request.architecture,
            image_id = %id,
            "no image matches label; using first available image"
        );
        Ok(id)
    }

    async fn list_public_images(
        &self,
        request: &ServerRequest,
        label: Option<&str>,
    ) -> Result<Vec<ScalewayImage>, ScalewayBackendError> {
        let mut builder = ScalewayListInstanceImagesBuilder::new(self.api.clone(), &request.zone)
            .public(true)
            .arch(&request.architecture);
        if let Some(name) = label {
            builder = builder.name(name);
        }
        builder.run_async().await.map_err(ScalewayBackendError::from)
    }
}

fn usable(image: &ScalewayImage, arch: &str) -> bool {
    image.arch == arch && image.state == AVAILABLE
}

/// Picks the most recently created usable image.
pub(super) fn newest_available(images: Vec<ScalewayImage>, arch: &str) -> Option<String> {
    images
        .into_iter()
        .filter(|image| usable(image, arch))
        .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
        .map(|image| image.id)
}

/// Picks the first usable image in listing order.
pub(super) fn first_available(images: Vec<ScalewayImage>, arch: &str) -> Option<String> {
    images
        .into_iter()
        .find(|image| usable(image, arch))
        .map(|image| image.id)
}
