use serde::{Deserialize, Serialize};

/// One photo to process, as handed over by the submitting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub external_image_id: String,
    /// Opaque locator understood by the configured `ImageSource`.
    pub readable_locator: String,
    pub spatial_context_id: String,
}

/// A job: one unit of work per image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub job_id: String,
    pub images: Vec<ImageDescriptor>,
}
