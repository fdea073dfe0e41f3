use crate::client::DetectionApi;
use crate::media::SelectedFile;
use crate::submit::{RequestTokens, SubmitError, SubmitOutcome};
use detection_types::ImageResult;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::instrument;

/// A successful image submit: what the overlay needs to draw.
#[derive(Debug, Clone)]
pub struct ImageSubmission {
    pub result: Arc<ImageResult>,
    pub file: Arc<SelectedFile>,
}

#[derive(Default)]
pub struct ImageUploader {
    selected: Mutex<Option<Arc<SelectedFile>>>,
    tokens: RequestTokens,
}

impl ImageUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_file(&self, file: Option<SelectedFile>) {
        *self.selected.lock() = file.map(Arc::new);
    }

    pub fn selected_file(&self) -> Option<Arc<SelectedFile>> {
        self.selected.lock().clone()
    }

    pub fn can_submit(&self) -> bool {
        self.selected.lock().is_some()
    }

    /// Uploads the selected file. Repeated submits are not de-duplicated;
    /// only the response of the most recent one is handed back.
    #[instrument(skip(self, api))]
    pub async fn submit<A: DetectionApi + ?Sized>(
        &self,
        api: &A,
    ) -> Result<SubmitOutcome<ImageSubmission>, SubmitError> {
        let (file, token) = {
            let selected = self.selected.lock();
            let Some(file) = selected.clone() else {
                return Ok(SubmitOutcome::NoFile);
            };
            (file, self.tokens.issue())
        };
        self.upload(file, token, api).await
    }

    /// Selects `file` and submits it in one step, so the upload always
    /// carries the file given here.
    #[instrument(skip(self, file, api))]
    pub async fn select_and_submit<A: DetectionApi + ?Sized>(
        &self,
        file: Option<SelectedFile>,
        api: &A,
    ) -> Result<SubmitOutcome<ImageSubmission>, SubmitError> {
        let (file, token) = {
            let mut selected = self.selected.lock();
            *selected = file.map(Arc::new);
            let Some(file) = selected.clone() else {
                return Ok(SubmitOutcome::NoFile);
            };
            (file, self.tokens.issue())
        };
        self.upload(file, token, api).await
    }

    async fn upload<A: DetectionApi + ?Sized>(
        &self,
        file: Arc<SelectedFile>,
        token: u64,
        api: &A,
    ) -> Result<SubmitOutcome<ImageSubmission>, SubmitError> {
        let result = match api.predict_image(&file).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Image upload of {} failed: {:?}", file.file_name(), e);
                return Err(SubmitError::ImageUpload(e));
            }
        };

        if !self.tokens.is_latest(token) {
            tracing::debug!("Dropping stale image response for request {}", token);
            return Ok(SubmitOutcome::Superseded);
        }

        Ok(SubmitOutcome::Completed(ImageSubmission {
            result: Arc::new(result),
            file,
        }))
    }
}
