use crate::client::{DetectionApi, SamplingParams};
use crate::media::SelectedFile;
use crate::submit::{SubmitError, SubmitOutcome};
use detection_types::{FrameSummary, VideoResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

pub const NO_DETECTION_PLACEHOLDER: &str = "No detection";

/// One rendered row of the video summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameLine {
    pub frame_index: u64,
    pub text: String,
}

impl FrameLine {
    pub fn from_summary(frame: &FrameSummary) -> Self {
        let text = if frame.detections.is_empty() {
            NO_DETECTION_PLACEHOLDER.to_string()
        } else {
            frame
                .detections
                .iter()
                .map(|d| d.summary_label())
                .collect::<Vec<_>>()
                .join(", ")
        };

        Self {
            frame_index: frame.frame_index,
            text,
        }
    }
}

pub fn summary_lines(result: &VideoResult) -> Vec<FrameLine> {
    result.summary.iter().map(FrameLine::from_summary).collect()
}

#[derive(Default)]
struct VideoState {
    selected: Option<Arc<SelectedFile>>,
    in_flight: bool,
    results: Option<Arc<VideoResult>>,
}

/// Clears the in-flight flag however the request ends, dropped futures included.
struct InFlightGuard<'a> {
    state: &'a Mutex<VideoState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().in_flight = false;
    }
}

#[derive(Default)]
pub struct VideoUploader {
    state: Mutex<VideoState>,
    params: SamplingParams,
}

impl VideoUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> SamplingParams {
        self.params
    }

    pub fn select_file(&self, file: Option<SelectedFile>) {
        self.state.lock().selected = file.map(Arc::new);
    }

    pub fn can_submit(&self) -> bool {
        let state = self.state.lock();
        state.selected.is_some() && !state.in_flight
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    pub fn results(&self) -> Option<Arc<VideoResult>> {
        self.state.lock().results.clone()
    }

    #[instrument(skip(self, api))]
    pub async fn submit<A: DetectionApi + ?Sized>(
        &self,
        api: &A,
    ) -> Result<SubmitOutcome<Arc<VideoResult>>, SubmitError> {
        let file = {
            let mut state = self.state.lock();
            let Some(file) = state.selected.clone() else {
                return Ok(SubmitOutcome::NoFile);
            };
            if state.in_flight {
                return Ok(SubmitOutcome::InFlight);
            }
            state.in_flight = true;
            file
        };
        self.analyse(file, api).await
    }

    /// Selects `file` and submits it in one step. While an analysis is
    /// running the call is refused and the running selection is kept.
    #[instrument(skip(self, file, api))]
    pub async fn select_and_submit<A: DetectionApi + ?Sized>(
        &self,
        file: Option<SelectedFile>,
        api: &A,
    ) -> Result<SubmitOutcome<Arc<VideoResult>>, SubmitError> {
        let file = {
            let mut state = self.state.lock();
            if state.in_flight {
                return Ok(SubmitOutcome::InFlight);
            }
            state.selected = file.map(Arc::new);
            let Some(file) = state.selected.clone() else {
                return Ok(SubmitOutcome::NoFile);
            };
            state.in_flight = true;
            file
        };
        self.analyse(file, api).await
    }

    /// Runs the upload for `file`. The in-flight flag must already be set.
    async fn analyse<A: DetectionApi + ?Sized>(
        &self,
        file: Arc<SelectedFile>,
        api: &A,
    ) -> Result<SubmitOutcome<Arc<VideoResult>>, SubmitError> {
        let _guard = InFlightGuard { state: &self.state };

        match api.predict_video(&file, self.params).await {
            Ok(result) => {
                let result = Arc::new(result);
                self.state.lock().results = Some(result.clone());
                tracing::info!(
                    "Video {} analysed: {} frames",
                    file.file_name(),
                    result.summary.len()
                );
                Ok(SubmitOutcome::Completed(result))
            }
            Err(e) => {
                tracing::error!("Video analysis of {} failed: {:?}", file.file_name(), e);
                Err(SubmitError::VideoAnalysis(e))
            }
        }
    }

    pub fn selected_file(&self) -> Option<Arc<SelectedFile>> {
        self.state.lock().selected.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_upload::tests::MockDetectionApi;
    use crate::media::tests::png_file;
    use crate::overlay::tests::detection;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn two_frame_result() -> VideoResult {
        VideoResult {
            summary: vec![
                FrameSummary {
                    frame_index: 0,
                    detections: vec![],
                },
                FrameSummary {
                    frame_index: 20,
                    detections: vec![
                        detection("poubelle", 0.8734, (0.0, 0.0, 1.0, 1.0)),
                        detection("carton", 0.5, (0.0, 0.0, 1.0, 1.0)),
                    ],
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_lines() {
        let lines = summary_lines(&two_frame_result());

        assert_eq!(
            lines,
            vec![
                FrameLine {
                    frame_index: 0,
                    text: "No detection".to_string(),
                },
                FrameLine {
                    frame_index: 20,
                    text: "poubelle (87%), carton (50%)".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_submit_without_file_makes_no_call() {
        let api = MockDetectionApi::default();
        let uploader = VideoUploader::new();

        assert!(!uploader.can_submit());
        let outcome = uploader.submit(&api).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::NoFile));
        assert_eq!(api.video_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submit_sends_fixed_sampling_params() {
        let api = MockDetectionApi {
            video_result: two_frame_result(),
            ..Default::default()
        };
        let uploader = VideoUploader::new();
        uploader.select_file(Some(png_file("clip.mp4", 1, 1)));

        let outcome = uploader.submit(&api).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Completed(ref r) if r.summary.len() == 2));
        assert_eq!(
            *api.last_params.lock(),
            Some(SamplingParams {
                frame_stride: 10,
                max_frames: 50
            })
        );
        assert!(!uploader.is_in_flight());
        assert_eq!(uploader.results().unwrap().summary.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_results() {
        let ok_api = MockDetectionApi {
            video_result: two_frame_result(),
            ..Default::default()
        };
        let failing_api = MockDetectionApi {
            fail: AtomicBool::new(true),
            ..Default::default()
        };
        let uploader = VideoUploader::new();
        uploader.select_file(Some(png_file("clip.mp4", 1, 1)));
        uploader.submit(&ok_api).await.unwrap();
        let before = uploader.results().unwrap();

        let err = uploader.submit(&failing_api).await.unwrap_err();

        assert!(err.to_string().starts_with("Video analysis failed"));
        assert!(!uploader.is_in_flight());
        assert!(uploader.can_submit());
        assert!(Arc::ptr_eq(&before, &uploader.results().unwrap()));
    }

    #[tokio::test]
    async fn test_submit_while_in_flight_is_rejected() {
        let api = Arc::new(MockDetectionApi {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let uploader = Arc::new(VideoUploader::new());
        uploader.select_file(Some(png_file("clip.mp4", 1, 1)));

        let running = {
            let api = api.clone();
            let uploader = uploader.clone();
            tokio::spawn(async move { uploader.submit(api.as_ref()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(uploader.is_in_flight());
        assert!(!uploader.can_submit());
        let outcome = uploader.submit(api.as_ref()).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::InFlight));

        running.await.unwrap().unwrap();
        assert!(!uploader.is_in_flight());
        assert_eq!(api.video_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_select_and_submit_keeps_running_file() {
        let api = Arc::new(MockDetectionApi {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let uploader = Arc::new(VideoUploader::new());

        let running = {
            let api = api.clone();
            let uploader = uploader.clone();
            tokio::spawn(async move {
                uploader
                    .select_and_submit(Some(png_file("a.mp4", 1, 1)), api.as_ref())
                    .await
            })
        };
        while !uploader.is_in_flight() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let outcome = uploader
            .select_and_submit(Some(png_file("b.mp4", 1, 1)), api.as_ref())
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::InFlight));
        assert_eq!(uploader.selected_file().unwrap().file_name(), "a.mp4");

        let first = running.await.unwrap().unwrap();
        assert!(matches!(first, SubmitOutcome::Completed(_)));
        assert_eq!(*api.uploaded.lock(), vec!["a.mp4".to_string()]);
    }
}
