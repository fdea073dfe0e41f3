use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::collections::HashSet;

pub struct Metrics {
    request_counter: IntCounterVec,
    detection_api_duration: HistogramVec,
    detection_counter: IntCounterVec,
    failure_counter: IntCounterVec,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_counter = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests"),
            &["route"],
        )?;

        let boundaries = generate_boundaries((50, 250, 1000, 5000, 30000));

        let detection_api_duration = HistogramVec::new(
            HistogramOpts::new(
                "detection_api_duration_ms",
                "Duration of detection API calls in milliseconds",
            )
            .buckets(boundaries),
            &["flow"],
        )?;

        let detection_counter = IntCounterVec::new(
            Opts::new("detections_total", "Detections returned by the detection API"),
            &["flow"],
        )?;

        let failure_counter = IntCounterVec::new(
            Opts::new("detection_api_failures_total", "Failed detection API calls"),
            &["flow"],
        )?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(detection_api_duration.clone()))?;
        registry.register(Box::new(detection_counter.clone()))?;
        registry.register(Box::new(failure_counter.clone()))?;

        Ok(Metrics {
            request_counter,
            detection_api_duration,
            detection_counter,
            failure_counter,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_api_call(&self, flow: &str, duration_ms: u64, detections: Option<usize>) {
        self.detection_api_duration
            .with_label_values(&[flow])
            .observe(duration_ms as f64);
        match detections {
            Some(count) => self
                .detection_counter
                .with_label_values(&[flow])
                .inc_by(count as u64),
            None => self.failure_counter.with_label_values(&[flow]).inc(),
        }
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 50;
    let middle_step: usize = 250;
    let end_step: usize = 1000;
    let tail_step: usize = 5000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
