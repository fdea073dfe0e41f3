use crate::{server::SharedState, video_upload::summary_lines};
use axum::{extract::State, response::Html};
use detection_types::{ImageStats, VideoStats};
use std::fmt::Write;

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Object detection</title>
</head>
<body>
<h1>Object detection</h1>
"#;

const PAGE_TAIL: &str = "</body>\n</html>\n";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn image_stats_html(stats: &ImageStats) -> String {
    match stats.mean_confidence {
        Some(mean) => format!(
            "<p>{} detection(s), mean confidence {:.2}</p>\n",
            stats.detection_count, mean
        ),
        None => "<p>0 detection(s)</p>\n".to_string(),
    }
}

fn video_stats_html(stats: &VideoStats) -> String {
    format!(
        "<p>{} frame(s) analysed, {} detection(s), {:.2} per frame</p>\n",
        stats.frames_analyzed, stats.total_detections, stats.mean_per_frame
    )
}

pub async fn index(State(state): State<SharedState>) -> Html<String> {
    state.metrics.record_request("/");
    let frontend = &state.frontend;
    let mut page = String::from(PAGE_HEAD);

    if let Some(message) = frontend.last_notification() {
        let _ = writeln!(page, "<p role=\"alert\">{}</p>", escape_html(&message));
    }

    page.push_str(
        r#"<section>
<h2>Image</h2>
<form action="/image" method="post" enctype="multipart/form-data">
<input type="file" name="file" accept="image/*" required>
<button type="submit">Detect</button>
</form>
"#,
    );
    let drawn = !frontend.overlay.with_surface(|surface| surface.is_blank());
    if let (true, Some(result)) = (drawn, frontend.overlay.current_result()) {
        page.push_str("<img src=\"/image/overlay\" alt=\"Detections\">\n");
        page.push_str(&image_stats_html(&result.stats()));
    }
    page.push_str("</section>\n");

    let video = &frontend.video;
    let disabled = if video.is_in_flight() { " disabled" } else { "" };
    let _ = write!(
        page,
        r#"<section>
<h2>Video</h2>
<form action="/video" method="post" enctype="multipart/form-data">
<input type="file" name="file" accept="video/*" required>
<button type="submit"{}>Analyse</button>
</form>
"#,
        disabled
    );
    if video.is_in_flight() {
        page.push_str("<p>Analysis in progress...</p>\n");
    }
    if let Some(result) = video.results() {
        page.push_str("<ul>\n");
        for line in summary_lines(&result) {
            let _ = writeln!(
                page,
                "<li>Frame {}: {}</li>",
                line.frame_index,
                escape_html(&line.text)
            );
        }
        page.push_str("</ul>\n");
        page.push_str(&video_stats_html(&result.stats()));
    }
    page.push_str("</section>\n");

    page.push_str(PAGE_TAIL);
    Html(page)
}
