use std::fmt::Write;

use crate::summary::DetectionSummary;

const DASHBOARD_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Bird CCTV</title>
  <style>
    body { margin: 0; font-family: system-ui, sans-serif; background: #0f172a; color: #e2e8f0; }
    header { padding: 1rem 1.5rem; background: #111c33; border-bottom: 1px solid #1e293b; }
    main { display: flex; flex-wrap: wrap; gap: 1.5rem; padding: 1.5rem; }
    .feed img { max-width: 100%; border: 2px solid #1e293b; border-radius: 6px; }
    .panel { min-width: 16rem; background: #111c33; border-radius: 6px; padding: 1rem 1.25rem; }
    .panel h2 { margin-top: 0; font-size: 1.1rem; }
    dt { color: #94a3b8; font-size: 0.85rem; }
    dd { margin: 0 0 0.75rem 0; font-size: 1.05rem; }
  </style>
</head>
<body>
  <header><h1>Bird CCTV</h1></header>
  <main>
    <section class="feed"><img src="/video_feed" alt="Live camera feed" /></section>
    <section class="panel">
      <h2>Detections</h2>
      <dl>
        <dt>Tracking</dt><dd>{{labels}}</dd>
        <dt>Detection</dt><dd>{{model}}</dd>
        <dt>Objects in view</dt><dd>{{count}}</dd>
        <dt>Last updated</dt><dd>{{last_updated}}</dd>
      </dl>
      <ul>{{label_counts}}</ul>
    </section>
  </main>
</body>
</html>
"#;

/// Values shown on the dashboard besides the live summary.
pub struct DashboardView<'a> {
    pub labels_display: &'a str,
    pub model_status: &'a str,
    pub detection_enabled: bool,
}

pub fn render(view: &DashboardView<'_>, summary: &DetectionSummary) -> String {
    let mut label_counts = String::new();
    for (label, count) in &summary.labels {
        let _ = write!(label_counts, "<li>{}: {count}</li>", escape(label));
    }
    if label_counts.is_empty() {
        label_counts.push_str("<li>None</li>");
    }
    let model = if view.detection_enabled {
        format!("enabled ({})", escape(view.model_status))
    } else {
        escape(view.model_status)
    };

    DASHBOARD_HTML
        .replace("{{labels}}", &escape(view.labels_display))
        .replace("{{model}}", &model)
        .replace("{{count}}", &summary.count.to_string())
        .replace("{{last_updated}}", &summary.last_updated_text())
        .replace("{{label_counts}}", &label_counts)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
