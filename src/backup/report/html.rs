use crate::backup::artifact::ArtifactResult;
use crate::backup::events::{EventLevel, LogEvent};
use crate::backup::report::pretty_size;
use chrono::{DateTime, Local};
use std::fmt::Write;

static BORDER: &str = "border: 1px solid #2185d0;";
static CELL: &str = "border: 1px solid #2185d0; padding: 5px;";

fn level_color(level: EventLevel) -> &'static str {
    match level {
        EventLevel::Info => "white",
        EventLevel::Warn => "#fbbd08",
        EventLevel::Error => "#db2828",
    }
}

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Result table followed by the run's event list.
pub fn render(started: DateTime<Local>, records: &[ArtifactResult], events: &[LogEvent]) -> String {
    let mut html = String::new();
    // writing into a String cannot fail
    let _ = write!(
        html,
        "<div style='font-family: Sans Serif;'><div style='padding-bottom: 20px;'>Backup results at {}</div>",
        started.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = write!(
        html,
        "<table style='border-collapse: collapse; {BORDER}'><thead><tr style='background: #2185d0; color: white;'>\
         <th>Host</th><th>Area</th><th>Item</th><th>Result</th><th>Size</th></tr></thead>\n"
    );
    for record in records {
        let status = if *record.success() {
            format!("<td style='{CELL} background: #21ba45;'>OK</td>")
        } else {
            format!("<td style='{CELL} background: #db2828;'>ERROR</td>")
        };
        let size = record.size().map(pretty_size).unwrap_or_default();
        let _ = write!(
            html,
            "<tr style='{BORDER}'><td style='{CELL}'>{}</td><td style='{CELL}'>{}</td><td style='{CELL}'>{}</td>{}<td style='{CELL}'>{}</td></tr>\n",
            escape(record.host()),
            record.area(),
            escape(record.name()),
            status,
            size
        );
    }
    html.push_str("</table>");

    html.push_str("<hr><div style='background: #333;'>");
    for event in events {
        let _ = write!(
            html,
            "<pre style='color: {}; margin: 0;'>{} - {} - {}</pre>\n",
            level_color(event.level),
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.level,
            escape(&event.to_string())
        );
    }
    html.push_str("</div></div>");
    html
}
