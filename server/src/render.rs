use std::fmt::Write as _;

use podium_shared::RankedEntry;

/// Render the published leaderboard as an HTML table fragment, suitable for
/// embedding in a host page. Deterministic, and valid (header only) for an
/// empty snapshot.
pub fn render_table(entries: &[RankedEntry]) -> String {
    let mut html = String::new();
    html.push_str("<table class=\"ctfd-leaderboard\">");
    html.push_str("<tr><th>#</th><th>Name</th><th>Score</th><th>Rank</th></tr>");

    for (idx, entry) in entries.iter().enumerate() {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            idx + 1,
            escape_html(&entry.name),
            escape_html(&entry.score.to_string()),
            entry.rank,
        );
    }

    html.push_str("</table>");
    html
}

/// Replace HTML-significant characters so untrusted names embed as inert
/// text.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
