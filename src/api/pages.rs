//! Minimal HTML pages for the browser-facing routes.

/// Escapes text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Renders a status page. `link` is an optional `(href, label)` pair.
pub fn status_page(title: &str, message: &str, link: Option<(&str, &str)>) -> String {
    let link_html = link.map_or(String::new(), |(href, label)| {
        format!(
            "    <p><a href=\"{}\">{}</a></p>\n",
            escape_html(href),
            escape_html(label)
        )
    });

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
    <h1>{title}</h1>
    <p>{message}</p>
{link_html}</body>
</html>"#,
        title = escape_html(title),
        message = escape_html(message),
        link_html = link_html
    )
}
