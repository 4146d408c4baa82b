//! The fixed 404 and 500 documents.
//!
//! Both bodies are part of the compatibility contract and are not
//! configurable. The 500 document deliberately includes the failing module's
//! name, the error message, and a backtrace — all HTML-escaped. Leaking the
//! backtrace to clients is a known property of this design; deployments that
//! care should front the server with something that rewrites error bodies.

/// The fixed not-found document.
pub const NOT_FOUND_PAGE: &str = "<html><head><title>404 - Not Found</title></head>\
<body><h1>404 - Not Found</h1></body></html>";

/// Escape text for embedding in an HTML body.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the fixed internal-error document.
pub fn error_page(module_name: &str, message: &str, backtrace: &str) -> String {
    format!(
        "<html><head><title>500 - Internal Server Error</title></head><body>\
<h1>500 - Internal Server Error</h1>\
<p>Module: <b>{}</b></p>\
<p>{}</p>\
<pre>{}</pre>\
</body></html>",
        escape_html(module_name),
        escape_html(message),
        escape_html(backtrace),
    )
}
