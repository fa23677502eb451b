//! Diagnostic Pages
//!
//! Built with plain string formatting. Nothing here goes through the
//! template compiler, so the page itself cannot fail to compile.
//!
//! Diagnostic messages and the template name are HTML-encoded. A message
//! containing `<`, `&` or quotes therefore differs from a raw `{message}`
//! rendering inside the `<li>` entries; the fragment's structure does not.

use crate::compiler::{FailureStage, ViewFailure};
use crate::markup::encode_html;

/// The error detail fragment: template name and one `<li>` per diagnostic.
pub fn error_details(failure: &ViewFailure) -> String {
    let items: Vec<String> = failure
        .diagnostics
        .iter()
        .map(|d| {
            format!(
                "<li>Line: {} Column: {} - {}</li>",
                d.line,
                d.column,
                encode_html(&d.message)
            )
        })
        .collect();

    format!(
        "Template: <strong>{}</strong><br/><br/>Errors:<ul>{}</ul>",
        encode_html(&failure.template),
        items.join("\n")
    )
}

/// A complete HTML document around `error_details`.
pub fn render_page(failure: &ViewFailure) -> String {
    let title = match failure.stage {
        FailureStage::Compilation => "View compilation failed",
        FailureStage::Execution => "View rendering failed",
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{details}\n</body>\n</html>\n",
        title = title,
        details = error_details(failure)
    )
}
