//! Server-side HTML for the single form page.

use axum::response::Html;
use std::fmt::Write;

use crate::executor::ExecutionResult;

pub const GENERIC_ERROR: &str = "An error occurred";

/// Exactly one of these is rendered per response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// The input form, optionally with a validation message and the text
    /// that was submitted.
    Form {
        error: Option<String>,
        text: String,
    },
    Success {
        raw_text: String,
        sanitized_text: String,
        output: String,
        elapsed_ms: u64,
    },
    /// Generic error page. `text` goes back into the form; `input` is the
    /// sanitized text that was run, when there was one.
    Error {
        message: String,
        details: String,
        text: String,
        input: Option<String>,
    },
    TooManyRequests,
}

impl Page {
    pub fn form() -> Self {
        Page::Form {
            error: None,
            text: String::new(),
        }
    }

    pub fn invalid(message: impl Into<String>, text: impl Into<String>) -> Self {
        Page::Form {
            error: Some(message.into()),
            text: text.into(),
        }
    }

    pub fn error(details: impl Into<String>) -> Self {
        Page::Error {
            message: GENERIC_ERROR.to_string(),
            details: details.into(),
            text: String::new(),
            input: None,
        }
    }

    /// Error page for a run that failed, echoing what was submitted.
    pub fn process_error(
        details: impl Into<String>,
        raw_text: impl Into<String>,
        sanitized_text: impl Into<String>,
    ) -> Self {
        Page::Error {
            message: GENERIC_ERROR.to_string(),
            details: details.into(),
            text: raw_text.into(),
            input: Some(sanitized_text.into()),
        }
    }

    /// Page for a finished submission.
    pub fn from_result(result: ExecutionResult, raw_text: String, sanitized_text: String) -> Self {
        match result {
            ExecutionResult::Success { output, elapsed_ms } => Page::Success {
                raw_text,
                sanitized_text,
                output,
                elapsed_ms,
            },
            ExecutionResult::ValidationError { message } => Page::invalid(message, raw_text),
            ExecutionResult::ProcessError { message } => {
                Page::process_error(message, raw_text, sanitized_text)
            }
        }
    }

    pub fn render(&self) -> Html<String> {
        Html(render_page(self))
    }
}

/// Escape text for use in element content and quoted attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_page(page: &Page) -> String {
    let mut body = String::new();
    match page {
        Page::Form { error, text } => {
            if let Some(error) = error {
                let _ = write!(body, r#"<p class="error">{}</p>"#, escape_html(error));
            }
            push_form(&mut body, text);
        }
        Page::Success {
            raw_text,
            sanitized_text,
            output,
            elapsed_ms,
        } => {
            push_form(&mut body, raw_text);
            let _ = write!(
                body,
                concat!(
                    r#"<section class="result">"#,
                    r#"<h2>Input</h2><pre class="input">{}</pre>"#,
                    r#"<h2>Output</h2><pre class="output">{}</pre>"#,
                    r#"<p class="elapsed">Executed in {} ms</p>"#,
                    "</section>"
                ),
                escape_html(sanitized_text),
                escape_html(output),
                elapsed_ms
            );
        }
        Page::Error {
            message,
            details,
            text,
            input,
        } => {
            let _ = write!(
                body,
                r#"<p class="error">{}</p><pre class="details">{}</pre>"#,
                escape_html(message),
                escape_html(details)
            );
            push_form(&mut body, text);
            if let Some(input) = input {
                let _ = write!(
                    body,
                    r#"<h2>Input</h2><pre class="input">{}</pre>"#,
                    escape_html(input)
                );
            }
        }
        Page::TooManyRequests => {
            body.push_str(
                r#"<p class="error">Too many requests. Please wait a minute and try again.</p>"#,
            );
        }
    }

    format!(
        concat!(
            "<!DOCTYPE html>\n",
            r#"<html lang="en"><head><meta charset="utf-8">"#,
            "<title>Runner</title></head><body><main>{}</main></body></html>\n"
        ),
        body
    )
}

fn push_form(body: &mut String, text: &str) {
    let _ = write!(
        body,
        concat!(
            r#"<form method="post">"#,
            r#"<textarea name="text" rows="12" cols="80">{}</textarea>"#,
            r#"<button type="submit">Run</button>"#,
            "</form>"
        ),
        escape_html(text)
    );
}
