//! Server-rendered HTML.
//!
//! Every page shares [`layout`]. All user-supplied strings pass through
//! [`escape`] before they reach markup.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::models::Citation;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("marker pattern is valid"));

const STYLE: &str = "
body { font-family: arial, sans-serif; margin: 0 auto; max-width: 760px; padding: 24px; color: #202124; }
form.search input[type=text] { width: 70%; padding: 10px 14px; border: 1px solid #dfe1e5; border-radius: 24px; }
.overview { background: #f1f5fb; border-radius: 12px; padding: 16px 20px; margin: 16px 0; line-height: 1.5; }
.overview h2 { font-size: 16px; margin: 0 0 8px; }
.overview sup { color: #1a0dab; }
.result { margin: 18px 0; }
.result a { font-size: 18px; color: #1a0dab; text-decoration: none; }
.result .href { color: #006621; font-size: 13px; }
.error { color: #c5221f; }
textarea { width: 100%; min-height: 240px; }
table { border-collapse: collapse; font-size: 13px; }
td, th { border: 1px solid #ddd; padding: 4px 8px; vertical-align: top; text-align: left; }
";

/// Escapes text for use in element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        STYLE,
        body
    )
}

fn error_line(error: Option<&str>) -> String {
    error
        .map(|e| format!("<p class=\"error\">{}</p>", escape(e)))
        .unwrap_or_default()
}

fn search_form(query: &str) -> String {
    format!(
        "<form class=\"search\" action=\"/results\" method=\"get\">\
         <input type=\"text\" name=\"q\" value=\"{}\" autofocus> \
         <button type=\"submit\">Search</button></form>",
        escape(query)
    )
}

pub fn prolific_gate(error: Option<&str>) -> String {
    let body = format!(
        "<h1>Welcome</h1>\
         <p>Please enter your Prolific ID to begin.</p>\
         {}\
         <form action=\"/set_prolific\" method=\"post\">\
         <input type=\"text\" name=\"prolific_id\" required> \
         <button type=\"submit\">Continue</button></form>",
        error_line(error)
    );
    layout("Enter Prolific ID", &body)
}

pub fn index() -> String {
    let body = format!("<h1>Research Search</h1>{}", search_form(""));
    layout("Research Search", &body)
}

/// The overview box. `[n]` markers become superscripts.
pub fn overview_fragment(overview: &str) -> String {
    let escaped = escape(overview);
    let marked = MARKER_RE.replace_all(&escaped, |caps: &Captures| {
        format!("<sup>[{}]</sup>", &caps[1])
    });
    format!(
        "<div class=\"overview\"><h2>AI Overview</h2><p>{}</p></div>",
        marked
    )
}

/// The ranked source list, followed by the link to the submission form.
pub fn citations_fragment(citations: &[Citation], query: &str) -> String {
    let mut out = String::from("<div class=\"results\">");
    for c in citations {
        out.push_str(&format!(
            "<div class=\"result\"><span>[{}]</span> \
             <a href=\"{href}\" target=\"_blank\">{}</a>\
             <div class=\"href\">{href}</div></div>",
            c.index,
            escape(&c.title),
            href = escape(&c.href)
        ));
    }
    out.push_str(&format!(
        "<form action=\"/submit\" method=\"get\">\
         <input type=\"hidden\" name=\"q\" value=\"{}\">\
         <button type=\"submit\">Write your conclusion</button></form></div>",
        escape(query)
    ));
    out
}

pub fn results(query: &str, overview: &str, citations: &[Citation]) -> String {
    let body = format!(
        "{}{}{}",
        search_form(query),
        overview_fragment(overview),
        citations_fragment(citations, query)
    );
    layout("Results", &body)
}

pub fn submit(query: &str, conclusion: &str, min_words: usize, error: Option<&str>) -> String {
    let body = format!(
        "<h1>Your conclusion</h1>\
         <p>Search topic: <strong>{q}</strong></p>\
         <p>Please write at least {min} words.</p>\
         {err}\
         <form action=\"/submit\" method=\"post\">\
         <input type=\"hidden\" name=\"q\" value=\"{q}\">\
         <textarea name=\"conclusion\">{text}</textarea>\
         <p><button type=\"submit\">Submit</button></p></form>",
        q = escape(query),
        min = min_words,
        err = error_line(error),
        text = escape(conclusion)
    );
    layout("Submit", &body)
}

pub fn thanks() -> String {
    layout(
        "Thanks",
        "<h1>Thank you!</h1><p>Your response has been recorded. You may close this window.</p>",
    )
}

pub fn admin_login(next: &str, error: Option<&str>) -> String {
    let body = format!(
        "<h1>Admin Login</h1>{}\
         <form action=\"/admin/login\" method=\"post\">\
         <input type=\"hidden\" name=\"next\" value=\"{}\">\
         <input type=\"password\" name=\"password\" autofocus> \
         <button type=\"submit\">Log in</button></form>",
        error_line(error),
        escape(next)
    );
    layout("Admin Login", &body)
}

/// A log file as a table. The first row is rendered as the header.
pub fn admin_table(title: &str, rows: &[Vec<String>], base_path: &str) -> String {
    let mut table = String::from("<table>");
    for (i, row) in rows.iter().enumerate() {
        let cell = if i == 0 { "th" } else { "td" };
        table.push_str("<tr>");
        for value in row {
            table.push_str(&format!("<{cell}>{}</{cell}>", escape(value)));
        }
        table.push_str("</tr>");
    }
    table.push_str("</table>");

    let body = format!(
        "<h1>{title}</h1>\
         <p><a href=\"{base}/download\">Download CSV</a> · \
         <a href=\"/admin/logs\">Submissions</a> · \
         <a href=\"/admin/events\">Events</a> · \
         <a href=\"/admin/logout\">Log out</a></p>\
         <p>{count} rows</p>{table}\
         <form action=\"{base}/clear\" method=\"post\" \
         onsubmit=\"return confirm('Clear this log?');\">\
         <button type=\"submit\">Clear log</button></form>",
        title = escape(title),
        base = escape(base_path),
        count = rows.len().saturating_sub(1),
        table = table
    );
    layout(title, &body)
}
