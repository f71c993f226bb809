//! Built-in pages.
//!
//! The sign-in and main pages are embedded at compile time and served as-is,
//! apart from the signed-in user's display address being substituted into
//! the main page header. Deployments with their own frontend can bypass all
//! of this with `--frontend-dir-path`.

pub const LOGIN_PAGE: &str = include_str!("../../assets/login.html");
pub const APP_JS: &str = include_str!("../../assets/app.js");
pub const APP_CSS: &str = include_str!("../../assets/app.css");

const MAIN_PAGE_TEMPLATE: &str = include_str!("../../assets/index.html");

pub fn render_main_page(email: &str) -> String {
    MAIN_PAGE_TEMPLATE.replace("{{email}}", &escape_html(email))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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
