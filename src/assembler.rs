//! SVG assembly and sanitization
//!
//! Turns a resolved icon into standalone markup plus a two-line attribution
//! comment. Bodies containing scripts, event handlers or references outside
//! the fragment are rejected, never stripped.

use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::{IconError, Result};
use crate::models::{ResolvedIcon, StyleOptions};

const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Markup and attribution for one icon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assembled {
    pub markup: String,
    /// Two comment lines: icon + license, then source + requirement
    pub attribution: String,
}

impl Assembled {
    /// Markup followed by the attribution lines
    pub fn document(&self) -> String {
        format!("{}\n{}", self.markup, self.attribution)
    }
}

struct Rules {
    script: Regex,
    event_handler: Regex,
    href: Regex,
    url_ref: Regex,
    fill_attr: Regex,
    fill_style: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| {
        // Literal patterns; a failure here is a programming error
        let compile = |pattern: &str| Regex::new(pattern).expect("static regex pattern");
        Rules {
            script: compile(r"(?i)<\s*script"),
            event_handler: compile(r#"(?i)(?:^|[\s/"'])on[a-z]+\s*="#),
            href: compile(r#"(?i)(?:xlink:)?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#),
            url_ref: compile(r#"(?i)url\(\s*["']?\s*([^)"'\s]*)"#),
            fill_attr: compile(r#"(?i)\bfill\s*=\s*(?:"([^"]*)"|'([^']*)')"#),
            fill_style: compile(r"(?i)\bfill\s*:\s*([^;\x22']+)"),
        }
    })
}

fn first_group<'t>(caps: &Captures<'t>) -> &'t str {
    (1..caps.len())
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str())
        .unwrap_or("")
}

/// Reject bodies with scripts, event handlers or external references
pub fn sanitize(id: &str, body: &str) -> Result<()> {
    let rules = rules();

    if rules.script.is_match(body) {
        return Err(IconError::unsafe_content(id, "embedded <script> element"));
    }
    if let Some(m) = rules.event_handler.find(body) {
        return Err(IconError::unsafe_content(
            id,
            format!("event handler attribute '{}'", m.as_str().trim()),
        ));
    }
    for caps in rules.href.captures_iter(body) {
        let target = first_group(&caps).trim();
        if !target.is_empty() && !target.starts_with('#') {
            return Err(IconError::unsafe_content(id, format!("external reference '{}'", target)));
        }
    }
    for caps in rules.url_ref.captures_iter(body) {
        let target = first_group(&caps);
        if !target.starts_with('#') {
            return Err(IconError::unsafe_content(id, format!("external url() reference '{}'", target)));
        }
    }
    Ok(())
}

/// Point every inline fill other than `none` at the group color
fn inherit_fills(body: &str) -> String {
    let rules = rules();
    let body = rules.fill_attr.replace_all(body, |caps: &Captures| {
        if first_group(caps).trim().eq_ignore_ascii_case("none") {
            caps[0].to_string()
        } else {
            "fill=\"currentColor\"".to_string()
        }
    });
    rules
        .fill_style
        .replace_all(&body, |caps: &Captures| {
            if caps[1].trim().eq_ignore_ascii_case("none") {
                caps[0].to_string()
            } else {
                "fill:currentColor".to_string()
            }
        })
        .into_owned()
}

/// Keep metadata from closing the comment early
///
/// No two hyphens are ever adjacent in the result and it never ends in one.
fn comment_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '-' && out.ends_with('-') {
            out.push(' ');
        }
        out.push(c);
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}

/// Build markup and attribution for a resolved icon
pub fn assemble(resolved: &ResolvedIcon, style: &StyleOptions) -> Result<Assembled> {
    let record = &resolved.record;
    let requested = resolved.requested.to_string();

    sanitize(&requested, &record.body)?;

    let open = format!(
        r#"<svg xmlns="{}" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        SVG_NS,
        record.width,
        record.height,
        style.size(),
        style.size()
    );
    let content = match style.color() {
        Some(color) => format!(
            r#"<g fill="{color}" color="{color}">{}</g>"#,
            inherit_fills(&record.body)
        ),
        None => record.body.clone(),
    };
    let markup = [open.as_str(), content.as_str(), "</svg>"].join("\n");

    log::debug!("Assembled {} ({} bytes)", requested, markup.len());
    Ok(Assembled {
        markup,
        attribution: attribution_comment(resolved),
    })
}

/// Two comment lines: icon + license, then source + requirement
pub fn attribution_comment(resolved: &ResolvedIcon) -> String {
    let license = &resolved.collection.license;
    format!(
        "<!-- icon: {}; license: {} -->\n<!-- source: {}; requirement: {} -->",
        comment_text(&resolved.requested.to_string()),
        comment_text(&license.title),
        comment_text(license.url.as_deref().unwrap_or("unknown")),
        comment_text(license.requirement.as_deref().unwrap_or("none")),
    )
}
