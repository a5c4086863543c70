//! DOM snapshotter
//!
//! Reduces the live page to a line-per-element inventory of visible
//! interactive controls, the only view of the page the oracle gets.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{within, PageDriver, RawElement, DEFAULT_PAGE_TIMEOUT};
use crate::core::Result;

/// A visible interactive element, ready to be described to the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub text: Option<String>,
    pub placeholder: Option<String>,
    pub label: Option<String>,
    pub value: Option<String>,
}

impl ElementDescriptor {
    /// Build a descriptor, normalising whitespace and capping the visible text
    pub fn from_raw(raw: &RawElement, text_cap: usize) -> Self {
        Self {
            tag: raw.tag.to_lowercase(),
            id: clean(raw.id.as_deref()),
            name: clean(raw.name.as_deref()),
            input_type: clean(raw.input_type.as_deref()),
            text: clean(raw.text.as_deref()).map(|t| truncate_chars(&t, text_cap)),
            placeholder: clean(raw.placeholder.as_deref()),
            label: clean(raw.label.as_deref()),
            value: clean(raw.value.as_deref()),
        }
    }

    /// Single descriptive line. Field order is fixed, absent fields are omitted.
    pub fn line(&self) -> String {
        let mut line = format!("[{}]", self.tag);
        let fields = [
            ("id", &self.id),
            ("name", &self.name),
            ("type", &self.input_type),
            ("text", &self.text),
            ("placeholder", &self.placeholder),
            ("value", &self.value),
            ("label", &self.label),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                line.push_str(&format!(" {}=\"{}\"", key, v.replace('"', "'")));
            }
        }
        line
    }
}

/// Textual inventory of the visible interactive elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub elements: Vec<ElementDescriptor>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(no visible interactive elements)");
        }
        let lines: Vec<String> = self.elements.iter().map(ElementDescriptor::line).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// Captures snapshots from a page
#[derive(Debug, Clone)]
pub struct Snapshotter {
    text_cap: usize,
    read_timeout: Duration,
}

impl Snapshotter {
    pub fn new(text_cap: usize) -> Self {
        Self {
            text_cap,
            read_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Read the page's interactive elements and keep only the visible ones
    pub async fn capture(&self, page: &dyn PageDriver) -> Result<Snapshot> {
        let raw = within(
            self.read_timeout,
            "reading interactive elements",
            page.interactive_elements(),
        )
        .await?;
        let total = raw.len();

        let elements: Vec<ElementDescriptor> = raw
            .iter()
            .filter(|el| is_visible(el))
            .map(|el| ElementDescriptor::from_raw(el, self.text_cap))
            .collect();

        let snapshot = Snapshot { elements };
        debug!(total, visible = snapshot.len(), "captured DOM snapshot");
        Ok(snapshot)
    }
}

impl Default for Snapshotter {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Visibility predicate: no `display:none`, no `visibility:hidden`, no zero
/// opacity, and a layout box must exist.
pub fn is_visible(el: &RawElement) -> bool {
    if !el.rendered {
        return false;
    }
    if el.display.trim().eq_ignore_ascii_case("none") {
        return false;
    }
    if el.visibility.trim().eq_ignore_ascii_case("hidden") {
        return false;
    }
    match el.opacity.trim().parse::<f64>() {
        Ok(opacity) => opacity > 0.0,
        Err(_) => true,
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    let collapsed = value?.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn truncate_chars(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(tag: &str) -> RawElement {
        RawElement {
            tag: tag.to_string(),
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: "1".to_string(),
            rendered: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_visibility_predicate() {
        assert!(is_visible(&raw("button")));

        let mut hidden = raw("button");
        hidden.display = "none".to_string();
        assert!(!is_visible(&hidden));

        let mut hidden = raw("button");
        hidden.visibility = "hidden".to_string();
        assert!(!is_visible(&hidden));

        let mut hidden = raw("button");
        hidden.opacity = "0".to_string();
        assert!(!is_visible(&hidden));

        let mut faint = raw("button");
        faint.opacity = "0.05".to_string();
        assert!(is_visible(&faint));

        let mut detached = raw("button");
        detached.rendered = false;
        assert!(!is_visible(&detached));
    }

    #[test]
    fn test_line_field_order_and_omission() {
        let mut el = raw("INPUT");
        el.id = Some("pw".to_string());
        el.name = Some("pass".to_string());
        el.input_type = Some("password".to_string());
        el.placeholder = Some("Password".to_string());
        el.label = Some("  Your\n password ".to_string());

        let line = ElementDescriptor::from_raw(&el, 50).line();
        assert_eq!(
            line,
            r#"[input] id="pw" name="pass" type="password" placeholder="Password" label="Your password""#
        );
    }

    #[test]
    fn test_text_is_capped_on_char_boundary() {
        let mut el = raw("a");
        el.text = Some("héllo wörld ".repeat(10));
        let descriptor = ElementDescriptor::from_raw(&el, 8);
        assert_eq!(descriptor.text.as_deref(), Some("héllo wö"));
    }

    #[test]
    fn test_blank_attributes_are_absent() {
        let mut el = raw("button");
        el.id = Some("   ".to_string());
        el.text = Some("Sign In".to_string());
        assert_eq!(ElementDescriptor::from_raw(&el, 50).line(), r#"[button] text="Sign In""#);
    }

    #[test]
    fn test_empty_snapshot_display() {
        assert_eq!(
            Snapshot::default().to_string(),
            "(no visible interactive elements)"
        );
    }
}
