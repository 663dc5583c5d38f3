//! Owned, `Send` view of one match element, built once at the page boundary.

use regex::Regex;
use scraper::{ElementRef, Node};
use serde::{Deserialize, Serialize};

use crate::patterns::{DATE_CLASS, ROUND_CLASS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentNode {
    Element(FragmentElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentElement {
    pub tag: String,
    pub classes: Vec<String>,
    pub test_id: Option<String>,
    pub children: Vec<FragmentNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    Date,
    Round,
}

/// A date or round label found in the fragment's enclosing container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLabel {
    pub kind: LabelKind,
    pub text: String,
    pub precedes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub position: usize,
    pub root: FragmentElement,
    pub parent_labels: Vec<ContextLabel>,
}

impl FragmentElement {
    pub fn new(tag: &str, classes: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            test_id: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(FragmentNode::Text(text.to_string()));
        self
    }

    pub fn with_child(mut self, child: FragmentElement) -> Self {
        self.children.push(FragmentNode::Element(child));
        self
    }

    pub fn from_element(element: ElementRef<'_>) -> Self {
        let value = element.value();
        let children = element
            .children()
            .filter_map(|child| match child.value() {
                Node::Text(text) => {
                    let text: &str = text;
                    Some(FragmentNode::Text(text.to_string()))
                }
                Node::Element(_) => ElementRef::wrap(child)
                    .filter(|el| !matches!(el.value().name(), "script" | "style"))
                    .map(|el| FragmentNode::Element(FragmentElement::from_element(el))),
                _ => None,
            })
            .collect();
        Self {
            tag: value.name().to_ascii_lowercase(),
            classes: value.classes().map(ToString::to_string).collect(),
            test_id: value.attr("data-testid").map(ToString::to_string),
            children,
        }
    }

    /// Trimmed, non-empty descendant strings in document order.
    pub fn strings(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_strings(&mut out);
        out
    }

    fn collect_strings(&self, out: &mut Vec<String>) {
        for child in &self.children {
            match child {
                FragmentNode::Text(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        out.push(trimmed.to_string());
                    }
                }
                FragmentNode::Element(el) => el.collect_strings(out),
            }
        }
    }

    /// All strings joined without separator.
    pub fn text(&self) -> String {
        self.strings().concat()
    }

    /// All strings joined with ` | `.
    pub fn flattened_text(&self) -> String {
        self.strings().join(" | ")
    }

    /// Text nodes directly under this element.
    pub fn own_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                FragmentNode::Text(text) if !text.trim().is_empty() => Some(text.trim()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<&FragmentElement> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a FragmentElement>) {
        for child in &self.children {
            if let FragmentNode::Element(el) = child {
                out.push(el);
                el.collect_descendants(out);
            }
        }
    }

    pub fn class_matches(&self, pattern: &Regex) -> bool {
        self.classes.iter().any(|c| pattern.is_match(c))
    }

    /// Descendants with one of `tags` whose class list matches `pattern`.
    pub fn find_by_class(&self, tags: &[&str], pattern: &Regex) -> Vec<&FragmentElement> {
        self.descendants()
            .into_iter()
            .filter(|el| tags.contains(&el.tag.as_str()) && el.class_matches(pattern))
            .collect()
    }
}

impl Fragment {
    pub fn from_text(position: usize, text: &str) -> Self {
        Self {
            position,
            root: FragmentElement::new("div", &[]).with_text(text),
            parent_labels: Vec::new(),
        }
    }

    pub fn from_tree(position: usize, root: FragmentElement) -> Self {
        Self {
            position,
            root,
            parent_labels: Vec::new(),
        }
    }

    pub fn from_element(position: usize, element: ElementRef<'_>) -> Self {
        Self {
            position,
            root: FragmentElement::from_element(element),
            parent_labels: parent_labels_of(element),
        }
    }

    pub fn flattened_text(&self) -> String {
        self.root.flattened_text()
    }

    /// Nearest label of `kind` preceding the fragment, else the first one in the container.
    pub fn parent_label(&self, kind: LabelKind) -> Option<&str> {
        let of_kind = || {
            self.parent_labels
                .iter()
                .filter(move |l| l.kind == kind && !l.text.is_empty())
        };
        of_kind()
            .filter(|l| l.precedes)
            .last()
            .or_else(|| of_kind().next())
            .map(|l| l.text.as_str())
    }

    /// Short excerpt of the flattened text for log lines.
    pub fn excerpt(&self) -> String {
        let text = self.flattened_text();
        match text.char_indices().nth(120) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text,
        }
    }
}

fn parent_labels_of(element: ElementRef<'_>) -> Vec<ContextLabel> {
    let Some(parent) = element.parent().and_then(ElementRef::wrap) else {
        return Vec::new();
    };
    let mut labels = Vec::new();
    let mut precedes = true;
    for node in parent.descendants() {
        if node.id() == element.id() {
            precedes = false;
        }
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if !matches!(el.value().name(), "span" | "div") {
            continue;
        }
        let kind = if el.value().classes().any(|c| ROUND_CLASS.is_match(c)) {
            LabelKind::Round
        } else if el.value().classes().any(|c| DATE_CLASS.is_match(c)) {
            LabelKind::Date
        } else {
            continue;
        };
        let text = el.text().map(str::trim).collect::<String>();
        labels.push(ContextLabel { kind, text, precedes });
    }
    labels
}
