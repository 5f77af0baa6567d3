//! Declarative document trees
//!
//! Element trees are described with [`ElementSpec`] either in code (builder
//! methods) or as JSON, then materialized into a [`MemoryDom`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::memory::MemoryDom;
use crate::port::{Rect, SearchScope};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementSpec {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Text owned directly by this element, before its children.
    pub text: String,
    pub children: Vec<ElementSpec>,
    pub value: Option<String>,
    pub checked: Option<bool>,
    /// Rendered with `display: none`.
    pub hidden: bool,
    /// Explicit layout box; otherwise one is assigned automatically.
    pub rect: Option<Rect>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ElementSpec>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }
}

/// A whole page: main document body content plus, optionally, the editor frame body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomFixture {
    pub main: Vec<ElementSpec>,
    pub frame: Option<Vec<ElementSpec>>,
    pub frame_offset: Option<(f64, f64)>,
}

impl DomFixture {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl MemoryDom {
    pub fn from_fixture(fixture: &DomFixture) -> Self {
        let dom = MemoryDom::new();
        let body = dom.body(SearchScope::Main);
        for spec in &fixture.main {
            dom.append(body, spec);
        }
        if let Some(frame) = &fixture.frame {
            let frame_body = dom.attach_editor_frame();
            for spec in frame {
                dom.append(frame_body, spec);
            }
        }
        if let Some((x, y)) = fixture.frame_offset {
            dom.set_frame_offset(x, y);
        }
        dom
    }
}
