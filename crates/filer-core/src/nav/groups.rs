//! Saved selection groups.
//!
//! A group remembers a directory and the leaf names selected in it, so a
//! window can jump back and reselect them later. Groups are persisted as
//! a small XML document:
//!
//! ```xml
//! <groups>
//!   <group name="1">
//!     <directory>/home/me/src</directory>
//!     <item>main.rs</item>
//!   </group>
//! </groups>
//! ```

use std::path::Path;

use crate::error::{CoreError, CoreResult};

/// One saved group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    /// Symbolic path of the directory the group was saved in.
    pub directory: String,
    /// Selected leaf names.
    pub items: Vec<String>,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<String>,
        items: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            items: items.into_iter().collect(),
        }
    }
}

/// An ordered collection of groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupStore {
    groups: Vec<Group>,
}

impl GroupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a groups document.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let doc =
            roxmltree::Document::parse(text).map_err(|e| CoreError::MalformedBookmark(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "groups" {
            return Err(CoreError::MalformedBookmark(format!(
                "expected <groups>, found <{}>",
                root.tag_name().name()
            )));
        }

        let mut store = Self::new();
        for node in root.children().filter(|n| n.has_tag_name("group")) {
            let Some(name) = node.attribute("name") else {
                tracing::warn!("skipping group without a name");
                continue;
            };
            let Some(directory) = node
                .children()
                .find(|n| n.has_tag_name("directory"))
                .and_then(|n| n.text())
            else {
                tracing::warn!("skipping group {name} without a directory");
                continue;
            };
            let items = node
                .children()
                .filter(|n| n.has_tag_name("item"))
                .filter_map(|n| n.text())
                .map(str::to_owned);
            store = store.with_group(Group::new(name, directory, items));
        }
        Ok(store)
    }

    /// Reads the groups file. A missing or malformed file gives an empty
    /// store.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                tracing::warn!("cannot read groups from {}: {e}", path.display());
                return Self::new();
            }
        };
        Self::parse(&text).unwrap_or_else(|e| {
            tracing::warn!("ignoring {}: {e}", path.display());
            Self::new()
        })
    }

    /// Returns a store with `group` added, replacing any group of the same
    /// name.
    #[must_use]
    pub fn with_group(self, group: Group) -> Self {
        let mut groups = self.without_group(&group.name).groups;
        groups.push(group);
        Self { groups }
    }

    #[must_use]
    pub fn without_group(self, name: &str) -> Self {
        let groups = self.groups.into_iter().filter(|g| g.name != name).collect();
        Self { groups }
    }

    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Serialises the store. Text XML cannot carry (most C0 controls,
    /// U+FFFE and U+FFFF) is left out with a warning: an item is dropped,
    /// and a group whose name or directory holds such text is dropped whole.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\"?>\n<groups>\n");
        for group in &self.groups {
            if !is_xml_text(&group.name) || !is_xml_text(&group.directory) {
                tracing::warn!("not saving group {:?}: unsupported characters", group.name);
                continue;
            }
            out.push_str(&format!("  <group name=\"{}\">\n", escape(&group.name)));
            out.push_str(&format!(
                "    <directory>{}</directory>\n",
                escape(&group.directory)
            ));
            for item in &group.items {
                if !is_xml_text(item) {
                    tracing::warn!(
                        "not saving {item:?} in group {}: unsupported characters",
                        group.name
                    );
                    continue;
                }
                out.push_str(&format!("    <item>{}</item>\n", escape(item)));
            }
            out.push_str("  </group>\n");
        }
        out.push_str("</groups>\n");
        out
    }

    /// Writes the document, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_xml())?;
        Ok(())
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Parsers normalise raw whitespace controls; references survive.
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
    out
}

/// `true` if every character of `text` may appear in an XML 1.0 document.
fn is_xml_text(text: &str) -> bool {
    text.chars().all(|c| {
        matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{fffe}' && c != '\u{ffff}')
    })
}
