// Hierarchical path value type
//
// A path is a sequence of prim names, optionally absolute, optionally ending
// in a single property name. Relative paths may lead with `..` elements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::{is_identifier, is_namespaced_identifier};

const PARENT: &str = "..";

/// Path parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty path")]
    Empty,

    #[error("Invalid path element '{0}'")]
    InvalidElement(String),

    #[error("Invalid property name '{0}'")]
    InvalidProperty(String),

    #[error("'..' may only lead a relative path: {0}")]
    MisplacedParent(String),
}

/// An immutable hierarchical path such as `/World/geo.points` or `../sibling`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    absolute: bool,
    prims: Vec<String>,
    property: Option<String>,
}

impl Path {
    /// `/`
    pub fn absolute_root() -> Self {
        Path {
            absolute: true,
            prims: Vec::new(),
            property: None,
        }
    }

    /// `.`
    pub fn reflexive_relative() -> Self {
        Path {
            absolute: false,
            prims: Vec::new(),
            property: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, PathError> {
        match text {
            "" => return Err(PathError::Empty),
            "/" => return Ok(Self::absolute_root()),
            "." => return Ok(Self::reflexive_relative()),
            _ => {}
        }

        let absolute = text.starts_with('/');
        let body = if absolute { &text[1..] } else { text };
        let mut parts: Vec<&str> = body.split('/').collect();

        let mut property = None;
        if let Some(last) = parts.last_mut() {
            if *last != PARENT {
                if let Some((name, prop)) = last.split_once('.') {
                    if !is_namespaced_identifier(prop) {
                        return Err(PathError::InvalidProperty(prop.to_string()));
                    }
                    property = Some(prop.to_string());
                    *last = name;
                }
            }
        }

        // `.prop` is a property of the reflexive relative path.
        if !absolute && property.is_some() && parts.len() == 1 && parts[0].is_empty() {
            parts.clear();
        }

        let mut prims = Vec::with_capacity(parts.len());
        let mut leading = true;
        for part in parts {
            if part == PARENT {
                if absolute || !leading {
                    return Err(PathError::MisplacedParent(text.to_string()));
                }
                prims.push(PARENT.to_string());
            } else if is_identifier(part) {
                leading = false;
                prims.push(part.to_string());
            } else {
                return Err(PathError::InvalidElement(part.to_string()));
            }
        }

        Ok(Path {
            absolute,
            prims,
            property,
        })
    }

    // ── Classification ──────────────────────────────────────────────────

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn is_absolute_root(&self) -> bool {
        self.absolute && self.prims.is_empty() && self.property.is_none()
    }

    pub fn is_reflexive_relative(&self) -> bool {
        !self.absolute && self.prims.is_empty() && self.property.is_none()
    }

    /// A prim path: no property, and not the absolute root.
    pub fn is_prim_path(&self) -> bool {
        self.property.is_none() && !self.is_absolute_root()
    }

    pub fn is_absolute_root_or_prim_path(&self) -> bool {
        self.property.is_none()
    }

    pub fn is_property_path(&self) -> bool {
        self.property.is_some()
    }

    /// Properties only ever hang off prims here, so this matches
    /// `is_property_path`; kept separate to mirror the matcher's vocabulary.
    pub fn is_prim_property_path(&self) -> bool {
        self.property.is_some()
    }

    // ── Elements ────────────────────────────────────────────────────────

    /// Number of prim elements plus one for a property.
    pub fn element_count(&self) -> usize {
        self.prims.len() + usize::from(self.property.is_some())
    }

    /// Prim names followed by the property name, if any.
    pub fn element_names(&self) -> impl Iterator<Item = &str> {
        self.prims
            .iter()
            .map(String::as_str)
            .chain(self.property.as_deref())
    }

    /// The final element's name; empty for `/` and `.`.
    pub fn name(&self) -> &str {
        self.property
            .as_deref()
            .or_else(|| self.prims.last().map(String::as_str))
            .unwrap_or("")
    }

    pub fn property_name(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// The ancestor made of this path's first `count` elements.
    pub fn prefix_with_element_count(&self, count: usize) -> Path {
        let prim_count = count.min(self.prims.len());
        Path {
            absolute: self.absolute,
            prims: self.prims[..prim_count].to_vec(),
            property: if count > self.prims.len() {
                self.property.clone()
            } else {
                None
            },
        }
    }

    pub fn parent(&self) -> Option<Path> {
        if self.property.is_some() {
            return Some(Path {
                absolute: self.absolute,
                prims: self.prims.clone(),
                property: None,
            });
        }
        if self.prims.is_empty() {
            return None;
        }
        let mut prims = self.prims.clone();
        prims.pop();
        Some(Path {
            absolute: self.absolute,
            prims,
            property: None,
        })
    }

    // ── Construction ────────────────────────────────────────────────────

    /// Append a prim child. `..` steps up one level (or accumulates on a
    /// relative path that has nothing left to step over).
    pub fn append_child(&self, name: &str) -> Option<Path> {
        if self.property.is_some() {
            return None;
        }
        let mut prims = self.prims.clone();
        if name == PARENT {
            match prims.last() {
                Some(last) if last != PARENT => {
                    prims.pop();
                }
                _ if self.absolute => return None,
                _ => prims.push(PARENT.to_string()),
            }
        } else if is_identifier(name) {
            prims.push(name.to_string());
        } else {
            return None;
        }
        Some(Path {
            absolute: self.absolute,
            prims,
            property: None,
        })
    }

    pub fn append_property(&self, name: &str) -> Option<Path> {
        if self.property.is_some() || self.is_absolute_root() || !is_namespaced_identifier(name) {
            return None;
        }
        Some(Path {
            absolute: self.absolute,
            prims: self.prims.clone(),
            property: Some(name.to_string()),
        })
    }

    // ── Prefix operations ───────────────────────────────────────────────

    /// True if `prefix` is this path or one of its ancestors.
    pub fn has_prefix(&self, prefix: &Path) -> bool {
        if self.absolute != prefix.absolute {
            return false;
        }
        if prefix.property.is_some() {
            return self == prefix;
        }
        self.prims.len() >= prefix.prims.len() && self.prims[..prefix.prims.len()] == prefix.prims[..]
    }

    /// Swap `old` for `new` at the front of this path. Paths without the
    /// prefix, and replacements that would be malformed, come back unchanged.
    pub fn replace_prefix(&self, old: &Path, new: &Path) -> Path {
        if !self.has_prefix(old) {
            return self.clone();
        }
        if old.property.is_some() {
            return new.clone();
        }
        let rest = &self.prims[old.prims.len()..];
        if new.property.is_some() && (!rest.is_empty() || self.property.is_some()) {
            return self.clone();
        }
        let mut prims = new.prims.clone();
        prims.extend(rest.iter().cloned());
        Path {
            absolute: new.absolute,
            prims,
            property: self.property.clone().or_else(|| new.property.clone()),
        }
    }

    /// Anchor a relative path at `anchor`. `None` if the anchor is not an
    /// absolute prim path or `..` climbs above the root.
    pub fn make_absolute(&self, anchor: &Path) -> Option<Path> {
        if self.absolute {
            return Some(self.clone());
        }
        if !anchor.absolute || anchor.property.is_some() {
            return None;
        }
        let mut prims = anchor.prims.clone();
        for elem in &self.prims {
            if elem == PARENT {
                prims.pop()?;
            } else {
                prims.push(elem.clone());
            }
        }
        Some(Path {
            absolute: true,
            prims,
            property: self.property.clone(),
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        } else if self.prims.is_empty() && self.property.is_none() {
            return f.write_str(".");
        }
        f.write_str(&self.prims.join("/"))?;
        if let Some(prop) = &self.property {
            write!(f, ".{}", prop)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Path::parse(&s)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> String {
        path.to_string()
    }
}
