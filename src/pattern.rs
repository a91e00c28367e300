// Path patterns
//
// A pattern is a literal path prefix followed by match components: glob
// names, predicate-only elements `{pred}`, and stretches `//` matching any
// number of intervening levels. The final component may be a property.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ast::PredicateExpression;
use crate::path::Path;
use crate::utils::{is_identifier, is_namespaced_identifier};

/// One match element of a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Glob or literal name; empty for stretches and predicate-only elements.
    pub text: String,
    /// Index into the pattern's predicate expressions.
    pub predicate_index: Option<usize>,
    /// Plain identifier text, no glob characters.
    pub is_literal: bool,
}

impl Component {
    pub fn is_stretch(&self) -> bool {
        self.text.is_empty() && self.predicate_index.is_none()
    }
}

/// A path pattern such as `/World//Mesh*{isa:Mesh}.points`.
///
/// Literal leading elements are folded into `prefix`; everything from the
/// first non-literal element on is kept as components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPattern {
    prefix: Path,
    components: Vec<Component>,
    pred_exprs: Vec<PredicateExpression>,
    is_property: bool,
}

impl Default for PathPattern {
    fn default() -> Self {
        PathPattern {
            prefix: Path::reflexive_relative(),
            components: Vec::new(),
            pred_exprs: Vec::new(),
            is_property: false,
        }
    }
}

impl PathPattern {
    /// The pattern `.`, matching only the anchor path.
    pub fn new() -> Self {
        Self::default()
    }

    /// `//`: every absolute path.
    pub fn everything() -> Self {
        let mut pattern = PathPattern::new();
        pattern.set_prefix(Path::absolute_root()).append_child("");
        pattern
    }

    /// `.//`: the anchor path and everything below it.
    pub fn every_descendant() -> Self {
        let mut pattern = PathPattern::new();
        pattern.append_child("");
        pattern
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn predicate_exprs(&self) -> &[PredicateExpression] {
        &self.pred_exprs
    }

    /// True if this pattern matches only property paths.
    pub fn is_property(&self) -> bool {
        self.is_property
    }

    pub fn is_absolute(&self) -> bool {
        self.prefix.is_absolute()
    }

    pub fn has_leading_stretch(&self) -> bool {
        self.components.first().is_some_and(Component::is_stretch)
    }

    pub fn has_trailing_stretch(&self) -> bool {
        self.components.last().is_some_and(Component::is_stretch)
    }

    // ── Validation ──────────────────────────────────────────────────────

    fn check_append_child(&self, text: &str, has_predicate: bool) -> Result<(), String> {
        if self.is_property {
            return Err(format!(
                "Cannot append child '{}' to property path pattern '{}'",
                text, self
            ));
        }
        if text.is_empty() && !has_predicate && self.has_trailing_stretch() {
            return Err(format!(
                "Cannot append stretch to path pattern '{}', which already ends in stretch",
                self
            ));
        }
        Ok(())
    }

    fn check_append_property(&self, text: &str, has_predicate: bool) -> Result<(), String> {
        if self.is_property {
            return Err(format!(
                "Cannot append additional property '{}' to property path pattern '{}'",
                text, self
            ));
        }
        if text.is_empty() && !has_predicate {
            return Err(format!(
                "Cannot append empty property element to path pattern '{}'",
                self
            ));
        }
        Ok(())
    }

    pub fn can_append_child(&self, text: &str, predicate: Option<&PredicateExpression>) -> bool {
        self.check_append_child(text, has_predicate(predicate)).is_ok()
    }

    pub fn can_append_property(&self, text: &str, predicate: Option<&PredicateExpression>) -> bool {
        self.check_append_property(text, has_predicate(predicate)).is_ok()
    }

    // ── Mutation ────────────────────────────────────────────────────────

    /// Append a child element: a name, a glob, `..`, or `""` for a stretch.
    pub fn append_child(&mut self, text: &str) -> &mut Self {
        self.append_child_with_predicate(text, PredicateExpression::default())
    }

    pub fn append_child_with_predicate(&mut self, text: &str, predicate: PredicateExpression) -> &mut Self {
        if let Err(reason) = self.check_append_child(text, !predicate.is_empty()) {
            warn!("{}", reason);
            return self;
        }

        let is_literal = is_identifier(text);
        if (is_literal || text == "..") && predicate.is_empty() && self.components.is_empty() {
            match self.prefix.append_child(text) {
                Some(prefix) => self.prefix = prefix,
                None => warn!("Cannot append child '{}' to path pattern prefix <{}>", text, self.prefix),
            }
            return self;
        }

        let predicate_index = self.push_predicate(predicate);
        self.components.push(Component {
            text: text.to_string(),
            predicate_index,
            is_literal,
        });
        self
    }

    /// Append the final property element. A pattern ending in a stretch gets
    /// an implicit `*` first, since a property must follow a prim element.
    pub fn append_property(&mut self, text: &str) -> &mut Self {
        self.append_property_with_predicate(text, PredicateExpression::default())
    }

    pub fn append_property_with_predicate(&mut self, text: &str, predicate: PredicateExpression) -> &mut Self {
        if let Err(reason) = self.check_append_property(text, !predicate.is_empty()) {
            warn!("{}", reason);
            return self;
        }

        if self.has_trailing_stretch() {
            self.append_child("*");
        }

        let is_literal = is_namespaced_identifier(text);
        if is_literal && predicate.is_empty() && self.components.is_empty() {
            match self.prefix.append_property(text) {
                Some(prefix) => self.prefix = prefix,
                None => {
                    warn!("Cannot append property '{}' to path pattern prefix <{}>", text, self.prefix);
                    return self;
                }
            }
        } else {
            let predicate_index = self.push_predicate(predicate);
            self.components.push(Component {
                text: text.to_string(),
                predicate_index,
                is_literal,
            });
        }
        self.is_property = true;
        self
    }

    fn push_predicate(&mut self, predicate: PredicateExpression) -> Option<usize> {
        if predicate.is_empty() {
            return None;
        }
        self.pred_exprs.push(predicate);
        Some(self.pred_exprs.len() - 1)
    }

    pub fn append_stretch_if_possible(&mut self) -> &mut Self {
        if self.can_append_child("", None) {
            self.append_child("");
        }
        self
    }

    pub fn remove_trailing_stretch(&mut self) -> &mut Self {
        if self.has_trailing_stretch() {
            self.components.pop();
        }
        self
    }

    /// Drop the last component with its predicate. The prefix is never
    /// touched, so repeated calls stop at the bare prefix.
    pub fn remove_trailing_component(&mut self) -> &mut Self {
        if let Some(component) = self.components.pop() {
            if component.predicate_index.is_some() {
                self.pred_exprs.pop();
            }
            self.is_property = self.components.is_empty() && self.prefix.is_prim_property_path();
        }
        self
    }

    /// Replace the prefix. With components present it must be the absolute
    /// root or a prim path; otherwise a prim-property path is allowed too.
    /// Invalid prefixes are ignored with a warning.
    pub fn set_prefix(&mut self, prefix: Path) -> &mut Self {
        if !self.components.is_empty() {
            if !prefix.is_absolute_root_or_prim_path() {
                warn!(
                    "Path patterns with match components require prim paths or the \
                     absolute root path ('/') as a prefix: <{}> -- ignoring.",
                    prefix
                );
                return self;
            }
        } else if !(prefix.is_absolute_root_or_prim_path() || prefix.is_prim_property_path()) {
            warn!("Path pattern prefixes must be prim paths or prim-property paths: <{}> -- ignoring.", prefix);
            return self;
        }

        self.prefix = prefix;
        if self.components.is_empty() {
            self.is_property = self.prefix.is_prim_property_path();
        }
        self
    }

    /// Anchor a relative prefix at `anchor`. Returns false, leaving the
    /// pattern unchanged, if that is impossible.
    pub fn make_absolute(&mut self, anchor: &Path) -> bool {
        match self.prefix.make_absolute(anchor) {
            Some(prefix) => {
                self.prefix = prefix;
                true
            }
            None => false,
        }
    }

    pub fn replace_prefix(&mut self, old: &Path, new: &Path) {
        let replaced = self.prefix.replace_prefix(old, new);
        self.set_prefix(replaced);
    }

    // ── Printing ────────────────────────────────────────────────────────

    pub fn text(&self) -> String {
        let mut result = String::new();

        if self.prefix.is_reflexive_relative() {
            if self.components.is_empty() || self.has_leading_stretch() {
                result.push('.');
            }
        } else {
            result = self.prefix.to_string();
        }

        let prefix_is_abs_root = self.prefix.is_absolute_root();
        let end = self.components.len();
        for (i, component) in self.components.iter().enumerate() {
            if component.is_stretch() {
                result.push_str(if i == 0 && prefix_is_abs_root { "/" } else { "//" });
                continue;
            }
            if !result.is_empty() && !result.ends_with('/') {
                result.push(if i + 1 == end && self.is_property { '.' } else { '/' });
            }
            result.push_str(&component.text);
            if let Some(index) = component.predicate_index {
                result.push('{');
                result.push_str(&self.pred_exprs[index].text());
                result.push('}');
            }
        }
        result
    }
}

fn has_predicate(predicate: Option<&PredicateExpression>) -> bool {
    predicate.is_some_and(|p| !p.is_empty())
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn abs() -> PathPattern {
        let mut p = PathPattern::new();
        p.set_prefix(Path::absolute_root());
        p
    }

    #[test]
    fn test_literals_fold_into_prefix() {
        let mut p = abs();
        p.append_child("World").append_child("geo");
        assert_eq!(p.prefix(), &Path::parse("/World/geo").unwrap());
        assert!(p.components().is_empty());
        assert_eq!(p.text(), "/World/geo");

        p.append_child("Mesh*").append_child("points");
        assert_eq!(p.components().len(), 2);
        assert!(p.components()[1].is_literal);
        assert_eq!(p.text(), "/World/geo/Mesh*/points");
    }

    #[test]
    fn test_well_known_patterns() {
        assert_eq!(PathPattern::everything().text(), "//");
        assert_eq!(PathPattern::every_descendant().text(), ".//");
        assert_eq!(PathPattern::new().text(), ".");
        assert!(PathPattern::everything().has_leading_stretch());
        assert!(PathPattern::everything().has_trailing_stretch());
    }

    #[test]
    fn test_stretch_text() {
        let mut p = abs();
        p.append_child("foo").append_child("").append_child("bar");
        assert_eq!(p.text(), "/foo//bar");

        let mut p = PathPattern::new();
        p.append_child("a*").append_child("");
        assert_eq!(p.text(), "a*//");

        let mut p = PathPattern::new();
        p.append_child("").append_child("b");
        assert_eq!(p.text(), ".//b");
    }

    #[test]
    fn test_property_text() {
        let mut p = abs();
        p.append_child("World").append_child("*").append_property("points");
        assert!(p.is_property());
        assert_eq!(p.text(), "/World/*.points");

        let mut p = abs();
        p.append_child("World").append_property("size");
        assert!(p.components().is_empty());
        assert_eq!(p.text(), "/World.size");
    }

    #[test]
    fn test_predicates() {
        let mut p = abs();
        p.append_child("World")
            .append_child_with_predicate("", PredicateExpression::new("isa:Mesh"))
            .append_property_with_predicate("p*", PredicateExpression::new("custom"));
        assert_eq!(p.predicate_exprs().len(), 2);
        assert_eq!(p.text(), "/World/{isa:Mesh}.p*{custom}");

        p.remove_trailing_component();
        assert!(!p.is_property());
        assert_eq!(p.predicate_exprs().len(), 1);
        assert_eq!(p.text(), "/World/{isa:Mesh}");
    }

    #[test]
    fn test_property_after_stretch_gets_implicit_wildcard() {
        let mut p = abs();
        p.append_child("").append_property("points");
        assert_eq!(p.text(), "//*.points");
    }

    #[test]
    #[traced_test]
    fn test_rejected_appends_warn_and_do_nothing() {
        let mut p = abs();
        p.append_child("a").append_property("x");
        let before = p.clone();
        p.append_child("b");
        p.append_property("y");
        assert_eq!(p, before);
        assert!(logs_contain("Cannot append child 'b'"));

        let mut p = abs();
        p.append_child("a*").append_child("");
        assert!(!p.can_append_child("", None));
        let before = p.clone();
        p.append_child("");
        assert_eq!(p, before);

        assert!(!abs().can_append_property("", None));
        assert!(abs().can_append_property("", Some(&PredicateExpression::new("x"))));
    }

    #[test]
    fn test_stretch_idempotence() {
        let mut p = abs();
        p.append_child("a*").append_child("");
        let original = p.clone();
        p.remove_trailing_stretch();
        assert!(!p.has_trailing_stretch());
        p.append_stretch_if_possible();
        assert_eq!(p, original);

        // Already ending in stretch: no change.
        p.append_stretch_if_possible();
        assert_eq!(p, original);
    }

    #[test]
    fn test_remove_trailing_component_stops_at_prefix() {
        let mut p = abs();
        p.append_child("World").append_child("a*").append_child("").append_child("b");
        for _ in 0..5 {
            p.remove_trailing_component();
        }
        assert!(p.components().is_empty());
        assert_eq!(p.text(), "/World");
    }

    #[test]
    #[traced_test]
    fn test_set_prefix_validation() {
        let mut p = PathPattern::new();
        p.set_prefix(Path::parse("/World.size").unwrap());
        assert!(p.is_property());

        let mut p = PathPattern::new();
        p.append_child("a*");
        p.set_prefix(Path::parse("/World.size").unwrap());
        assert!(p.prefix().is_reflexive_relative());
        assert!(logs_contain("ignoring"));
    }

    #[test]
    fn test_make_absolute() {
        let mut p = PathPattern::new();
        p.append_child("..").append_child("sib*");
        assert!(p.make_absolute(&Path::parse("/World/geo").unwrap()));
        assert_eq!(p.text(), "/World/sib*");

        let mut p = PathPattern::new();
        p.append_child("..");
        assert!(!p.make_absolute(&Path::absolute_root()));
        assert!(!p.is_absolute());
    }
}
