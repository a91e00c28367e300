// Compiled path patterns
//
// A pattern compiles to its literal prefix plus a list of match components.
// Stretches are not components: they split the components into segments,
// and `stretch_begin`/`stretch_end` record whether the pattern opens or
// closes with one. A path matches if, after the prefix, every segment can be
// placed in order: the first segment flush against the prefix unless a
// stretch leads, the last flush against the end unless a stretch trails,
// and interior segments at their leftmost possible position.

use regex::Regex;
use tracing::warn;

use crate::compiler::CompileError;
use crate::library::{link, PredicateLibrary, PredicateProgram};
use crate::path::Path;
use crate::pattern::PathPattern;
use crate::result::PredicateFunctionResult;
use crate::utils::glob_to_regex;

type Outcome = PredicateFunctionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchObjType {
    PrimOnly,
    PropOnly,
    PrimOrProp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComponentKind {
    /// Exact name; the empty name matches anything.
    ExplicitName,
    Regex,
}

#[derive(Debug, Clone, Copy)]
struct CompiledComponent {
    kind: ComponentKind,
    /// Index into `explicit_names` or `regexes`, per `kind`.
    pattern_index: usize,
    predicate_index: Option<usize>,
}

/// A run of components between stretches, as a range into `components`.
#[derive(Debug, Clone, Copy)]
struct Segment {
    begin: usize,
    end: usize,
}

impl Segment {
    fn len(&self) -> usize {
        self.end - self.begin
    }
}

// ---------------------------------------------------------------------------
// Incremental search state
// ---------------------------------------------------------------------------

/// Per-pattern memo for depth-first incremental search.
///
/// `segment_match_depths[i]` is the element count just past where segment
/// `i` matched. A match recorded at depth `d` only depends on the first `d`
/// elements, so it stays valid for any later path that shares them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PatternIncrSearchState {
    segment_match_depths: Vec<usize>,
    constant_depth: Option<usize>,
    constant_value: bool,
}

impl PatternIncrSearchState {
    /// Forget everything that depends on elements at index `new_depth - 1`
    /// or deeper: the next path differs from the previous one there.
    pub(crate) fn pop(&mut self, new_depth: usize) {
        while self
            .segment_match_depths
            .last()
            .is_some_and(|&depth| depth >= new_depth)
        {
            self.segment_match_depths.pop();
        }
        if self.constant_depth.is_some_and(|depth| depth >= new_depth) {
            self.constant_depth = None;
        }
    }

    fn constant(&self) -> Option<bool> {
        self.constant_depth.map(|_| self.constant_value)
    }

    fn set_constant(&mut self, depth: usize, value: bool) {
        self.constant_depth = Some(depth);
        self.constant_value = value;
    }
}

// ---------------------------------------------------------------------------
// Pattern implementation
// ---------------------------------------------------------------------------

pub(crate) struct PatternImpl<D> {
    prefix: Path,
    components: Vec<CompiledComponent>,
    segments: Vec<Segment>,
    explicit_names: Vec<String>,
    regexes: Vec<Regex>,
    predicates: Vec<PredicateProgram<D>>,
    stretch_begin: bool,
    stretch_end: bool,
    match_obj_type: MatchObjType,
}

impl<D> Clone for PatternImpl<D> {
    fn clone(&self) -> Self {
        PatternImpl {
            prefix: self.prefix.clone(),
            components: self.components.clone(),
            segments: self.segments.clone(),
            explicit_names: self.explicit_names.clone(),
            regexes: self.regexes.clone(),
            predicates: self.predicates.clone(),
            stretch_begin: self.stretch_begin,
            stretch_end: self.stretch_end,
            match_obj_type: self.match_obj_type,
        }
    }
}

impl<D> std::fmt::Debug for PatternImpl<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PatternImpl")
            .field("prefix", &self.prefix)
            .field("components", &self.components)
            .field("segments", &self.segments)
            .field("stretch_begin", &self.stretch_begin)
            .field("stretch_end", &self.stretch_end)
            .field("match_obj_type", &self.match_obj_type)
            .finish()
    }
}

impl<D: 'static> PatternImpl<D> {
    /// Compile `pattern`, linking its predicates against `library`.
    pub(crate) fn new(pattern: &PathPattern, library: &PredicateLibrary<D>) -> Result<Self, CompileError> {
        let predicates = pattern
            .predicate_exprs()
            .iter()
            .map(|expr| link(expr, library))
            .collect::<Result<Vec<_>, _>>()?;

        let mut imp = PatternImpl {
            prefix: pattern.prefix().clone(),
            components: Vec::new(),
            segments: Vec::new(),
            explicit_names: Vec::new(),
            regexes: Vec::new(),
            predicates,
            stretch_begin: false,
            stretch_end: false,
            match_obj_type: MatchObjType::PrimOnly,
        };

        let count = pattern.components().len();
        let mut segment_begin = 0;
        for (i, component) in pattern.components().iter().enumerate() {
            if component.is_stretch() {
                imp.stretch_begin |= i == 0;
                imp.stretch_end |= i + 1 == count;
                imp.close_segment(segment_begin);
                segment_begin = imp.components.len();
                continue;
            }

            let compiled = if component.is_literal || component.text.is_empty() {
                imp.explicit_names.push(component.text.clone());
                CompiledComponent {
                    kind: ComponentKind::ExplicitName,
                    pattern_index: imp.explicit_names.len() - 1,
                    predicate_index: component.predicate_index,
                }
            } else {
                let regex = Regex::new(&glob_to_regex(&component.text)).map_err(|e| CompileError::InvalidGlob {
                    glob: component.text.clone(),
                    message: e.to_string(),
                })?;
                imp.regexes.push(regex);
                CompiledComponent {
                    kind: ComponentKind::Regex,
                    pattern_index: imp.regexes.len() - 1,
                    predicate_index: component.predicate_index,
                }
            };
            imp.components.push(compiled);
        }
        imp.close_segment(segment_begin);

        imp.match_obj_type = if pattern.is_property() {
            MatchObjType::PropOnly
        } else if imp.stretch_end {
            MatchObjType::PrimOrProp
        } else {
            MatchObjType::PrimOnly
        };

        Ok(imp)
    }
}

impl<D> PatternImpl<D> {
    fn close_segment(&mut self, begin: usize) {
        let end = self.components.len();
        if end > begin {
            self.segments.push(Segment { begin, end });
        }
    }

    /// One-shot match.
    pub(crate) fn matches(&self, path: &Path, path_to_obj: &dyn Fn(&Path) -> D) -> Outcome {
        self.match_impl(path, path_to_obj, None)
    }

    /// Incremental match; `path` must follow the previously searched path in
    /// depth-first order.
    pub(crate) fn next(
        &self,
        path: &Path,
        path_to_obj: &dyn Fn(&Path) -> D,
        state: &mut PatternIncrSearchState,
    ) -> Outcome {
        let depth = path.element_count();
        state.pop(depth);
        if let Some(value) = state.constant() {
            return Outcome::make_constant(value);
        }

        let result = self.match_impl(path, path_to_obj, Some(state));
        if result.is_constant() {
            state.set_constant(depth, result.value());
        }
        result
    }

    fn match_impl(
        &self,
        path: &Path,
        path_to_obj: &dyn Fn(&Path) -> D,
        mut state: Option<&mut PatternIncrSearchState>,
    ) -> Outcome {
        if !path.is_absolute() || !(path.is_absolute_root_or_prim_path() || path.is_prim_property_path()) {
            warn!(path = %path, "Unsupported path; can only match absolute prim or prim-property paths");
            return Outcome::make_constant(false);
        }

        if !path.has_prefix(&self.prefix) {
            // An ancestor of the prefix may still have matching descendants.
            return if self.prefix.has_prefix(path) {
                Outcome::make_varying(false)
            } else {
                Outcome::make_constant(false)
            };
        }

        match self.match_obj_type {
            MatchObjType::PrimOnly if path.is_property_path() => return Outcome::make_constant(false),
            MatchObjType::PropOnly if !path.is_property_path() => return Outcome::make_varying(false),
            _ => {}
        }

        if self.segments.is_empty() {
            return if self.stretch_end {
                Outcome::make_constant(true)
            } else if *path == self.prefix {
                Outcome::make_varying(true)
            } else {
                Outcome::make_constant(false)
            };
        }

        let names: Vec<&str> = path.element_names().collect();
        let mut limit = names.len();
        if path.is_property_path() && self.match_obj_type == MatchObjType::PrimOrProp {
            // The stretch covers the property; segments only see prims.
            limit -= 1;
        }

        let mut pos = self.prefix.element_count();
        let mut first_segment = 0;
        if let Some(depth) = state.as_deref().and_then(|s| s.segment_match_depths.last()) {
            pos = *depth;
            first_segment = state.as_deref().map_or(0, |s| s.segment_match_depths.len());
        }

        let matcher = SegmentMatcher {
            pattern: self,
            names: &names,
            path,
            path_to_obj,
        };

        let last_segment = self.segments.len() - 1;
        for (i, segment) in self.segments.iter().enumerate().skip(first_segment) {
            let len = segment.len();
            let avail = limit.saturating_sub(pos);
            let anchor_start = i == 0 && !self.stretch_begin;
            let anchor_end = i == last_segment && !self.stretch_end;

            match (anchor_start, anchor_end) {
                (true, true) => {
                    if avail > len || !matcher.matches_at(segment, pos, avail.min(len)) {
                        return Outcome::make_constant(false);
                    }
                    return Outcome::make_varying(avail == len);
                }
                (true, false) => {
                    if !matcher.matches_at(segment, pos, avail.min(len)) {
                        return Outcome::make_constant(false);
                    }
                    if avail < len {
                        return Outcome::make_varying(false);
                    }
                    pos += len;
                }
                (false, true) => {
                    let found = avail >= len && matcher.matches_at(segment, limit - len, len);
                    return Outcome::make_varying(found);
                }
                (false, false) => {
                    if avail < len {
                        return Outcome::make_varying(false);
                    }
                    // TODO: skip ahead using the segment's minimum length
                    // instead of retrying every start position.
                    match (pos..=limit - len).find(|&start| matcher.matches_at(segment, start, len)) {
                        Some(start) => pos = start + len,
                        None => return Outcome::make_varying(false),
                    }
                }
            }

            if let Some(state) = state.as_deref_mut() {
                state.segment_match_depths.push(pos);
            }
        }

        // Every segment placed and a stretch trails: all descendants match.
        Outcome::make_constant(true)
    }
}

struct SegmentMatcher<'a, D> {
    pattern: &'a PatternImpl<D>,
    names: &'a [&'a str],
    path: &'a Path,
    path_to_obj: &'a dyn Fn(&Path) -> D,
}

impl<D> SegmentMatcher<'_, D> {
    /// Test the segment's first `count` components against the path
    /// elements starting at `start`.
    fn matches_at(&self, segment: &Segment, start: usize, count: usize) -> bool {
        (0..count).all(|offset| {
            let component = &self.pattern.components[segment.begin + offset];
            self.component_matches(component, start + offset)
        })
    }

    fn component_matches(&self, component: &CompiledComponent, element: usize) -> bool {
        let name = self.names[element];
        let name_ok = match component.kind {
            ComponentKind::ExplicitName => {
                let explicit = &self.pattern.explicit_names[component.pattern_index];
                explicit.is_empty() || explicit == name
            }
            ComponentKind::Regex => self.pattern.regexes[component.pattern_index].is_match(name),
        };
        if !name_ok {
            return false;
        }

        match component.predicate_index {
            Some(index) => {
                let obj = (self.path_to_obj)(&self.path.prefix_with_element_count(element + 1));
                self.pattern.predicates[index].call(&obj).value()
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_parser::parse_pattern;
    use tracing_test::traced_test;

    fn compile(text: &str) -> PatternImpl<Path> {
        let mut lib = PredicateLibrary::new();
        lib.define("isLeaf", |p: &Path| p.name().starts_with("leaf"))
            .define("deep", |p: &Path| p.element_count() > 2);
        PatternImpl::new(&parse_pattern(text).unwrap(), &lib).unwrap()
    }

    fn id(p: &Path) -> Path {
        p.clone()
    }

    fn check(pattern: &PatternImpl<Path>, path: &str) -> Outcome {
        pattern.matches(&Path::parse(path).unwrap(), &id)
    }

    #[test]
    fn test_segments() {
        let p = compile("/a//b*/c//d");
        assert_eq!(p.segments.len(), 2);
        assert!(p.stretch_begin && !p.stretch_end);
        assert_eq!(p.match_obj_type, MatchObjType::PrimOnly);

        let p = compile("//");
        assert!(p.segments.is_empty());
        assert!(p.stretch_begin && p.stretch_end);
        assert_eq!(p.match_obj_type, MatchObjType::PrimOrProp);

        let p = compile("/a/*.p*");
        assert_eq!(p.match_obj_type, MatchObjType::PropOnly);
        assert_eq!(p.regexes.len(), 2);
    }

    #[test]
    fn test_stretch_between_literals() {
        let p = compile("/foo//bar");
        for path in ["/foo/bar", "/foo/x/bar", "/foo/x/y/z/bar"] {
            assert!(check(&p, path).value(), "{}", path);
        }
        assert!(!check(&p, "/foo/x/y/z/bar/baz").value());
        assert!(!check(&p, "/foo.bar").value());
        assert_eq!(check(&p, "/other"), Outcome::make_constant(false));
        assert_eq!(check(&p, "/"), Outcome::make_varying(false));
    }

    #[test]
    fn test_anchored_both_ends() {
        let p = compile("/foo/bar/*");
        assert_eq!(check(&p, "/foo/bar/x"), Outcome::make_varying(true));
        assert_eq!(check(&p, "/foo/bar"), Outcome::make_varying(false));
        assert_eq!(check(&p, "/foo/bar/x/y"), Outcome::make_constant(false));
        assert_eq!(check(&p, "/foo/bar/x.attr"), Outcome::make_constant(false));
    }

    #[test]
    fn test_trailing_stretch_is_constant() {
        let p = compile("/prefix/path//");
        assert_eq!(check(&p, "/prefix"), Outcome::make_varying(false));
        assert_eq!(check(&p, "/prefix/path"), Outcome::make_constant(true));
        assert_eq!(check(&p, "/prefix/path/x.attr"), Outcome::make_constant(true));
        assert_eq!(check(&p, "/prefix/wrong"), Outcome::make_constant(false));

        let p = compile("/a/b*//");
        assert_eq!(check(&p, "/a/bx/c"), Outcome::make_constant(true));
        assert_eq!(check(&p, "/a/x"), Outcome::make_constant(false));
        assert_eq!(check(&p, "/a"), Outcome::make_varying(false));
    }

    #[test]
    fn test_property_patterns() {
        let p = compile("/a//*.size");
        assert!(check(&p, "/a/b.size").value());
        assert!(check(&p, "/a/b/c.size").value());
        assert!(!check(&p, "/a/b.other").value());
        assert_eq!(check(&p, "/a/b"), Outcome::make_varying(false));

        let p = compile("/a/b");
        assert_eq!(check(&p, "/a/b.size"), Outcome::make_constant(false));
    }

    #[test]
    fn test_predicates() {
        let p = compile("/a//{isLeaf}");
        assert!(check(&p, "/a/b/leaf1").value());
        assert!(!check(&p, "/a/b/stem").value());

        let p = compile("/a/*{deep}//");
        assert!(!check(&p, "/a/b").value());
    }

    #[test]
    #[traced_test]
    fn test_unsupported_path_warns() {
        let p = compile("//");
        assert_eq!(check(&p, "rel/path"), Outcome::make_constant(false));
        assert!(logs_contain("Unsupported path"));
    }

    #[test]
    fn test_incremental_state_pop() {
        let mut state = PatternIncrSearchState {
            segment_match_depths: vec![2, 4],
            constant_depth: Some(4),
            constant_value: true,
        };
        state.pop(5);
        assert_eq!(state.segment_match_depths, vec![2, 4]);
        assert_eq!(state.constant(), Some(true));
        state.pop(4);
        assert_eq!(state.segment_match_depths, vec![2]);
        assert_eq!(state.constant(), None);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let p = compile("/a//b*//c");
        let paths = [
            "/", "/a", "/a/x", "/a/x/bq", "/a/x/bq/c", "/a/x/bq/c/d", "/a/x/bq/y", "/a/x/bq/y/c", "/a/b1",
            "/a/b1/c", "/a/b1/c.attr", "/z", "/z/c",
        ];
        let mut state = PatternIncrSearchState::default();
        for text in paths {
            let path = Path::parse(text).unwrap();
            let batch = p.matches(&path, &id);
            let incr = p.next(&path, &id, &mut state);
            assert_eq!(batch.value(), incr.value(), "{}", text);
        }
    }
}
