use thiserror::Error;

use crate::matcher::path_tokens;
use crate::params::Params;
use crate::pattern::{CompileError, Pattern, Section};

/// Errors returned when registering a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    /// The pattern is malformed.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A structurally identical pattern already holds a value.
    #[error("pattern {pattern} conflicts with existing {existing}")]
    Conflict { pattern: String, existing: String },
}

/// The routing trie. Maps request paths to registered values.
///
/// Built once during route registration and read-only afterwards; lookups
/// take `&self` and need no synchronization.
#[derive(Debug)]
pub struct Tree<V> {
    root: Node<V>,
    len: usize,
}

/// A single node, keyed by one compiled section.
#[derive(Debug)]
struct Node<V> {
    key: Section,
    /// Set when a pattern ends at this node.
    value: Option<MatchItem<V>>,
    /// Sorted most-specific first.
    children: Vec<Node<V>>,
}

/// A registered value and the pattern it was registered under.
#[derive(Debug)]
struct MatchItem<V> {
    pattern: String,
    value: V,
}

/// The result of a successful lookup.
#[derive(Debug)]
pub struct Match<'a, V> {
    pub value: &'a V,
    /// The pattern the value was registered with.
    pub pattern: &'a str,
    pub params: Params,
}

impl<V> Node<V> {
    fn new(key: Section) -> Self {
        Self {
            key,
            value: None,
            children: Vec::new(),
        }
    }
}

impl<V> Default for Tree<V> {
    fn default() -> Self {
        Self {
            root: Node::new(Section::default()),
            len: 0,
        }
    }
}

impl<V> Tree<V> {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Register `value` under `pattern`.
    ///
    /// Returns the pattern's variable names in order, repeats included.
    /// Fails without touching the tree when the pattern does not compile or
    /// a structurally identical pattern is already registered. Patterns that
    /// differ only in variable names are structurally identical.
    pub fn register(&mut self, pattern: &str, value: V) -> Result<Vec<String>, InsertError> {
        let compiled = Pattern::parse(pattern)?;

        if let Some(existing) = Self::find_shape(&self.root, compiled.sections()) {
            return Err(InsertError::Conflict {
                pattern: pattern.to_string(),
                existing: existing.pattern.clone(),
            });
        }

        let variables = compiled.variables();
        let node = Self::traverse_or_create(&mut self.root, compiled.into_sections());
        node.value = Some(MatchItem {
            pattern: pattern.to_string(),
            value,
        });
        self.len += 1;

        tracing::debug!(pattern, variables = ?variables, "registered route pattern");
        Ok(variables)
    }

    /// Get the value registered under `pattern`, inserting `init()` first if
    /// there is none.
    ///
    /// Fails when a different spelling of the same structure, such as
    /// `/a/{y}` against `/a/{x}`, already holds a value.
    pub fn register_with<F>(
        &mut self,
        pattern: &str,
        init: F,
    ) -> Result<(Vec<String>, &mut V), InsertError>
    where
        F: FnOnce() -> V,
    {
        let compiled = Pattern::parse(pattern)?;

        if self.find(compiled.sections()).is_none() {
            if let Some(existing) = Self::find_shape(&self.root, compiled.sections()) {
                return Err(InsertError::Conflict {
                    pattern: pattern.to_string(),
                    existing: existing.pattern.clone(),
                });
            }
        }

        let variables = compiled.variables();
        let node = Self::traverse_or_create(&mut self.root, compiled.into_sections());

        if node.value.is_none() {
            self.len += 1;
            tracing::debug!(pattern, variables = ?variables, "registered route pattern");
        }
        let item = node.value.get_or_insert_with(|| MatchItem {
            pattern: pattern.to_string(),
            value: init(),
        });
        Ok((variables, &mut item.value))
    }

    /// Look up a request path.
    ///
    /// Returns the value of the most specific matching pattern and the
    /// variables captured along the way.
    pub fn lookup(&self, path: &str) -> Option<Match<'_, V>> {
        let tokens = path_tokens(path);
        let mut params = Params::new();

        let item = Self::traverse_and_match(&self.root, &tokens, &mut params)?;
        tracing::trace!(path, pattern = %item.pattern, "matched route pattern");

        Some(Match {
            value: &item.value,
            pattern: &item.pattern,
            params,
        })
    }

    /// [`Tree::lookup`] as a `(matched, value, bindings)` triple.
    pub fn match_path(&self, path: &str) -> (bool, Option<&V>, Params) {
        match self.lookup(path) {
            Some(m) => (true, Some(m.value), m.params),
            None => (false, None, Params::new()),
        }
    }

    /// All registered `(pattern, value)` pairs, depth first in match order.
    pub fn routes(&self) -> Routes<'_, V> {
        Routes {
            stack: vec![&self.root],
        }
    }

    /// The terminal registered at exactly these sections, if any.
    fn find(&self, sections: &[Section]) -> Option<&MatchItem<V>> {
        let mut current = &self.root;
        for section in sections {
            current = current.children.iter().find(|child| child.key == *section)?;
        }
        current.value.as_ref()
    }

    /// The terminal registered under any spelling of these sections.
    ///
    /// Every sibling of the same shape is searched, since `/a/{x}/b` and
    /// `/a/{y}/c` live on different branches.
    fn find_shape<'a>(node: &'a Node<V>, sections: &[Section]) -> Option<&'a MatchItem<V>> {
        let Some((section, rest)) = sections.split_first() else {
            return node.value.as_ref();
        };
        node.children
            .iter()
            .filter(|child| child.key.same_shape(section))
            .find_map(|child| Self::find_shape(child, rest))
    }

    /// Traverse or create nodes for compiled sections.
    ///
    /// New nodes are inserted after every sibling at least as specific, so
    /// siblings stay sorted and ties keep registration order.
    fn traverse_or_create(node: &mut Node<V>, sections: Vec<Section>) -> &mut Node<V> {
        let mut current = node;

        for section in sections {
            let index = match current.children.iter().position(|c| c.key == section) {
                Some(index) => index,
                None => {
                    let specificity = section.specificity();
                    let index = current
                        .children
                        .partition_point(|c| c.key.specificity() >= specificity);
                    current.children.insert(index, Node::new(section));
                    index
                }
            };
            current = &mut current.children[index];
        }

        current
    }

    /// Try children in specificity order, backtracking across siblings and
    /// levels. Captures of abandoned branches are dropped from `params`.
    fn traverse_and_match<'a>(
        node: &'a Node<V>,
        tokens: &[&str],
        params: &mut Params,
    ) -> Option<&'a MatchItem<V>> {
        if tokens.is_empty() {
            return None;
        }

        for child in &node.children {
            let Some(matched) = child.key.matches(tokens) else {
                continue;
            };

            let mark = params.len();
            params.extend(matched.bindings);

            // A greedy match always leaves no tokens, so it either ends here or fails.
            if matched.rest.is_empty() {
                if let Some(item) = &child.value {
                    return Some(item);
                }
            } else if let Some(item) = Self::traverse_and_match(child, matched.rest, params) {
                return Some(item);
            }

            params.truncate(mark);
        }

        None
    }
}

/// Iterator over registered routes, see [`Tree::routes`].
pub struct Routes<'a, V> {
    stack: Vec<&'a Node<V>>,
}

impl<'a, V> Iterator for Routes<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            self.stack.extend(node.children.iter().rev());
            if let Some(item) = &node.value {
                return Some((item.pattern.as_str(), &item.value));
            }
        }
        None
    }
}
