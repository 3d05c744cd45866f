//! Matching compiled sections against request path tokens.

use std::borrow::Cow;

use crate::pattern::{Element, Section, Variable};

/// Split a request path into segment tokens.
///
/// Every token keeps its leading `/`, so `/apis/v1/abc` becomes
/// `["/apis", "/v1", "/abc"]`. Repeated slashes produce bare `"/"` tokens and
/// an empty path produces no tokens at all.
pub fn path_tokens(path: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    for (i, _) in path.match_indices('/') {
        if i != start {
            tokens.push(&path[start..i]);
        }
        start = i;
    }
    if start != path.len() {
        tokens.push(&path[start..]);
    }
    tokens
}

/// A successful section match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMatch<'t> {
    /// Tokens left for deeper sections. Always empty after a greedy match.
    pub rest: &'t [&'t str],
    /// Captured `(name, value)` pairs in element order.
    pub bindings: Vec<(String, String)>,
    /// Whether the match absorbed the rest of the path.
    pub greedy: bool,
}

/// A capture waiting for the next literal to find out where it ends.
#[derive(Clone, Copy)]
enum Capture<'s> {
    Variable(&'s Variable),
    /// The tail of a `text*` wildcard.
    Anonymous,
}

impl Capture<'_> {
    fn bind(self, value: &str, bindings: &mut Vec<(String, String)>) -> Option<()> {
        let Capture::Variable(var) = self else {
            return Some(());
        };
        if value.is_empty() && !var.greedy {
            return None;
        }
        if !var.accepts(value) {
            return None;
        }
        if !var.name.is_empty() {
            bindings.push((var.name.clone(), value.to_string()));
        }
        Some(())
    }

    /// End of the longest prefix of `text` this capture accepts while leaving
    /// at least one character for the variable that follows it.
    fn split_point(self, text: &str) -> Option<usize> {
        let Capture::Variable(var) = self else {
            return None;
        };
        let min = usize::from(!var.greedy);
        text.char_indices()
            .rev()
            .map(|(i, _)| i)
            .filter(|&i| i >= min)
            .find(|&i| var.accepts(&text[..i]))
    }
}

impl Section {
    /// Match this section against the head of `tokens`.
    ///
    /// Literals are searched leftmost-first from the scan position; text
    /// skipped over belongs to the pending capture, and without one the
    /// literal must start right at the scan position. A greedy element joins
    /// the current token with every remaining token before it is matched.
    /// Characters left over in the token make the match fail.
    pub fn matches<'t>(&self, tokens: &'t [&'t str]) -> Option<SectionMatch<'t>> {
        let (head, mut rest) = tokens.split_first()?;
        let mut text: Cow<'t, str> = Cow::Borrowed(*head);
        let mut greedy = false;
        let mut pos = 0;
        let mut pending: Option<Capture<'_>> = None;
        let mut bindings = Vec::new();

        for elem in self.elements() {
            if elem.is_greedy() && !greedy {
                let mut joined = text.into_owned();
                rest.iter().for_each(|token| joined.push_str(token));
                text = Cow::Owned(joined);
                rest = &[];
                greedy = true;
            }

            match elem {
                Element::Literal(literal) | Element::Wildcard(literal) => {
                    let found = text[pos..].find(literal.as_str())?;
                    match pending.take() {
                        Some(capture) => capture.bind(&text[pos..pos + found], &mut bindings)?,
                        None if found != 0 => return None,
                        None => {}
                    }
                    pos += found + literal.len();
                    if let Element::Wildcard(_) = elem {
                        pending = Some(Capture::Anonymous);
                    }
                }
                Element::Variable(var) => {
                    if let Some(capture) = pending.take() {
                        let end = pos + capture.split_point(&text[pos..])?;
                        capture.bind(&text[pos..end], &mut bindings)?;
                        pos = end;
                    }
                    pending = Some(Capture::Variable(var));
                }
            }
        }

        match pending {
            Some(capture) => capture.bind(&text[pos..], &mut bindings)?,
            None if pos != text.len() => return None,
            None => {}
        }

        Some(SectionMatch {
            rest,
            bindings,
            greedy,
        })
    }
}
