//! Route pattern compiler.
//!
//! A pattern such as `/api/v{version}/{path:[a-z/]+}*` is scanned left to
//! right into [`Element`]s, grouped into one [`Section`] per path segment.
//! Every unescaped `/` outside a variable starts a new section whose first
//! element is a literal beginning with `/`, mirroring how request paths are
//! tokenized in [`crate::matcher::path_tokens`].

use std::cmp::Ordering;
use std::fmt;
use std::mem;

use regex_lite::Regex;
use thiserror::Error;

/// Why a pattern failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    /// A `{` without its matching `}`.
    #[error("unclosed variable")]
    UnclosedVariable,

    /// The constraint of a variable is not a valid regular expression.
    #[error("{0}")]
    InvalidConstraint(String),

    /// More than one greedy element in a pattern.
    #[error("only one greedy element is allowed per pattern")]
    MultipleGreedy,

    /// A variable directly follows an unconstrained capture.
    #[error("variable follows an unconstrained capture without a separating literal")]
    AmbiguousVariables,

    /// An escaped `/` inside a segment, which no request path can contain.
    #[error("escaped `/` cannot match inside a path segment")]
    EscapedSeparator,

    /// Nothing to compile.
    #[error("empty pattern")]
    EmptyPattern,
}

/// A malformed route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid [{fragment}] in [{pattern}] at position {position}: {kind}")]
pub struct CompileError {
    /// The full pattern being compiled.
    pub pattern: String,
    /// The offending piece of the pattern.
    pub fragment: String,
    /// Byte offset of the offending piece.
    pub position: usize,
    /// What went wrong.
    pub kind: CompileErrorKind,
}

impl CompileError {
    fn new(pattern: &str, fragment: &str, position: usize, kind: CompileErrorKind) -> Self {
        Self {
            pattern: pattern.to_string(),
            fragment: fragment.to_string(),
            position,
            kind,
        }
    }
}

/// An anchored regular expression constraining a variable.
///
/// Two validators are equal when their source expressions are equal.
#[derive(Debug, Clone)]
pub struct Validator {
    source: String,
    regex: Regex,
}

impl Validator {
    /// Compile `expr` so that it must match a whole capture.
    pub fn new(expr: &str) -> Result<Self, regex_lite::Error> {
        let regex = Regex::new(&format!("^(?:{expr})$"))?;
        Ok(Self {
            source: expr.to_string(),
            regex,
        })
    }

    /// The expression as written in the pattern.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `value` matches the expression in full.
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Validator {}

/// A named capture inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Capture name. Empty for an anonymous capture, which is matched but never reported.
    pub name: String,
    /// Optional constraint on the captured text.
    pub validator: Option<Validator>,
    /// Whether the capture may run across the remaining path segments.
    pub greedy: bool,
}

impl Variable {
    /// Whether `value` satisfies the constraint, if any.
    pub fn accepts(&self, value: &str) -> bool {
        self.validator.as_ref().map_or(true, |v| v.is_match(value))
    }
}

/// One atomic piece of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// Text that must appear verbatim.
    Literal(String),
    /// A `{name}` or `{name:constraint}` capture, optionally greedy.
    Variable(Variable),
    /// Text followed by an anonymous capture of the rest of the path (`text*`).
    Wildcard(String),
}

impl Element {
    /// Whether this element absorbs the remaining path segments.
    pub fn is_greedy(&self) -> bool {
        match self {
            Element::Literal(_) => false,
            Element::Variable(var) => var.greedy,
            Element::Wildcard(_) => true,
        }
    }

    fn literal_text(&self) -> Option<&str> {
        match self {
            Element::Literal(text) | Element::Wildcard(text) => Some(text),
            Element::Variable(_) => None,
        }
    }
}

/// Ordering key used to try sibling sections most-specific first.
///
/// Greater means more specific: sections ending in a greedy element rank
/// below all others, then the score `100 * literals - variables` decides,
/// then the total length of literal text. A greedy element followed by a
/// suffix such as `{path}*:action` does not count as a greedy ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specificity {
    greedy: bool,
    score: i64,
    literal_len: usize,
}

impl Specificity {
    /// `100` per literal element, `-1` per variable.
    pub fn score(&self) -> i64 {
        self.score
    }

    /// Whether the section ends with a greedy element.
    pub fn is_greedy(&self) -> bool {
        self.greedy
    }
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .greedy
            .cmp(&self.greedy)
            .then(self.score.cmp(&other.score))
            .then(self.literal_len.cmp(&other.literal_len))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The compiled form of one path segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    elements: Vec<Element>,
}

impl Section {
    /// Compile a single segment pattern. `/` is not treated as a separator.
    pub fn parse(segment: &str) -> Result<Self, CompileError> {
        let mut sections = Compiler::new(segment, false).run()?;
        // Without splitting the compiler yields exactly one section.
        Ok(sections.pop().unwrap_or_default())
    }

    /// The elements in pattern order.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Whether any element absorbs the rest of the path.
    pub fn is_greedy(&self) -> bool {
        self.elements.iter().any(Element::is_greedy)
    }

    /// Whether both sections match exactly the same text, ignoring what
    /// their variables are called.
    pub fn same_shape(&self, other: &Section) -> bool {
        self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|pair| match pair {
                    (Element::Variable(a), Element::Variable(b)) => {
                        a.greedy == b.greedy && a.validator == b.validator
                    }
                    (a, b) => a == b,
                })
    }

    /// Names of the named variables, in order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|elem| match elem {
            Element::Variable(var) if !var.name.is_empty() => Some(var.name.as_str()),
            _ => None,
        })
    }

    /// Ranking among sibling sections.
    pub fn specificity(&self) -> Specificity {
        let mut literals = 0i64;
        let mut variables = 0i64;
        let mut literal_len = 0;
        for elem in &self.elements {
            match elem.literal_text() {
                Some(text) => {
                    literals += 1;
                    literal_len += text.len();
                }
                None => variables += 1,
            }
        }
        Specificity {
            greedy: self.elements.last().is_some_and(Element::is_greedy),
            score: 100 * literals - variables,
            literal_len,
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, constraints: bool) -> fmt::Result {
        let mut tail = false;
        for (index, elem) in self.elements.iter().enumerate() {
            if let Some(text) = elem.literal_text() {
                write_literal(f, text, index == 0, tail)?;
            }
            if let Element::Variable(var) = elem {
                f.write_str("{")?;
                f.write_str(&var.name)?;
                if let (true, Some(validator)) = (constraints, &var.validator) {
                    write!(f, ":{}", validator.as_str())?;
                }
                f.write_str("}")?;
            }
            if elem.is_greedy() {
                f.write_str("*")?;
                tail = true;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, true)
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, text: &str, leads: bool, tail: bool) -> fmt::Result {
    for (i, c) in text.char_indices() {
        let escape = match c {
            '\\' | '{' | '}' | '*' => true,
            '/' => !tail && !(leads && i == 0),
            _ => false,
        };
        if escape {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

/// A full route pattern compiled into sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    sections: Vec<Section>,
}

impl Pattern {
    /// Compile a full pattern, splitting it into one section per segment.
    ///
    /// Request paths are split at every `/`, so `\/` is rejected unless it
    /// follows the greedy element, where the rest of the path is one text.
    pub fn parse(pattern: &str) -> Result<Self, CompileError> {
        let sections = Compiler::new(pattern, true).run()?;
        Ok(Self {
            source: pattern.to_string(),
            sections,
        })
    }

    /// The pattern as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn into_sections(self) -> Vec<Section> {
        self.sections
    }

    /// All named variables across sections, in order. Repeated names are kept.
    pub fn variables(&self) -> Vec<String> {
        self.sections
            .iter()
            .flat_map(Section::variables)
            .map(str::to_string)
            .collect()
    }

    /// The pattern with constraint expressions stripped, e.g. `/users/{id}`.
    pub fn skeleton(&self) -> String {
        struct Skeleton<'a>(&'a [Section]);

        impl fmt::Display for Skeleton<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.iter().try_for_each(|section| section.write(f, false))
            }
        }

        Skeleton(&self.sections).to_string()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.sections.iter().try_for_each(|section| section.write(f, true))
    }
}

/// Single-pass scanner turning pattern text into sections.
struct Compiler<'p> {
    pattern: &'p str,
    split: bool,
    sections: Vec<Section>,
    elements: Vec<Element>,
    literal: String,
    greedy: bool,
}

impl<'p> Compiler<'p> {
    fn new(pattern: &'p str, split: bool) -> Self {
        Self {
            pattern,
            split,
            sections: Vec::new(),
            elements: Vec::new(),
            literal: String::new(),
            greedy: false,
        }
    }

    fn run(mut self) -> Result<Vec<Section>, CompileError> {
        let mut chars = self.pattern.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, '/')) if self.split && !self.greedy => {
                        return Err(CompileError::new(
                            self.pattern,
                            r"\/",
                            i,
                            CompileErrorKind::EscapedSeparator,
                        ));
                    }
                    Some((_, escaped)) => self.literal.push(escaped),
                    None => self.literal.push('\\'),
                },
                '{' => {
                    self.flush_literal();
                    let end = self.variable_end(i)?;
                    while chars.next_if(|&(j, _)| j <= end).is_some() {}
                    let greedy = chars.next_if(|&(_, c)| c == '*').is_some();
                    self.push_variable(i, end, greedy)?;
                }
                '*' => {
                    self.mark_greedy(i)?;
                    let text = mem::take(&mut self.literal);
                    self.elements.push(Element::Wildcard(text));
                }
                // After a greedy element the rest of the pattern stays in one section.
                '/' if self.split && !self.greedy => {
                    self.flush_literal();
                    self.flush_section();
                    self.literal.push('/');
                }
                c => self.literal.push(c),
            }
        }

        self.flush_literal();
        self.flush_section();

        if self.sections.is_empty() {
            return Err(CompileError::new(
                self.pattern,
                "",
                0,
                CompileErrorKind::EmptyPattern,
            ));
        }
        Ok(self.sections)
    }

    /// Byte offset of the `}` closing the variable opened at `start`.
    fn variable_end(&self, start: usize) -> Result<usize, CompileError> {
        let bytes = self.pattern.as_bytes();
        let mut depth = 0usize;
        let mut i = start;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 1,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(CompileError::new(
            self.pattern,
            &self.pattern[start..],
            self.pattern.len(),
            CompileErrorKind::UnclosedVariable,
        ))
    }

    fn push_variable(&mut self, start: usize, end: usize, greedy: bool) -> Result<(), CompileError> {
        let body = &self.pattern[start + 1..end];
        let (name, constraint) = body.split_once(':').unwrap_or((body, ""));

        let validator = if constraint.is_empty() {
            None
        } else {
            let position = start + 1 + name.len() + 1;
            let validator = Validator::new(constraint).map_err(|e| {
                CompileError::new(
                    self.pattern,
                    constraint,
                    position,
                    CompileErrorKind::InvalidConstraint(e.to_string()),
                )
            })?;
            Some(validator)
        };

        if let Some(Element::Variable(Variable { validator: None, .. }) | Element::Wildcard(_)) =
            self.elements.last()
        {
            return Err(CompileError::new(
                self.pattern,
                &self.pattern[start..=end],
                start,
                CompileErrorKind::AmbiguousVariables,
            ));
        }

        if greedy {
            self.mark_greedy(end + 1)?;
        }

        self.elements.push(Element::Variable(Variable {
            name: name.to_string(),
            validator,
            greedy,
        }));
        Ok(())
    }

    fn mark_greedy(&mut self, position: usize) -> Result<(), CompileError> {
        if self.greedy {
            return Err(CompileError::new(
                self.pattern,
                "*",
                position,
                CompileErrorKind::MultipleGreedy,
            ));
        }
        self.greedy = true;
        Ok(())
    }

    fn flush_literal(&mut self) {
        if !self.literal.is_empty() {
            let text = mem::take(&mut self.literal);
            self.elements.push(Element::Literal(text));
        }
    }

    fn flush_section(&mut self) {
        if !self.elements.is_empty() {
            let elements = mem::take(&mut self.elements);
            self.sections.push(Section { elements });
        }
    }
}
