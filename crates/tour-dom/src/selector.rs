//! CSS selector subset used by [`crate::MemoryDom`]
//!
//! Supported: selector lists, descendant and child combinators, type and
//! universal selectors, `#id`, `.class`, attribute selectors with
//! `= ~= ^= $= *= |=`, and the structural pseudo-classes `:nth-child(n)`,
//! `:nth-of-type(n)`, `:first-child`, `:last-child`, `:first-of-type`,
//! `:last-of-type` and `:not(<compound>)`.

use crate::errors::DomError;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(pub Vec<ComplexSelector>);

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSelector {
    /// Compounds left to right; the combinator joins a compound to the one before it.
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrSelector {
    name: String,
    op: Option<(AttrOp, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
    DashMatch,
}

#[derive(Debug, Clone, PartialEq)]
enum Pseudo {
    NthChild(usize),
    NthOfType(usize),
    FirstChild,
    LastChild,
    FirstOfType,
    LastOfType,
    Not(Box<Compound>),
}

/// Tree access needed to evaluate a selector.
pub trait SelectorTree {
    type Node: Copy + Eq;

    fn tag_name(&self, node: Self::Node) -> String;
    fn attr(&self, node: Self::Node, name: &str) -> Option<String>;
    fn parent_element(&self, node: Self::Node) -> Option<Self::Node>;
    fn element_children(&self, node: Self::Node) -> Vec<Self::Node>;
}

pub fn parse(input: &str) -> Result<SelectorList, DomError> {
    Parser::new(input).parse_list()
}

impl SelectorList {
    pub fn matches<T: SelectorTree>(&self, tree: &T, node: T::Node) -> bool {
        self.0.iter().any(|complex| complex.matches(tree, node))
    }
}

impl ComplexSelector {
    pub fn matches<T: SelectorTree>(&self, tree: &T, node: T::Node) -> bool {
        let last = self.parts.len() - 1;
        self.parts[last].1.matches(tree, node) && self.match_from(tree, node, last)
    }

    /// `node` already matches `parts[idx]`; check the compounds to its left.
    fn match_from<T: SelectorTree>(&self, tree: &T, node: T::Node, idx: usize) -> bool {
        if idx == 0 {
            return true;
        }
        let previous = &self.parts[idx - 1].1;
        match self.parts[idx].0 {
            Combinator::Child => tree.parent_element(node).map_or(false, |parent| {
                previous.matches(tree, parent) && self.match_from(tree, parent, idx - 1)
            }),
            Combinator::Descendant => {
                let mut current = tree.parent_element(node);
                while let Some(ancestor) = current {
                    if previous.matches(tree, ancestor) && self.match_from(tree, ancestor, idx - 1)
                    {
                        return true;
                    }
                    current = tree.parent_element(ancestor);
                }
                false
            }
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.pseudos.is_empty()
    }

    fn matches<T: SelectorTree>(&self, tree: &T, node: T::Node) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && !tree.tag_name(node).eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        if !self.ids.is_empty() {
            let id = tree.attr(node, "id");
            if !self.ids.iter().all(|want| id.as_deref() == Some(want.as_str())) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let class_attr = tree.attr(node, "class").unwrap_or_default();
            let classes: Vec<&str> = class_attr.split_whitespace().collect();
            if !self.classes.iter().all(|want| classes.contains(&want.as_str())) {
                return false;
            }
        }

        for attr in &self.attrs {
            let Some(actual) = tree.attr(node, &attr.name) else {
                return false;
            };
            if let Some((op, expected)) = &attr.op {
                let ok = match op {
                    AttrOp::Equals => actual == *expected,
                    AttrOp::Includes => actual.split_whitespace().any(|word| word == expected),
                    AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected.as_str()),
                    AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected.as_str()),
                    AttrOp::Substring => !expected.is_empty() && actual.contains(expected.as_str()),
                    AttrOp::DashMatch => {
                        actual == *expected || actual.starts_with(&format!("{expected}-"))
                    }
                };
                if !ok {
                    return false;
                }
            }
        }

        self.pseudos.iter().all(|pseudo| pseudo.matches(tree, node))
    }
}

impl Pseudo {
    fn matches<T: SelectorTree>(&self, tree: &T, node: T::Node) -> bool {
        match self {
            Pseudo::Not(inner) => !inner.matches(tree, node),
            _ => {
                let Some(parent) = tree.parent_element(node) else {
                    return false;
                };
                let siblings = tree.element_children(parent);
                let tag = tree.tag_name(node);
                let same_type: Vec<T::Node> = siblings
                    .iter()
                    .copied()
                    .filter(|sibling| tree.tag_name(*sibling).eq_ignore_ascii_case(&tag))
                    .collect();
                let position = |list: &[T::Node]| list.iter().position(|n| *n == node);

                match self {
                    Pseudo::NthChild(n) => position(&siblings) == Some(n.wrapping_sub(1)),
                    Pseudo::NthOfType(n) => position(&same_type) == Some(n.wrapping_sub(1)),
                    Pseudo::FirstChild => position(&siblings) == Some(0),
                    Pseudo::LastChild => siblings.last() == Some(&node),
                    Pseudo::FirstOfType => position(&same_type) == Some(0),
                    Pseudo::LastOfType => same_type.last() == Some(&node),
                    Pseudo::Not(_) => unreachable!(),
                }
            }
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DomError {
        DomError::invalid_selector(self.source, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, DomError> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(other) => return Err(self.error(format!("unexpected '{other}'"))),
            }
        }
        Ok(SelectorList(list))
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, DomError> {
        let mut parts = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') | Some(')') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    Combinator::Child
                }
                Some('+') | Some('~') => {
                    return Err(self.error("sibling combinators are not supported"))
                }
                _ if had_ws => Combinator::Descendant,
                Some(other) => return Err(self.error(format!("unexpected '{other}'"))),
            };
            parts.push((combinator, self.parse_compound()?));
        }
        Ok(ComplexSelector { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, DomError> {
        let mut compound = Compound::default();

        if self.eat('*') {
            compound.tag = Some("*".to_string());
        } else if matches!(self.peek(), Some(c) if is_ident_start(c)) {
            compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.parse_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attr()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.pseudos.push(self.parse_pseudo()?);
                }
                _ => break,
            }
        }

        if compound.is_empty() {
            return Err(self.error("expected a selector"));
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, DomError> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                ident.push(escaped);
                self.pos += 1;
            } else if is_ident_char(c) {
                ident.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(ident)
    }

    fn parse_attr(&mut self) -> Result<AttrSelector, DomError> {
        self.skip_ws();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_ws();
        if self.eat(']') {
            return Ok(AttrSelector { name, op: None });
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                AttrOp::Equals
            }
            Some(c @ ('~' | '^' | '$' | '*' | '|')) => {
                self.pos += 1;
                if !self.eat('=') {
                    return Err(self.error("expected '=' in attribute selector"));
                }
                match c {
                    '~' => AttrOp::Includes,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '*' => AttrOp::Substring,
                    _ => AttrOp::DashMatch,
                }
            }
            _ => return Err(self.error("malformed attribute selector")),
        };

        self.skip_ws();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                self.parse_quoted(quote)?
            }
            _ => self.parse_ident()?,
        };
        self.skip_ws();
        // Case-sensitivity flags are accepted and ignored.
        if matches!(self.peek(), Some('i' | 's' | 'I' | 'S')) {
            self.pos += 1;
            self.skip_ws();
        }
        if !self.eat(']') {
            return Err(self.error("unterminated attribute selector"));
        }
        Ok(AttrSelector {
            name,
            op: Some((op, value)),
        })
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, DomError> {
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    value.push(escaped);
                    self.pos += 1;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(value);
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_pseudo(&mut self) -> Result<Pseudo, DomError> {
        let name = self.parse_ident()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(Pseudo::FirstChild),
            "last-child" => Ok(Pseudo::LastChild),
            "first-of-type" => Ok(Pseudo::FirstOfType),
            "last-of-type" => Ok(Pseudo::LastOfType),
            "nth-child" | "nth-of-type" => {
                let n = self.parse_index_arg()?;
                Ok(if name == "nth-child" {
                    Pseudo::NthChild(n)
                } else {
                    Pseudo::NthOfType(n)
                })
            }
            "not" => {
                if !self.eat('(') {
                    return Err(self.error("expected '(' after :not"));
                }
                self.skip_ws();
                let inner = self.parse_compound()?;
                self.skip_ws();
                if !self.eat(')') {
                    return Err(self.error("unterminated :not()"));
                }
                Ok(Pseudo::Not(Box::new(inner)))
            }
            other => Err(self.error(format!("unsupported pseudo-class :{other}"))),
        }
    }

    fn parse_index_arg(&mut self) -> Result<usize, DomError> {
        if !self.eat('(') {
            return Err(self.error("expected '('"));
        }
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        self.skip_ws();
        if !self.eat(')') {
            return Err(self.error("only plain integer positions are supported"));
        }
        match digits.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(self.error("position must be a positive integer")),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || c == '\\' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tiny tree: (tag, attrs, parent)
    struct Fixture(Vec<(&'static str, Vec<(&'static str, &'static str)>, Option<usize>)>);

    impl SelectorTree for Fixture {
        type Node = usize;

        fn tag_name(&self, node: usize) -> String {
            self.0[node].0.to_string()
        }

        fn attr(&self, node: usize, name: &str) -> Option<String> {
            self.0[node]
                .1
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }

        fn parent_element(&self, node: usize) -> Option<usize> {
            self.0[node].2
        }

        fn element_children(&self, node: usize) -> Vec<usize> {
            (0..self.0.len())
                .filter(|i| self.0[*i].2 == Some(node))
                .collect()
        }
    }

    fn tree() -> Fixture {
        Fixture(vec![
            ("body", vec![], None),
            ("header", vec![("role", "banner")], Some(0)),
            ("button", vec![("class", "primary big"), ("data-testid", "publish")], Some(1)),
            ("button", vec![("aria-label", "Close dialog"), ("id", "close")], Some(1)),
            ("div", vec![("data-type", "core/image")], Some(0)),
            ("img", vec![], Some(4)),
        ])
    }

    fn matches(selector: &str, node: usize) -> bool {
        parse(selector).unwrap().matches(&tree(), node)
    }

    #[test]
    fn simple_selectors() {
        assert!(matches("button", 2));
        assert!(matches(".primary.big", 2));
        assert!(matches("#close", 3));
        assert!(matches("[data-testid=\"publish\"]", 2));
        assert!(!matches("[data-testid=\"other\"]", 2));
        assert!(matches("[aria-label*='dialog']", 3));
        assert!(matches("[aria-label^=Close]", 3));
        assert!(matches("[data-type$=\"image\"]", 4));
    }

    #[test]
    fn combinators() {
        assert!(matches("header > button", 2));
        assert!(matches("body button", 3));
        assert!(!matches("body > button", 2));
        assert!(matches("[data-type=\"core/image\"] img", 5));
        assert!(matches("[role=\"banner\"] .primary", 2));
    }

    #[test]
    fn structural_pseudos() {
        assert!(matches("button:nth-of-type(1)", 2));
        assert!(matches("button:nth-of-type(2)", 3));
        assert!(matches("button:last-child", 3));
        assert!(matches("div:nth-child(2)", 4));
        assert!(matches("button:not(.primary)", 3));
        assert!(!matches("button:not(.primary)", 2));
    }

    #[test]
    fn selector_lists() {
        assert!(matches("a, #close", 3));
        assert!(matches("img , header", 1));
    }

    #[test]
    fn escaped_identifiers() {
        let list = parse("#a\\:b").unwrap();
        let fixture = Fixture(vec![("div", vec![("id", "a:b")], None)]);
        assert!(list.matches(&fixture, 0));
    }

    #[test]
    fn invalid_selectors_are_errors() {
        for bad in ["", "button[", "div >", ":hover", "a ~ b", "li:nth-child(odd)", "[x=\"y]"] {
            assert!(parse(bad).is_err(), "{bad} should not parse");
        }
    }
}
