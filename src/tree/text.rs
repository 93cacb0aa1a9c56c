//! Text format
//!
//! ```text
//! dtree(class) =
//! { (color)
//!   red, blue:{ yes: 5 (83.3%), no: 1 (16.7%) },
//!   green:{ (size|1.5)
//!     <:{ yes: 1 (100.0%) },
//!     >:{ no: 3 (100.0%) }}};
//! ```
//!
//! Metric leaves read `{ mean ~ rmse [weight] }`. Values that share a child
//! are listed before one colon, the first of them owns the child. Only leaf
//! statistics are stored, inner nodes are re-aggregated when parsing.
use super::tree::Tree;
use crate::data::{AttributeKind, AttributeSet};
use crate::errors::DTreeError;
use crate::node::{Node, Slot, Split, Summary};
use std::fmt::{self, Display};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const SYMBOLS: &str = "{}()|:,;=[]/~%<>";

fn is_bare(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'))
}

fn push_name(out: &mut String, name: &str) {
    if is_bare(name) {
        out.push_str(name);
        return;
    }
    out.push('\'');
    for c in name.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
}

impl Tree {
    /// Render the tree in the text format.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("dtree(");
        push_name(&mut out, self.target_name());
        out.push_str(") =\n");
        self.write_node(&mut out, 0, 0);
        out.push_str(";\n");
        out
    }

    fn target_name(&self) -> &str {
        self.target_attribute().map(|a| a.name.as_str()).unwrap_or("")
    }

    fn value_label(&self, attribute: usize, code: usize) -> String {
        self.attributes
            .get(attribute)
            .and_then(|a| a.value_name(code))
            .map(|s| s.to_string())
            .unwrap_or_else(|| code.to_string())
    }

    fn write_node(&self, out: &mut String, id: usize, indent: usize) {
        let node = &self.nodes[id];
        out.push_str("{ ");
        let split = match &node.split {
            None => {
                self.write_leaf(out, &node.summary);
                out.push_str(" }");
                return;
            }
            Some(split) => split,
        };
        out.push('(');
        let name = self
            .attributes
            .get(split.attribute)
            .map(|a| a.name.as_str())
            .unwrap_or("");
        push_name(out, name);
        if let Some(cut) = split.cut {
            out.push_str(&format!("|{}", cut));
        }
        out.push(')');
        let pad = " ".repeat(indent + 2);
        let mut first = true;
        for owner in split.owning_slots() {
            if !first {
                out.push(',');
            }
            first = false;
            out.push('\n');
            out.push_str(&pad);
            let members = (0..split.slots.len()).filter(|s| *s != owner && split.owner(*s) == Some(owner));
            for (k, slot) in std::iter::once(owner).chain(members).enumerate() {
                if k > 0 {
                    out.push_str(", ");
                }
                match split.cut {
                    Some(_) => out.push(if slot == 0 { '<' } else { '>' }),
                    None => push_name(out, &self.value_label(split.attribute, slot)),
                }
            }
            out.push(':');
            if let Some(child) = split.child(owner) {
                self.write_node(out, child, indent + 2);
            }
        }
        out.push('}');
    }

    fn write_leaf(&self, out: &mut String, summary: &Summary) {
        match summary {
            Summary::Nominal { weight, frqs, .. } => {
                let mut first = true;
                for (c, f) in frqs.iter().enumerate() {
                    if *f <= 0.0 && !(first && c + 1 == frqs.len()) {
                        continue;
                    }
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    push_name(out, &self.value_label(self.target, c));
                    let pct = if *weight > 0.0 { 100.0 * f / weight } else { 0.0 };
                    out.push_str(&format!(": {} ({:.1}%)", f, pct));
                }
            }
            Summary::Metric { weight, mean, sse } => {
                let rmse = if *weight > 0.0 { (sse / weight).sqrt() } else { 0.0 };
                out.push_str(&format!("{} ~ {} [{}]", mean, rmse, weight));
            }
        }
    }

    /// Parse a tree in the text format over the given attribute set.
    pub fn parse(text: &str, attributes: Arc<AttributeSet>) -> Result<Tree, DTreeError> {
        Parser::new(text, attributes)?.tree()
    }

    /// Write the text format to a file.
    pub fn save_text<P: AsRef<Path>>(&self, path: P) -> Result<(), DTreeError> {
        fs::write(path, self.to_text()).map_err(|e| DTreeError::UnableToWrite(e.to_string()))
    }

    /// Read a tree in the text format from a file.
    pub fn load_text<P: AsRef<Path>>(path: P, attributes: Arc<AttributeSet>) -> Result<Tree, DTreeError> {
        let text = fs::read_to_string(path).map_err(|e| DTreeError::UnableToRead(e.to_string()))?;
        Tree::parse(&text, attributes)
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Sym(char),
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, DTreeError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c == '\n' {
            line += 1;
            chars.next();
        } else if c.is_whitespace() {
            chars.next();
        } else if SYMBOLS.contains(c) {
            tokens.push((Token::Sym(c), line));
            chars.next();
        } else if c == '\'' {
            chars.next();
            let start = line;
            let mut s = String::new();
            loop {
                match chars.next() {
                    None => {
                        return Err(DTreeError::Parse {
                            line: start,
                            message: "unterminated quoted name".to_string(),
                        })
                    }
                    Some('\'') => break,
                    Some('\\') => {
                        if let Some(e) = chars.next() {
                            s.push(e);
                        }
                    }
                    Some(ch) => {
                        if ch == '\n' {
                            line += 1;
                        }
                        s.push(ch);
                    }
                }
            }
            tokens.push((Token::Quoted(s), start));
        } else if is_bare(&c.to_string()) {
            let mut s = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '+' | '-') {
                    s.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((Token::Word(s), line));
        } else {
            return Err(DTreeError::Parse {
                line,
                message: format!("unexpected character '{}'", c),
            });
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    attributes: Arc<AttributeSet>,
    target: usize,
    nodes: Vec<Node>,
}

impl Parser {
    fn new(text: &str, attributes: Arc<AttributeSet>) -> Result<Self, DTreeError> {
        Ok(Parser {
            tokens: tokenize(text)?,
            pos: 0,
            attributes,
            target: 0,
            nodes: Vec::new(),
        })
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn error<T>(&self, message: String) -> Result<T, DTreeError> {
        Err(DTreeError::Parse {
            line: self.line(),
            message,
        })
    }

    fn peek_sym(&self, c: char) -> bool {
        matches!(self.tokens.get(self.pos), Some((Token::Sym(s), _)) if *s == c)
    }

    fn expect(&mut self, c: char) -> Result<(), DTreeError> {
        if self.peek_sym(c) {
            self.pos += 1;
            Ok(())
        } else {
            self.error(format!("'{}' expected", c))
        }
    }

    fn name(&mut self) -> Result<String, DTreeError> {
        match self.tokens.get(self.pos) {
            Some((Token::Word(s), _)) | Some((Token::Quoted(s), _)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => self.error("name expected".to_string()),
        }
    }

    fn number(&mut self) -> Result<f64, DTreeError> {
        match self.tokens.get(self.pos) {
            Some((Token::Word(s), _)) => match s.parse::<f64>() {
                Ok(v) => {
                    self.pos += 1;
                    Ok(v)
                }
                Err(_) => self.error(format!("number expected, found '{}'", s)),
            },
            _ => self.error("number expected".to_string()),
        }
    }

    fn tree(mut self) -> Result<Tree, DTreeError> {
        let head = self.name()?;
        if head != "dtree" {
            return self.error(format!("'dtree' expected, found '{}'", head));
        }
        self.expect('(')?;
        let target_name = self.name()?;
        self.target = match self.attributes.index_of(&target_name) {
            Some(t) => t,
            None => return self.error(format!("unknown target attribute '{}'", target_name)),
        };
        self.expect(')')?;
        self.expect('=')?;
        self.node()?;
        self.expect(';')?;
        if self.pos < self.tokens.len() {
            return self.error("unexpected text after tree".to_string());
        }
        let root = self.empty_summary();
        let mut tree = Tree::new(Arc::clone(&self.attributes), self.target, root)?;
        tree.nodes = self.nodes;
        for id in (0..tree.nodes.len()).rev() {
            if !tree.nodes[id].is_leaf() {
                tree.nodes[id].summary = tree.aggregate(id);
            }
        }
        tree.check()?;
        tree.update_stats();
        Ok(tree)
    }

    fn empty_summary(&self) -> Summary {
        match self.attributes.get(self.target).map(|a| &a.kind) {
            Some(AttributeKind::Nominal(values)) => Summary::nominal(vec![0.0; values.len()]),
            _ => Summary::metric(0.0, 0.0, 0.0),
        }
    }

    fn push(&mut self, node: Node) -> Result<usize, DTreeError> {
        self.nodes.try_reserve(1).map_err(|_| DTreeError::OutOfMemory)?;
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    fn node(&mut self) -> Result<usize, DTreeError> {
        self.expect('{')?;
        if self.peek_sym('(') {
            self.test_node()
        } else {
            self.leaf()
        }
    }

    fn test_node(&mut self) -> Result<usize, DTreeError> {
        self.expect('(')?;
        let name = self.name()?;
        let attribute = match self.attributes.index_of(&name) {
            Some(a) => a,
            None => return self.error(format!("unknown attribute '{}'", name)),
        };
        let cut = if self.peek_sym('|') {
            self.pos += 1;
            Some(self.number()?)
        } else {
            None
        };
        self.expect(')')?;
        let nslots = match (self.attributes.get(attribute).map(|a| &a.kind), cut) {
            (Some(AttributeKind::Nominal(values)), None) => values.len(),
            (Some(AttributeKind::Integer | AttributeKind::Continuous), Some(_)) => 2,
            _ => return self.error(format!("test on '{}' does not match its type", name)),
        };
        let empty = self.empty_summary();
        let id = self.push(Node::leaf(empty))?;
        let mut split = Split::new(attribute, cut, nslots);
        loop {
            let mut labels = Vec::new();
            loop {
                let slot = match cut {
                    Some(_) if self.peek_sym('<') => {
                        self.pos += 1;
                        0
                    }
                    Some(_) if self.peek_sym('>') => {
                        self.pos += 1;
                        1
                    }
                    Some(_) => return self.error("'<' or '>' expected".to_string()),
                    None => {
                        let value = self.name()?;
                        match self.attributes.get(attribute).and_then(|a| a.value_code(&value)) {
                            Some(code) => code,
                            None => return self.error(format!("unknown value '{}' of '{}'", value, name)),
                        }
                    }
                };
                if split.slots[slot] != Slot::Empty || labels.contains(&slot) {
                    return self.error("value listed twice".to_string());
                }
                labels.push(slot);
                if self.peek_sym(',') {
                    self.pos += 1;
                } else {
                    self.expect(':')?;
                    break;
                }
            }
            let child = self.node()?;
            let owner = labels[0];
            split.slots[owner] = Slot::Owned(child);
            for slot in &labels[1..] {
                split.slots[*slot] = Slot::Alias(owner);
            }
            if self.peek_sym(',') {
                self.pos += 1;
            } else {
                self.expect('}')?;
                break;
            }
        }
        self.nodes[id].split = Some(split);
        Ok(id)
    }

    fn leaf(&mut self) -> Result<usize, DTreeError> {
        let summary = match self.attributes.get(self.target).map(|a| a.kind.clone()) {
            Some(AttributeKind::Nominal(values)) => {
                let mut frqs = vec![0.0; values.len()];
                loop {
                    let class = self.name()?;
                    let code = match values.iter().position(|v| *v == class) {
                        Some(c) => c,
                        None => return self.error(format!("unknown class '{}'", class)),
                    };
                    self.expect(':')?;
                    frqs[code] = self.number()?;
                    if self.peek_sym('(') {
                        self.pos += 1;
                        self.number()?;
                        self.expect('%')?;
                        self.expect(')')?;
                    }
                    if self.peek_sym(',') {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Summary::nominal(frqs)
            }
            _ => {
                let mean = self.number()?;
                self.expect('~')?;
                let rmse = self.number()?;
                self.expect('[')?;
                let weight = self.number()?;
                self.expect(']')?;
                Summary::Metric {
                    weight,
                    mean,
                    sse: rmse * rmse * weight,
                }
            }
        };
        if self.peek_sym('[') {
            self.pos += 1;
            self.number()?;
            self.expect('/')?;
            self.number()?;
            self.expect(']')?;
        }
        self.expect('}')?;
        self.push(Node::leaf(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, Value};
    use tempfile::tempdir;

    fn attributes() -> Arc<AttributeSet> {
        Arc::new(
            AttributeSet::from_attributes(vec![
                Attribute::nominal("color", &["red", "green", "blue"]),
                Attribute::continuous("size"),
                Attribute::nominal("class", &["yes", "no way"]),
            ])
            .unwrap(),
        )
    }

    fn sample_tree() -> Tree {
        let mut tree = Tree::new(attributes(), 2, Summary::nominal(vec![6.0, 4.0])).unwrap();
        let a = tree.push(Node::leaf(Summary::nominal(vec![5.0, 1.0]))).unwrap();
        let b = tree.push(Node::leaf(Summary::nominal(vec![1.0, 3.0]))).unwrap();
        let c = tree.push(Node::leaf(Summary::nominal(vec![1.0, 0.0]))).unwrap();
        let d = tree.push(Node::leaf(Summary::nominal(vec![0.0, 3.0]))).unwrap();
        let mut inner = Split::new(1, Some(1.5), 2);
        inner.slots = vec![Slot::Owned(c), Slot::Owned(d)];
        tree.nodes[b].split = Some(inner);
        let mut split = Split::new(0, None, 3);
        split.slots = vec![Slot::Owned(a), Slot::Owned(b), Slot::Alias(0)];
        tree.nodes[0].split = Some(split);
        tree.update_stats();
        tree
    }

    #[test]
    fn test_write() {
        let text = sample_tree().to_text();
        let expected = "dtree(class) =\n\
{ (color)\n  \
red, blue:{ yes: 5 (83.3%), 'no way': 1 (16.7%) },\n  \
green:{ (size|1.5)\n    \
<:{ yes: 1 (100.0%) },\n    \
>:{ 'no way': 3 (100.0%) }}};\n";
        assert_eq!(expected, text);
    }

    #[test]
    fn test_round_trip() {
        let tree = sample_tree();
        let parsed = Tree::parse(&tree.to_text(), attributes()).unwrap();
        assert_eq!(tree.nodes, parsed.nodes);
        assert_eq!(3, parsed.height);
        assert_eq!(tree.to_text(), parsed.to_text());
    }

    #[test]
    fn test_metric_round_trip() {
        let atts = Arc::new(
            AttributeSet::from_attributes(vec![Attribute::integer("x y"), Attribute::continuous("y")]).unwrap(),
        );
        let mut tree = Tree::new(Arc::clone(&atts), 1, Summary::metric(6.0, 44.0, 410.0)).unwrap();
        let a = tree.push(Node::leaf(Summary::metric(2.0, 4.0, 10.0))).unwrap();
        let b = tree.push(Node::leaf(Summary::metric(4.0, 40.0, 400.0))).unwrap();
        let mut split = Split::new(0, Some(0.1), 2);
        split.slots = vec![Slot::Owned(a), Slot::Owned(b)];
        tree.nodes[0].split = Some(split);
        let text = tree.to_text();
        assert!(text.starts_with("dtree(y) =\n{ ('x y'|0.1)\n  <:{ 2 ~ 1 [2] },"));
        let parsed = Tree::parse(&text, atts).unwrap();
        for x in [-1.0, 1.0] {
            let record = [Value::Integer(x as i64), Value::Missing];
            let p = tree.classify(&record, 1.0).unwrap();
            let q = parsed.classify(&record, 1.0).unwrap();
            assert_eq!(p.value, q.value);
        }
    }

    #[test]
    fn test_annotations_ignored() {
        let text = "dtree(class) = { (color) red:{ yes: 2 (100%) [2/1] }, green, blue:{ 'no way': 1 } };";
        let tree = Tree::parse(text, attributes()).unwrap();
        assert_eq!(2, tree.leaves);
        let split = tree.root().split.as_ref().unwrap();
        assert_eq!(Slot::Alias(1), split.slots[2]);
        assert_eq!(Summary::nominal(vec![2.0, 1.0]), tree.root().summary);
    }

    #[test]
    fn test_parse_errors() {
        let err = Tree::parse("dtree(class) =\n{ (color)\n  purple:{ yes: 1 } };", attributes()).unwrap_err();
        assert!(matches!(err, DTreeError::Parse { line: 3, .. }));
        assert!(Tree::parse("dtree(kind) = { yes: 1 };", attributes()).is_err());
        assert!(Tree::parse("dtree(class) = { (size) <:{ yes: 1 } };", attributes()).is_err());
        assert!(Tree::parse("dtree(class) = { yes: 1 }", attributes()).is_err());
        assert!(Tree::parse("dtree(class) = { (color) red, red:{ yes: 1 } };", attributes()).is_err());
    }

    #[test]
    fn test_file_io() {
        let tree = sample_tree();
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.dt");
        tree.save_text(&path).unwrap();
        let loaded = Tree::load_text(&path, attributes()).unwrap();
        assert_eq!(tree.nodes, loaded.nodes);
        assert_eq!(tree.to_string(), loaded.to_string());
    }
}
