//! Path selection and boolean expressions over configuration trees.
//!
//! This is the Tree capability that stands in for XPath: slash paths
//! with key predicates for selecting nodes, and a small boolean
//! expression language for `must`/`when` statements and changelog
//! guards. Evaluation is stateless and never mutates the tree.
//!
//! Grammar:
//! ```text
//! path  := '/'? step ('/' step)*
//! step  := '..' | '*' | NAME pred*
//! pred  := '[' NAME '=' LITERAL ']'
//! expr  := or
//! or    := and ('or' and)*
//! and   := cmp ('and' cmp)*
//! cmp   := operand (OP operand)? | 'not' '(' expr ')'
//! operand := 'count' '(' path ')' | LITERAL | NUMBER | path
//! ```

use canopy_core::NodeId;
use thiserror::Error;

use crate::tree::ConfigTree;

/// Errors from parsing a path or expression.
#[derive(Debug, Error, PartialEq)]
pub enum PathError {
    /// Character the tokenizer does not understand.
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),

    /// Token out of place.
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    /// A quoted literal without a closing quote.
    #[error("unterminated string literal")]
    UnterminatedString,

    /// An empty path.
    #[error("empty path")]
    Empty,
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A named child step with optional key predicates.
    Named {
        name: String,
        predicates: Vec<(String, String)>,
    },
    /// Wildcard child step (`*`).
    Any,
    /// Parent step (`..`).
    Parent,
}

/// A parsed path.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// True if the path starts at the tree root.
    pub absolute: bool,
    /// The steps, in order.
    pub steps: Vec<Step>,
}

impl Path {
    /// Parse a path from its textual form.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser::new(tokens);
        let path = parser.path()?;
        parser.expect_eof()?;
        Ok(path)
    }

    /// Select the nodes this path matches, relative to `ctx`.
    pub fn select(&self, tree: &ConfigTree, ctx: NodeId) -> Vec<NodeId> {
        let mut set: Vec<NodeId> = if self.absolute {
            vec![tree.root()]
        } else {
            vec![ctx]
        };
        for step in &self.steps {
            let mut next = Vec::new();
            for node in &set {
                match step {
                    Step::Parent => {
                        if let Ok(Some(p)) = tree.parent(*node) {
                            if !next.contains(&p) {
                                next.push(p);
                            }
                        }
                    }
                    Step::Any => next.extend(tree.child_elements(*node)),
                    Step::Named { name, predicates } => {
                        for child in tree.child_elements(*node) {
                            if tree.name(child).map(|n| n == name).unwrap_or(false)
                                && predicates.iter().all(|(key, value)| {
                                    tree.child_body(child, key)
                                        .map(|b| b.as_deref() == Some(value.as_str()))
                                        .unwrap_or(false)
                                })
                            {
                                next.push(child);
                            }
                        }
                    }
                }
            }
            set = next;
        }
        set
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A boolean expression over a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Node-set existence or truthiness of an operand.
    Operand(Operand),
    /// Comparison between two operands.
    Compare(Operand, CmpOp, Operand),
    /// Negation.
    Not(Box<Expr>),
    /// Conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Disjunction.
    Or(Box<Expr>, Box<Expr>),
}

/// An expression operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A path selecting a node set.
    Path(Path),
    /// A quoted string literal.
    Literal(String),
    /// A numeric literal.
    Number(f64),
    /// `count(path)`.
    Count(Path),
}

impl Expr {
    /// Parse an expression from its textual form.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser::new(tokens);
        let expr = parser.expr()?;
        parser.expect_eof()?;
        Ok(expr)
    }

    /// Evaluate the expression to a boolean, relative to `ctx`.
    pub fn eval(&self, tree: &ConfigTree, ctx: NodeId) -> bool {
        match self {
            Expr::Operand(op) => op.eval(tree, ctx).truthy(),
            Expr::Compare(lhs, op, rhs) => {
                compare(&lhs.eval(tree, ctx), *op, &rhs.eval(tree, ctx), tree)
            }
            Expr::Not(inner) => !inner.eval(tree, ctx),
            Expr::And(a, b) => a.eval(tree, ctx) && b.eval(tree, ctx),
            Expr::Or(a, b) => a.eval(tree, ctx) || b.eval(tree, ctx),
        }
    }
}

/// A string-yielding expression: either a quoted literal or a path
/// whose first match's body is taken. Used by changelog `rename`.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// A quoted literal.
    Literal(String),
    /// A path; evaluates to the body of its first match.
    Path(Path),
}

impl ValueExpr {
    /// Parse a value expression.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let trimmed = input.trim();
        if trimmed.starts_with('\'') || trimmed.starts_with('"') {
            let tokens = tokenize(trimmed)?;
            match tokens.first() {
                Some(Token::Literal(s)) if tokens.len() == 1 => Ok(ValueExpr::Literal(s.clone())),
                _ => Err(PathError::UnexpectedToken(trimmed.to_string())),
            }
        } else {
            Ok(ValueExpr::Path(Path::parse(trimmed)?))
        }
    }

    /// Evaluate to a string, relative to `ctx`.
    pub fn eval(&self, tree: &ConfigTree, ctx: NodeId) -> Option<String> {
        match self {
            ValueExpr::Literal(s) => Some(s.clone()),
            ValueExpr::Path(path) => {
                let nodes = path.select(tree, ctx);
                nodes.first().and_then(|n| tree.body(*n).ok().flatten())
            }
        }
    }
}

// ========== Evaluation values ==========

enum Value {
    Nodes(Vec<NodeId>),
    Str(String),
    Num(f64),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0,
        }
    }
}

impl Operand {
    fn eval(&self, tree: &ConfigTree, ctx: NodeId) -> Value {
        match self {
            Operand::Path(path) => Value::Nodes(path.select(tree, ctx)),
            Operand::Literal(s) => Value::Str(s.clone()),
            Operand::Number(n) => Value::Num(*n),
            Operand::Count(path) => Value::Num(path.select(tree, ctx).len() as f64),
        }
    }
}

fn cmp_strings(a: &str, op: CmpOp, b: &str) -> bool {
    // Numbers compare numerically when both sides parse.
    if let (Ok(na), Ok(nb)) = (a.parse::<f64>(), b.parse::<f64>()) {
        return cmp_nums(na, op, nb);
    }
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

fn cmp_nums(a: f64, op: CmpOp, b: f64) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

fn compare(lhs: &Value, op: CmpOp, rhs: &Value, tree: &ConfigTree) -> bool {
    // Node-set comparisons hold if any member satisfies the relation.
    let bodies = |nodes: &[NodeId]| -> Vec<String> {
        nodes
            .iter()
            .filter_map(|n| tree.body(*n).ok().flatten())
            .collect()
    };
    match (lhs, rhs) {
        (Value::Nodes(a), Value::Nodes(b)) => {
            let (ba, bb) = (bodies(a), bodies(b));
            ba.iter().any(|x| bb.iter().any(|y| cmp_strings(x, op, y)))
        }
        (Value::Nodes(a), Value::Str(s)) => bodies(a).iter().any(|x| cmp_strings(x, op, s)),
        (Value::Str(s), Value::Nodes(b)) => bodies(b).iter().any(|y| cmp_strings(s, op, y)),
        (Value::Nodes(a), Value::Num(n)) => bodies(a)
            .iter()
            .any(|x| x.parse::<f64>().map(|v| cmp_nums(v, op, *n)).unwrap_or(false)),
        (Value::Num(n), Value::Nodes(b)) => bodies(b)
            .iter()
            .any(|y| y.parse::<f64>().map(|v| cmp_nums(*n, op, v)).unwrap_or(false)),
        (Value::Str(a), Value::Str(b)) => cmp_strings(a, op, b),
        (Value::Num(a), Value::Num(b)) => cmp_nums(*a, op, *b),
        (Value::Str(s), Value::Num(n)) => {
            s.parse::<f64>().map(|v| cmp_nums(v, op, *n)).unwrap_or(false)
        }
        (Value::Num(n), Value::Str(s)) => {
            s.parse::<f64>().map(|v| cmp_nums(*n, op, v)).unwrap_or(false)
        }
    }
}

// ========== Tokenizer ==========

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    Star,
    DotDot,
    LBrack,
    RBrack,
    LParen,
    RParen,
    Ident(String),
    Literal(String),
    Number(f64),
    Op(CmpOp),
}

fn tokenize(input: &str) -> Result<Vec<Token>, PathError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBrack);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBrack);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Le));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Lt));
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(PathError::UnterminatedString),
                    }
                }
                tokens.push(Token::Literal(s));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| PathError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(n));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric()
                        || chars[i] == '_'
                        || chars[i] == '-'
                        || chars[i] == '.'
                        || chars[i] == ':')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            _ => return Err(PathError::UnexpectedChar(c, i)),
        }
    }
    Ok(tokens)
}

// ========== Parser ==========

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token) -> Result<(), PathError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(PathError::UnexpectedToken(format!("{:?}", self.peek())))
        }
    }

    fn expect_eof(&self) -> Result<(), PathError> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(PathError::UnexpectedToken(format!("{:?}", tok))),
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == kw)
    }

    fn path(&mut self) -> Result<Path, PathError> {
        let absolute = self.eat(&Token::Slash);
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some(Token::DotDot) => {
                    self.bump();
                    steps.push(Step::Parent);
                }
                Some(Token::Star) => {
                    self.bump();
                    steps.push(Step::Any);
                }
                Some(Token::Ident(_)) => {
                    let name = match self.bump() {
                        Some(Token::Ident(s)) => s,
                        _ => unreachable!(),
                    };
                    let mut predicates = Vec::new();
                    while self.eat(&Token::LBrack) {
                        let key = match self.bump() {
                            Some(Token::Ident(s)) => s,
                            other => {
                                return Err(PathError::UnexpectedToken(format!("{:?}", other)))
                            }
                        };
                        self.expect(Token::Op(CmpOp::Eq))?;
                        let value = match self.bump() {
                            Some(Token::Literal(s)) => s,
                            Some(Token::Number(n)) => format_num(n),
                            other => {
                                return Err(PathError::UnexpectedToken(format!("{:?}", other)))
                            }
                        };
                        self.expect(Token::RBrack)?;
                        predicates.push((key, value));
                    }
                    steps.push(Step::Named { name, predicates });
                }
                _ => return Err(PathError::UnexpectedToken(format!("{:?}", self.peek()))),
            }
            if !self.eat(&Token::Slash) {
                break;
            }
        }
        if steps.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Path { absolute, steps })
    }

    fn expr(&mut self) -> Result<Expr, PathError> {
        let mut lhs = self.and_expr()?;
        while self.is_keyword("or") {
            self.bump();
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, PathError> {
        let mut lhs = self.cmp_expr()?;
        while self.is_keyword("and") {
            self.bump();
            let rhs = self.cmp_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> Result<Expr, PathError> {
        if self.is_keyword("not") {
            self.bump();
            self.expect(Token::LParen)?;
            let inner = self.expr()?;
            self.expect(Token::RParen)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        let lhs = self.operand()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.bump();
            let rhs = self.operand()?;
            return Ok(Expr::Compare(lhs, op, rhs));
        }
        Ok(Expr::Operand(lhs))
    }

    fn operand(&mut self) -> Result<Operand, PathError> {
        match self.peek().cloned() {
            Some(Token::Literal(s)) => {
                self.bump();
                Ok(Operand::Literal(s))
            }
            Some(Token::Number(n)) => {
                self.bump();
                Ok(Operand::Number(n))
            }
            Some(Token::Ident(s)) if s == "count" && self.tokens.get(self.pos + 1) == Some(&Token::LParen) => {
                self.bump();
                self.expect(Token::LParen)?;
                let path = self.path()?;
                self.expect(Token::RParen)?;
                Ok(Operand::Count(path))
            }
            _ => Ok(Operand::Path(self.path()?)),
        }
    }
}

fn format_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigTree {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let ifaces = tree.add_element(root, "interfaces", Some("urn:example:if")).unwrap();
        for (name, mtu) in [("eth0", "1500"), ("eth1", "9000")] {
            let entry = tree.add_element(ifaces, "interface", None).unwrap();
            tree.add_leaf(entry, "name", None, name).unwrap();
            tree.add_leaf(entry, "mtu", None, mtu).unwrap();
        }
        tree
    }

    #[test]
    fn test_select_absolute_with_predicate() {
        // GIVEN
        let tree = sample();

        // WHEN
        let path = Path::parse("/interfaces/interface[name='eth1']/mtu").unwrap();
        let hits = path.select(&tree, tree.root());

        // THEN
        assert_eq!(hits.len(), 1);
        assert_eq!(tree.body(hits[0]).unwrap(), Some("9000".to_string()));
    }

    #[test]
    fn test_select_wildcard() {
        let tree = sample();
        let path = Path::parse("/interfaces/*").unwrap();
        assert_eq!(path.select(&tree, tree.root()).len(), 2);
    }

    #[test]
    fn test_select_relative_and_parent() {
        // GIVEN
        let tree = sample();
        let path = Path::parse("/interfaces/interface[name='eth0']").unwrap();
        let eth0 = path.select(&tree, tree.root())[0];

        // WHEN - step down, then back up
        let rel = Path::parse("mtu/..").unwrap();
        let hits = rel.select(&tree, eth0);

        // THEN
        assert_eq!(hits, vec![eth0]);
    }

    #[test]
    fn test_expr_compare_numeric() {
        // GIVEN
        let tree = sample();

        // THEN - numeric comparison against a node set
        let expr = Expr::parse("/interfaces/interface/mtu > 2000").unwrap();
        assert!(expr.eval(&tree, tree.root()));

        let expr = Expr::parse("/interfaces/interface/mtu > 10000").unwrap();
        assert!(!expr.eval(&tree, tree.root()));
    }

    #[test]
    fn test_expr_count_and_not() {
        let tree = sample();
        let expr = Expr::parse("count(/interfaces/interface) = 2").unwrap();
        assert!(expr.eval(&tree, tree.root()));

        let expr = Expr::parse("not(count(/interfaces/interface) = 2)").unwrap();
        assert!(!expr.eval(&tree, tree.root()));
    }

    #[test]
    fn test_expr_existence_and_boolean_ops() {
        let tree = sample();
        let expr =
            Expr::parse("/interfaces/interface[name='eth0'] and /interfaces/interface[name='eth1']")
                .unwrap();
        assert!(expr.eval(&tree, tree.root()));

        let expr = Expr::parse("/interfaces/interface[name='eth9'] or count(/interfaces) = 1")
            .unwrap();
        assert!(expr.eval(&tree, tree.root()));
    }

    #[test]
    fn test_value_expr_literal_and_path() {
        let tree = sample();
        assert_eq!(
            ValueExpr::parse("'renamed'").unwrap().eval(&tree, tree.root()),
            Some("renamed".to_string())
        );
        let ve = ValueExpr::parse("/interfaces/interface[name='eth0']/name").unwrap();
        assert_eq!(ve.eval(&tree, tree.root()), Some("eth0".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("/a/[x='1']").is_err());
        assert!(Expr::parse("count(/a").is_err());
        assert!(ValueExpr::parse("'open").is_err());
    }
}
