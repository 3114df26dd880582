//! Recursive-descent parser producing the expression tree (§3 Expressions)

use super::{
    lexer::{tokenize, Token},
    Namespaces, XPathError,
};

#[derive(Clone, Debug, PartialEq)]
pub(super) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arithmetic(ArithmeticOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Variable(String),
    Function(String, Vec<Expr>),
    Path(LocationPath),
    /// A primary expression with predicates, optionally followed by a relative path.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Clone, Debug, PartialEq)]
pub(super) struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq)]
pub(super) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "following" => Axis::Following,
            "following-sibling" => Axis::FollowingSibling,
            "parent" => Axis::Parent,
            "preceding" => Axis::Preceding,
            "preceding-sibling" => Axis::PrecedingSibling,
            "self" => Axis::SelfAxis,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(super) enum NodeTest {
    /// Expanded name; an unprefixed name has no namespace.
    Name {
        namespace: Option<String>,
        local: String,
    },
    /// `*`
    Any,
    /// `prefix:*`
    AnyInNamespace(String),
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

pub(super) fn parse(source: &str, namespaces: &Namespaces) -> Result<Expr, XPathError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        namespaces,
    };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error(format!(
            "unexpected {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    namespaces: &'a Namespaces,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> XPathError {
        XPathError::Syntax {
            expression: self.source.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), XPathError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}, found {:?}", self.peek())))
        }
    }

    fn resolve_prefix(&self, prefix: &str) -> Result<String, XPathError> {
        self.namespaces
            .resolve(prefix)
            .map(str::to_string)
            .ok_or_else(|| XPathError::UnboundPrefix(prefix.to_string()))
    }

    fn expr(&mut self) -> Result<Expr, XPathError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.equality_expr()?;
        while self.eat(&Token::And) {
            let rhs = self.equality_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality_expr(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.relational_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::NotEq,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.relational_expr()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn relational_expr(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.additive_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive_expr()?;
            lhs = Expr::Compare(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive_expr(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithmeticOp::Add,
                Some(Token::Minus) => ArithmeticOp::Subtract,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative_expr()?;
            lhs = Expr::Arithmetic(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Multiply) => ArithmeticOp::Multiply,
                Some(Token::Div) => ArithmeticOp::Divide,
                Some(Token::Mod) => ArithmeticOp::Modulo,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary_expr()?;
            lhs = Expr::Arithmetic(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Token::Minus) {
            let operand = self.unary_expr()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.path_expr()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.path_expr()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// Whether the current token starts a FilterExpr rather than a LocationPath.
    fn at_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Variable(_) | Token::LParen | Token::Literal(_) | Token::Number(_)) => true,
            Some(Token::Name { prefix, local }) => {
                self.peek_at(1) == Some(&Token::LParen)
                    && !(prefix.is_none() && is_node_type(local))
            }
            _ => false,
        }
    }

    fn path_expr(&mut self) -> Result<Expr, XPathError> {
        if !self.at_primary() {
            return self.location_path().map(Expr::Path);
        }

        let primary = self.primary_expr()?;
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.predicate()?);
        }

        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                self.relative_location_path(&mut steps)?;
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(Step::descendant_or_self());
                self.relative_location_path(&mut steps)?;
            }
            _ => {}
        }

        if predicates.is_empty() && steps.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            })
        }
    }

    fn primary_expr(&mut self) -> Result<Expr, XPathError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Variable(name) => Ok(Expr::Variable(name)),
            Token::Literal(value) => Ok(Expr::Literal(value)),
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::LParen => {
                let expr = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::Name { prefix, local } => {
                let name = match prefix {
                    Some(prefix) => format!("{prefix}:{local}"),
                    None => local,
                };
                self.expect(&Token::LParen)?;
                let mut arguments = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        arguments.push(self.expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Function(name, arguments))
            }
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }

    fn predicate(&mut self) -> Result<Expr, XPathError> {
        self.expect(&Token::LBracket)?;
        let expr = self.expr()?;
        self.expect(&Token::RBracket)?;
        Ok(expr)
    }

    fn at_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Name { .. }
                    | Token::Star
                    | Token::PrefixWildcard(_)
                    | Token::At
                    | Token::Dot
                    | Token::DotDot
            )
        )
    }

    fn location_path(&mut self) -> Result<LocationPath, XPathError> {
        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if self.at_step() {
                    self.relative_location_path(&mut steps)?;
                }
                Ok(LocationPath {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(Step::descendant_or_self());
                self.relative_location_path(&mut steps)?;
                Ok(LocationPath {
                    absolute: true,
                    steps,
                })
            }
            _ => {
                self.relative_location_path(&mut steps)?;
                Ok(LocationPath {
                    absolute: false,
                    steps,
                })
            }
        }
    }

    fn relative_location_path(&mut self, steps: &mut Vec<Step>) -> Result<(), XPathError> {
        steps.push(self.step()?);
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    steps.push(self.step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step::descendant_or_self());
                    steps.push(self.step()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name { prefix: None, local }), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = match Axis::from_name(local) {
                Some(axis) => axis,
                None if local == "namespace" => {
                    return Err(XPathError::Unsupported("the namespace axis".to_string()))
                }
                None => return Err(self.error(format!("unknown axis {local:?}"))),
            };
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.node_test()?;
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.predicate()?);
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, XPathError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("expected a node test"))?;
        self.pos += 1;
        match token {
            Token::Star => Ok(NodeTest::Any),
            Token::PrefixWildcard(prefix) => {
                Ok(NodeTest::AnyInNamespace(self.resolve_prefix(&prefix)?))
            }
            Token::Name {
                prefix: None,
                local,
            } if is_node_type(&local) && self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let test = match local.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => match self.peek().cloned() {
                        Some(Token::Literal(target)) => {
                            self.pos += 1;
                            NodeTest::ProcessingInstruction(Some(target))
                        }
                        _ => NodeTest::ProcessingInstruction(None),
                    },
                };
                self.expect(&Token::RParen)?;
                Ok(test)
            }
            Token::Name { prefix, local } => {
                let namespace = prefix.map(|p| self.resolve_prefix(&p)).transpose()?;
                Ok(NodeTest::Name { namespace, local })
            }
            other => Err(self.error(format!("expected a node test, found {other:?}"))),
        }
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(
        name,
        "node" | "text" | "comment" | "processing-instruction"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(source: &str) -> Expr {
        parse(source, &Namespaces::default()).unwrap()
    }

    fn child(local: &str) -> Step {
        Step {
            axis: Axis::Child,
            test: NodeTest::Name {
                namespace: None,
                local: local.to_string(),
            },
            predicates: Vec::new(),
        }
    }

    #[test]
    fn abbreviated_descendant_path() {
        assert_eq!(
            parse_default("//a/b"),
            Expr::Path(LocationPath {
                absolute: true,
                steps: vec![Step::descendant_or_self(), child("a"), child("b")],
            })
        );
    }

    #[test]
    fn root_alone_is_an_absolute_empty_path() {
        assert_eq!(
            parse_default("/"),
            Expr::Path(LocationPath {
                absolute: true,
                steps: Vec::new(),
            })
        );
    }

    #[test]
    fn operator_precedence() {
        let expr = parse_default("1 + 2 * 3 = 7 or false()");
        let Expr::Or(lhs, rhs) = expr else {
            panic!("expected or");
        };
        assert_eq!(*rhs, Expr::Function("false".to_string(), Vec::new()));
        let Expr::Compare(CompareOp::Eq, sum, _) = *lhs else {
            panic!("expected comparison");
        };
        assert!(matches!(*sum, Expr::Arithmetic(ArithmeticOp::Add, _, _)));
    }

    #[test]
    fn filter_expression_with_path() {
        let expr = parse_default("$items[1]/name");
        assert!(matches!(
            expr,
            Expr::Filter { ref predicates, ref steps, .. } if predicates.len() == 1 && steps.len() == 1
        ));
    }

    #[test]
    fn node_type_tests_are_not_functions() {
        let Expr::Path(path) = parse_default("text()") else {
            panic!("expected path");
        };
        assert_eq!(path.steps[0].test, NodeTest::Text);
    }

    #[test]
    fn prefixes_resolve_through_namespaces() {
        let mut namespaces = Namespaces::default();
        namespaces.insert("h", "http://www.w3.org/1999/xhtml");
        let Expr::Path(path) = parse("h:p", &namespaces).unwrap() else {
            panic!("expected path");
        };
        assert_eq!(
            path.steps[0].test,
            NodeTest::Name {
                namespace: Some("http://www.w3.org/1999/xhtml".to_string()),
                local: "p".to_string(),
            }
        );

        assert_eq!(
            parse("x:p", &namespaces),
            Err(XPathError::UnboundPrefix("x".to_string()))
        );
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(parse("a b", &Namespaces::default()).is_err());
        assert!(parse("namespace::*", &Namespaces::default()).is_err());
    }
}
