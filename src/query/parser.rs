//! Lexer and recursive-descent parser for the query language

use super::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Path(LocationPath),
    /// Primary expression with predicates and an optional trailing relative path
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Negate(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }

    /// Reverse axes number their nodes nearest-first
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Plus,
    Minus,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Star,
    Multiply,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    Name(String),
    Axis(String),
    NodeType(String),
    Function(String),
}

impl Token {
    /// Whether a following `*` or name must be read as an operator
    fn forces_operator(&self) -> bool {
        !matches!(
            self,
            Token::At
                | Token::Axis(_)
                | Token::LParen
                | Token::LBracket
                | Token::Comma
                | Token::Slash
                | Token::DoubleSlash
                | Token::Pipe
                | Token::Plus
                | Token::Minus
                | Token::Eq
                | Token::NotEq
                | Token::Lt
                | Token::Lte
                | Token::Gt
                | Token::Gte
                | Token::Multiply
                | Token::And
                | Token::Or
                | Token::Div
                | Token::Mod
        )
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, QueryError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<(Token, usize)> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let operator_context = tokens
            .last()
            .map(|(t, _)| t.forces_operator())
            .unwrap_or(false);

        let token = match c {
            '/' if chars.get(i + 1) == Some(&'/') => {
                i += 2;
                Token::DoubleSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                i += 2;
                Token::DotDot
            }
            '.' if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                let (number, next) = read_number(&chars, i);
                i = next;
                Token::Number(number)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::NotEq
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::Lte
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::Gte
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            '*' => {
                i += 1;
                if operator_context {
                    Token::Multiply
                } else {
                    Token::Star
                }
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| QueryError::new(source, "unterminated string literal", Some(i)))?;
                let literal: String = chars[i + 1..i + 1 + end].iter().collect();
                i += end + 2;
                Token::Literal(literal)
            }
            d if d.is_ascii_digit() => {
                let (number, next) = read_number(&chars, i);
                i = next;
                Token::Number(number)
            }
            n if is_name_start(n) => {
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                // A trailing '.' belongs to the next token, not the name
                while i > start + 1 && chars[i - 1] == '.' {
                    i -= 1;
                }
                let name: String = chars[start..i].iter().collect();

                if operator_context {
                    match name.as_str() {
                        "and" => Token::And,
                        "or" => Token::Or,
                        "div" => Token::Div,
                        "mod" => Token::Mod,
                        _ => {
                            return Err(QueryError::new(
                                source,
                                &format!("unexpected name '{}'", name),
                                Some(start),
                            ))
                        }
                    }
                } else {
                    let mut j = i;
                    while j < chars.len() && chars[j].is_whitespace() {
                        j += 1;
                    }
                    if chars.get(j) == Some(&':') && chars.get(j + 1) == Some(&':') {
                        i = j + 2;
                        Token::Axis(name)
                    } else if chars.get(j) == Some(&'(') {
                        match name.as_str() {
                            "text" | "node" | "comment" => Token::NodeType(name),
                            _ => Token::Function(name),
                        }
                    } else {
                        Token::Name(name)
                    }
                }
            }
            other => {
                return Err(QueryError::new(
                    source,
                    &format!("unexpected character '{}'", other),
                    Some(i),
                ))
            }
        };

        tokens.push((token, start));
    }

    Ok(tokens)
}

fn read_number(chars: &[char], mut i: usize) -> (f64, usize) {
    let start = i;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    let text: String = chars[start..i].iter().collect();
    (text.parse().unwrap_or(f64::NAN), i)
}

/// Parse a query expression into an AST
pub(crate) fn parse(source: &str) -> Result<Expr, QueryError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), QueryError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", what)))
        }
    }

    fn error(&self, message: &str) -> QueryError {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|(_, at)| *at)
            .unwrap_or(self.source.len());
        QueryError::new(self.source, message, Some(offset))
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinOp)],
        next: fn(&mut Self) -> Result<Expr, QueryError>,
    ) -> Result<Expr, QueryError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = next(self)?;
                    left = Expr::Binary(Box::new(left), *op, Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(&[(Token::Or, BinOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(&[(Token::And, BinOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(
            &[(Token::Eq, BinOp::Eq), (Token::NotEq, BinOp::NotEq)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(
            &[
                (Token::Lte, BinOp::Lte),
                (Token::Lt, BinOp::Lt),
                (Token::Gte, BinOp::Gte),
                (Token::Gt, BinOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(
            &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(
            &[
                (Token::Multiply, BinOp::Mul),
                (Token::Div, BinOp::Div),
                (Token::Mod, BinOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, QueryError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.binary_level(&[(Token::Pipe, BinOp::Union)], Self::parse_path_expr)
    }

    fn parse_path_expr(&mut self) -> Result<Expr, QueryError> {
        let starts_primary = matches!(
            self.peek(),
            Some(Token::LParen | Token::Literal(_) | Token::Number(_) | Token::Function(_))
        );

        if !starts_primary {
            return Ok(Expr::Path(self.parse_location_path()?));
        }

        let primary = self.parse_primary()?;
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.parse_predicate()?);
        }

        let mut steps = Vec::new();
        if matches!(self.peek(), Some(Token::Slash | Token::DoubleSlash)) {
            steps = self.parse_relative_steps(true)?;
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

    fn parse_primary(&mut self) -> Result<Expr, QueryError> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Function(name)) => {
                self.expect(&Token::LParen, "'('")?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma, "',' or ')'")?;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            _ => Err(self.error("expected expression")),
        }
    }

    fn parse_predicate(&mut self) -> Result<Expr, QueryError> {
        self.expect(&Token::LBracket, "'['")?;
        let expr = self.parse_or()?;
        self.expect(&Token::RBracket, "']'")?;
        Ok(expr)
    }

    fn parse_location_path(&mut self) -> Result<LocationPath, QueryError> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let steps = if self.starts_step() {
                    self.parse_relative_steps(false)?
                } else {
                    Vec::new()
                };
                Ok(LocationPath {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => Ok(LocationPath {
                absolute: true,
                steps: self.parse_relative_steps(true)?,
            }),
            _ => Ok(LocationPath {
                absolute: false,
                steps: self.parse_relative_steps(false)?,
            }),
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Dot
                    | Token::DotDot
                    | Token::At
                    | Token::Star
                    | Token::Name(_)
                    | Token::Axis(_)
                    | Token::NodeType(_)
            )
        )
    }

    /// Steps separated by `/` or `//`. With `leading_separator` the first separator has
    /// not been consumed yet.
    fn parse_relative_steps(&mut self, leading_separator: bool) -> Result<Vec<Step>, QueryError> {
        let mut steps = Vec::new();

        if leading_separator {
            self.push_separator(&mut steps)?;
        }
        steps.push(self.parse_step()?);

        while matches!(self.peek(), Some(Token::Slash | Token::DoubleSlash)) {
            self.push_separator(&mut steps)?;
            steps.push(self.parse_step()?);
        }

        Ok(steps)
    }

    fn push_separator(&mut self, steps: &mut Vec<Step>) -> Result<(), QueryError> {
        match self.advance() {
            Some(Token::Slash) => Ok(()),
            Some(Token::DoubleSlash) => {
                steps.push(Step {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
                Ok(())
            }
            _ => Err(self.error("expected '/'")),
        }
    }

    fn parse_step(&mut self) -> Result<Step, QueryError> {
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

        let axis = match self.peek() {
            Some(Token::At) => {
                self.pos += 1;
                Axis::Attribute
            }
            Some(Token::Axis(name)) => {
                let axis = Axis::from_name(name)
                    .ok_or_else(|| self.error(&format!("unsupported axis '{}'", name)))?;
                self.pos += 1;
                axis
            }
            _ => Axis::Child,
        };

        let test = match self.peek() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) => NodeTest::Name(name.clone()),
            Some(Token::NodeType(kind)) => match kind.as_str() {
                "text" => NodeTest::Text,
                "comment" => NodeTest::Comment,
                _ => NodeTest::Node,
            },
            _ => return Err(self.error("expected node test")),
        };
        let is_node_type = matches!(self.peek(), Some(Token::NodeType(_)));
        self.pos += 1;
        if is_node_type {
            self.expect(&Token::LParen, "'('")?;
            self.expect(&Token::RParen, "')'")?;
        }

        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.parse_predicate()?);
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }
}
