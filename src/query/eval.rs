//! Query evaluation over document nodes

use std::collections::HashSet;

use super::parser::{Axis, BinOp, Expr, LocationPath, NodeTest, Step};
use super::QueryValue;
use crate::document::XNode;

type EvalResult<'a> = Result<QueryValue<'a>, String>;

#[derive(Clone, Copy)]
struct Context<'a> {
    node: XNode<'a>,
    position: usize,
    size: usize,
}

pub(super) fn evaluate<'a>(expr: &Expr, node: XNode<'a>) -> EvalResult<'a> {
    eval(
        expr,
        &Context {
            node,
            position: 1,
            size: 1,
        },
    )
}

fn eval<'a>(expr: &Expr, ctx: &Context<'a>) -> EvalResult<'a> {
    match expr {
        Expr::Path(path) => eval_path(path, ctx.node).map(QueryValue::Nodes),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            let QueryValue::Nodes(mut nodes) = eval(primary, ctx)? else {
                return Err("predicates and path steps require a node-set".to_string());
            };
            for predicate in predicates {
                nodes = filter(nodes, predicate)?;
            }
            if !steps.is_empty() {
                nodes = apply_steps(nodes, steps)?;
            }
            Ok(QueryValue::Nodes(nodes))
        }
        Expr::Literal(s) => Ok(QueryValue::String(s.clone())),
        Expr::Number(n) => Ok(QueryValue::Number(*n)),
        Expr::Function(name, args) => call(name, args, ctx),
        Expr::Negate(inner) => Ok(QueryValue::Number(-to_number(&eval(inner, ctx)?))),
        Expr::Binary(left, op, right) => binary(left, *op, right, ctx),
    }
}

fn root_of(node: XNode<'_>) -> XNode<'_> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        current = parent;
    }
    current
}

fn eval_path<'a>(path: &LocationPath, node: XNode<'a>) -> Result<Vec<XNode<'a>>, String> {
    let start = if path.absolute { root_of(node) } else { node };
    apply_steps(vec![start], &path.steps)
}

fn apply_steps<'a>(mut nodes: Vec<XNode<'a>>, steps: &[Step]) -> Result<Vec<XNode<'a>>, String> {
    for step in steps {
        nodes = apply_step(&nodes, step)?;
        if nodes.is_empty() {
            break;
        }
    }
    Ok(nodes)
}

fn apply_step<'a>(contexts: &[XNode<'a>], step: &Step) -> Result<Vec<XNode<'a>>, String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for context in contexts {
        let mut candidates: Vec<XNode<'a>> = axis_nodes(*context, step.axis)
            .into_iter()
            .filter(|n| matches_test(n, &step.test, step.axis))
            .collect();

        for predicate in &step.predicates {
            candidates = filter(candidates, predicate)?;
        }

        for candidate in candidates {
            if seen.insert(candidate.identity()) {
                out.push(candidate);
            }
        }
    }

    if contexts.len() > 1 || step.axis.is_reverse() {
        sort_document_order(&mut out);
    }
    Ok(out)
}

fn sort_document_order(nodes: &mut [XNode<'_>]) {
    nodes.sort_by_cached_key(|n| n.order_key());
}

fn filter<'a>(nodes: Vec<XNode<'a>>, predicate: &Expr) -> Result<Vec<XNode<'a>>, String> {
    let size = nodes.len();
    let mut kept = Vec::with_capacity(size);

    for (i, node) in nodes.into_iter().enumerate() {
        let ctx = Context {
            node,
            position: i + 1,
            size,
        };
        let keep = match eval(predicate, &ctx)? {
            QueryValue::Number(n) => n == (i + 1) as f64,
            other => to_boolean(&other),
        };
        if keep {
            kept.push(node);
        }
    }

    Ok(kept)
}

fn axis_nodes(node: XNode<'_>, axis: Axis) -> Vec<XNode<'_>> {
    match axis {
        Axis::Child => node.children(),
        Axis::Descendant => descendants(node),
        Axis::DescendantOrSelf => {
            let mut nodes = vec![node];
            nodes.extend(descendants(node));
            nodes
        }
        Axis::SelfAxis => vec![node],
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Ancestor => ancestors(node),
        Axis::AncestorOrSelf => {
            let mut nodes = vec![node];
            nodes.extend(ancestors(node));
            nodes
        }
        Axis::FollowingSibling => match node {
            XNode::Element(_) | XNode::Text(_) => node
                .tree_node()
                .next_siblings()
                .filter_map(XNode::from_node)
                .collect(),
            _ => Vec::new(),
        },
        Axis::PrecedingSibling => match node {
            XNode::Element(_) | XNode::Text(_) => node
                .tree_node()
                .prev_siblings()
                .filter_map(XNode::from_node)
                .collect(),
            _ => Vec::new(),
        },
        Axis::Attribute => match node {
            XNode::Element(el) => el
                .value()
                .attrs()
                .map(|(name, value)| XNode::Attribute {
                    owner: el,
                    name,
                    value,
                })
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn descendants(node: XNode<'_>) -> Vec<XNode<'_>> {
    match node {
        XNode::Element(_) | XNode::Document(_) => node
            .tree_node()
            .descendants()
            .skip(1)
            .filter_map(XNode::from_node)
            .collect(),
        _ => Vec::new(),
    }
}

fn ancestors(node: XNode<'_>) -> Vec<XNode<'_>> {
    let mut out = Vec::new();
    let mut current = node.parent();
    while let Some(parent) = current {
        out.push(parent);
        current = parent.parent();
    }
    out
}

fn matches_test(node: &XNode<'_>, test: &NodeTest, axis: Axis) -> bool {
    let principal = if axis == Axis::Attribute {
        node.is_attribute()
    } else {
        node.is_element()
    };

    match test {
        NodeTest::Name(name) => {
            principal && node.name().is_some_and(|n| n.eq_ignore_ascii_case(name))
        }
        NodeTest::Any => principal,
        NodeTest::Text => matches!(node, XNode::Text(_)),
        NodeTest::Node => true,
        NodeTest::Comment => false,
    }
}

fn arg<'a>(args: &[Expr], index: usize, ctx: &Context<'a>) -> EvalResult<'a> {
    match args.get(index) {
        Some(expr) => eval(expr, ctx),
        None => Ok(QueryValue::Nodes(vec![ctx.node])),
    }
}

fn string_arg(args: &[Expr], index: usize, ctx: &Context<'_>) -> Result<String, String> {
    Ok(to_string(&arg(args, index, ctx)?))
}

fn call<'a>(name: &str, args: &[Expr], ctx: &Context<'a>) -> EvalResult<'a> {
    let arity = args.len();
    let value = match (name, arity) {
        ("last", 0) => QueryValue::Number(ctx.size as f64),
        ("position", 0) => QueryValue::Number(ctx.position as f64),
        ("count", 1) => match eval(&args[0], ctx)? {
            QueryValue::Nodes(nodes) => QueryValue::Number(nodes.len() as f64),
            _ => return Err("count() requires a node-set".to_string()),
        },
        ("not", 1) => QueryValue::Boolean(!to_boolean(&eval(&args[0], ctx)?)),
        ("boolean", 1) => QueryValue::Boolean(to_boolean(&eval(&args[0], ctx)?)),
        ("true", 0) => QueryValue::Boolean(true),
        ("false", 0) => QueryValue::Boolean(false),
        ("string", 0 | 1) => QueryValue::String(string_arg(args, 0, ctx)?),
        ("number", 0 | 1) => QueryValue::Number(to_number(&arg(args, 0, ctx)?)),
        ("string-length", 0 | 1) => {
            QueryValue::Number(string_arg(args, 0, ctx)?.chars().count() as f64)
        }
        ("normalize-space", 0 | 1) => QueryValue::String(
            string_arg(args, 0, ctx)?
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        ),
        ("concat", n) if n >= 2 => {
            let mut out = String::new();
            for i in 0..n {
                out.push_str(&string_arg(args, i, ctx)?);
            }
            QueryValue::String(out)
        }
        ("contains", 2) => {
            let haystack = string_arg(args, 0, ctx)?;
            QueryValue::Boolean(haystack.contains(string_arg(args, 1, ctx)?.as_str()))
        }
        ("starts-with", 2) => {
            let haystack = string_arg(args, 0, ctx)?;
            QueryValue::Boolean(haystack.starts_with(string_arg(args, 1, ctx)?.as_str()))
        }
        ("substring-before", 2) => {
            let haystack = string_arg(args, 0, ctx)?;
            let needle = string_arg(args, 1, ctx)?;
            QueryValue::String(
                haystack
                    .find(needle.as_str())
                    .map(|at| haystack[..at].to_string())
                    .unwrap_or_default(),
            )
        }
        ("substring-after", 2) => {
            let haystack = string_arg(args, 0, ctx)?;
            let needle = string_arg(args, 1, ctx)?;
            QueryValue::String(
                haystack
                    .find(needle.as_str())
                    .map(|at| haystack[at + needle.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        ("substring", 2 | 3) => {
            let source = string_arg(args, 0, ctx)?;
            let start = to_number(&eval(&args[1], ctx)?).round();
            let end = match args.get(2) {
                Some(len) => start + to_number(&eval(len, ctx)?).round(),
                None => f64::INFINITY,
            };
            QueryValue::String(
                source
                    .chars()
                    .enumerate()
                    .filter(|(i, _)| {
                        let pos = (*i + 1) as f64;
                        pos >= start && pos < end
                    })
                    .map(|(_, c)| c)
                    .collect(),
            )
        }
        ("translate", 3) => {
            let source = string_arg(args, 0, ctx)?;
            let from: Vec<char> = string_arg(args, 1, ctx)?.chars().collect();
            let to: Vec<char> = string_arg(args, 2, ctx)?.chars().collect();
            QueryValue::String(
                source
                    .chars()
                    .filter_map(|c| match from.iter().position(|&f| f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect(),
            )
        }
        ("name" | "local-name", 0 | 1) => {
            let value = arg(args, 0, ctx)?;
            let name = match &value {
                QueryValue::Nodes(nodes) => nodes.first().and_then(|n| n.name()).unwrap_or(""),
                _ => return Err(format!("{}() requires a node-set", name)),
            };
            QueryValue::String(name.to_string())
        }
        ("sum", 1) => match eval(&args[0], ctx)? {
            QueryValue::Nodes(nodes) => QueryValue::Number(
                nodes
                    .iter()
                    .map(|n| parse_number(&n.string_value()))
                    .sum(),
            ),
            _ => return Err("sum() requires a node-set".to_string()),
        },
        ("floor", 1) => QueryValue::Number(to_number(&eval(&args[0], ctx)?).floor()),
        ("ceiling", 1) => QueryValue::Number(to_number(&eval(&args[0], ctx)?).ceil()),
        ("round", 1) => QueryValue::Number(to_number(&eval(&args[0], ctx)?).round()),
        _ => return Err(format!("unknown function {}() with {} argument(s)", name, arity)),
    };
    Ok(value)
}

fn binary<'a>(left: &Expr, op: BinOp, right: &Expr, ctx: &Context<'a>) -> EvalResult<'a> {
    match op {
        BinOp::Or => {
            let l = to_boolean(&eval(left, ctx)?);
            Ok(QueryValue::Boolean(l || to_boolean(&eval(right, ctx)?)))
        }
        BinOp::And => {
            let l = to_boolean(&eval(left, ctx)?);
            Ok(QueryValue::Boolean(l && to_boolean(&eval(right, ctx)?)))
        }
        BinOp::Union => {
            let (QueryValue::Nodes(mut l), QueryValue::Nodes(r)) = (eval(left, ctx)?, eval(right, ctx)?)
            else {
                return Err("union requires node-sets".to_string());
            };
            let mut seen: HashSet<_> = l.iter().map(|n| n.identity()).collect();
            l.extend(r.into_iter().filter(|n| seen.insert(n.identity())));
            sort_document_order(&mut l);
            Ok(QueryValue::Nodes(l))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let l = to_number(&eval(left, ctx)?);
            let r = to_number(&eval(right, ctx)?);
            Ok(QueryValue::Number(match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => l / r,
                _ => l % r,
            }))
        }
        _ => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            Ok(QueryValue::Boolean(compare(op, &l, &r)))
        }
    }
}

#[derive(Debug, Clone)]
enum Atom {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Atom {
    fn as_bool(&self) -> bool {
        match self {
            Atom::Str(s) => !s.is_empty(),
            Atom::Num(n) => *n != 0.0 && !n.is_nan(),
            Atom::Bool(b) => *b,
        }
    }

    fn as_number(&self) -> f64 {
        match self {
            Atom::Str(s) => parse_number(s),
            Atom::Num(n) => *n,
            Atom::Bool(b) => f64::from(u8::from(*b)),
        }
    }
}

fn atom(value: &QueryValue<'_>) -> Atom {
    match value {
        QueryValue::String(s) => Atom::Str(s.clone()),
        QueryValue::Number(n) => Atom::Num(*n),
        QueryValue::Boolean(b) => Atom::Bool(*b),
        QueryValue::Nodes(_) => Atom::Str(to_string(value)),
    }
}

/// Atoms a node-set contributes when compared against `other`
fn node_atoms(nodes: &[XNode<'_>], other: &QueryValue<'_>) -> Vec<Atom> {
    match other {
        QueryValue::Boolean(_) => vec![Atom::Bool(!nodes.is_empty())],
        QueryValue::Number(_) => nodes
            .iter()
            .map(|n| Atom::Num(parse_number(&n.string_value())))
            .collect(),
        _ => nodes.iter().map(|n| Atom::Str(n.string_value())).collect(),
    }
}

fn compare(op: BinOp, left: &QueryValue<'_>, right: &QueryValue<'_>) -> bool {
    let lefts = match left {
        QueryValue::Nodes(nodes) => node_atoms(nodes, right),
        other => vec![atom(other)],
    };
    let rights = match right {
        QueryValue::Nodes(nodes) => node_atoms(nodes, left),
        other => vec![atom(other)],
    };

    lefts
        .iter()
        .any(|l| rights.iter().any(|r| compare_atoms(op, l, r)))
}

fn compare_atoms(op: BinOp, l: &Atom, r: &Atom) -> bool {
    match op {
        BinOp::Eq | BinOp::NotEq => {
            let equal = match (l, r) {
                (Atom::Bool(_), _) | (_, Atom::Bool(_)) => l.as_bool() == r.as_bool(),
                (Atom::Num(_), _) | (_, Atom::Num(_)) => l.as_number() == r.as_number(),
                (Atom::Str(a), Atom::Str(b)) => a == b,
            };
            if op == BinOp::Eq {
                equal
            } else {
                !equal
            }
        }
        BinOp::Lt => l.as_number() < r.as_number(),
        BinOp::Lte => l.as_number() <= r.as_number(),
        BinOp::Gt => l.as_number() > r.as_number(),
        BinOp::Gte => l.as_number() >= r.as_number(),
        _ => false,
    }
}

fn to_string(value: &QueryValue<'_>) -> String {
    value.to_string_value()
}

fn to_number(value: &QueryValue<'_>) -> f64 {
    match value {
        QueryValue::Number(n) => *n,
        QueryValue::Boolean(b) => f64::from(u8::from(*b)),
        _ => parse_number(&to_string(value)),
    }
}

fn to_boolean(value: &QueryValue<'_>) -> bool {
    match value {
        QueryValue::Nodes(nodes) => !nodes.is_empty(),
        QueryValue::String(s) => !s.is_empty(),
        QueryValue::Number(n) => *n != 0.0 && !n.is_nan(),
        QueryValue::Boolean(b) => *b,
    }
}

/// XPath number syntax: optional minus, digits, optional fraction. Anything else is NaN.
fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && digits != ".";
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() && n > 0.0 {
        "Infinity".to_string()
    } else if n.is_infinite() {
        "-Infinity".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
