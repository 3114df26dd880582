use super::{
    functions,
    parser::{ArithmeticOp, Axis, CompareOp, Expr, LocationPath, NodeTest, Step},
    Context, Value, XNode, XPathError,
};

pub(super) fn evaluate<'a, 'i>(
    expr: &Expr,
    ctx: &Context<'_, 'a, 'i>,
) -> Result<Value<'a, 'i>, XPathError> {
    match expr {
        Expr::Or(lhs, rhs) => Ok(Value::Boolean(
            evaluate(lhs, ctx)?.boolean() || evaluate(rhs, ctx)?.boolean(),
        )),
        Expr::And(lhs, rhs) => Ok(Value::Boolean(
            evaluate(lhs, ctx)?.boolean() && evaluate(rhs, ctx)?.boolean(),
        )),
        Expr::Compare(op, lhs, rhs) => {
            let lhs = evaluate(lhs, ctx)?;
            let rhs = evaluate(rhs, ctx)?;
            Ok(Value::Boolean(compare(*op, &lhs, &rhs)))
        }
        Expr::Arithmetic(op, lhs, rhs) => {
            let a = evaluate(lhs, ctx)?.number();
            let b = evaluate(rhs, ctx)?.number();
            Ok(Value::Number(match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Subtract => a - b,
                ArithmeticOp::Multiply => a * b,
                ArithmeticOp::Divide => a / b,
                // Truncating remainder, sign follows the dividend as in XPath
                ArithmeticOp::Modulo => a % b,
            }))
        }
        Expr::Negate(operand) => Ok(Value::Number(-evaluate(operand, ctx)?.number())),
        Expr::Union(lhs, rhs) => {
            let mut nodes = node_set(lhs, ctx)?;
            nodes.extend(node_set(rhs, ctx)?);
            sort_document_order(&mut nodes);
            Ok(Value::NodeSet(nodes))
        }
        Expr::Literal(value) => Ok(Value::String(value.clone())),
        Expr::Number(value) => Ok(Value::Number(*value)),
        Expr::Variable(name) => ctx
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| XPathError::UnknownVariable(name.clone())),
        Expr::Function(name, arguments) => functions::call(name, arguments, ctx),
        Expr::Path(path) => Ok(Value::NodeSet(location_path(path, ctx)?)),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            let mut nodes = node_set(primary, ctx)?;
            sort_document_order(&mut nodes);
            let nodes = filter(nodes, predicates, ctx)?;
            Ok(Value::NodeSet(apply_steps(nodes, steps, ctx)?))
        }
    }
}

pub(super) fn node_set<'a, 'i>(
    expr: &Expr,
    ctx: &Context<'_, 'a, 'i>,
) -> Result<Vec<XNode<'a, 'i>>, XPathError> {
    match evaluate(expr, ctx)? {
        Value::NodeSet(nodes) => Ok(nodes),
        _ => Err(XPathError::NotANodeSet(format!("{expr:?}"))),
    }
}

/// Nodes matched by `expr` used as an XSLT pattern; `ctx` is at the root.
pub(super) fn pattern_matches<'a, 'i>(
    expr: &Expr,
    ctx: &Context<'_, 'a, 'i>,
) -> Result<Vec<XNode<'a, 'i>>, XPathError> {
    let mut nodes = match expr {
        Expr::Union(lhs, rhs) => {
            let mut nodes = pattern_matches(lhs, ctx)?;
            nodes.extend(pattern_matches(rhs, ctx)?);
            nodes
        }
        Expr::Path(LocationPath {
            absolute: false,
            steps,
        }) => {
            let root = ctx.node.root();
            let mut anywhere = Vec::with_capacity(steps.len() + 1);
            anywhere.push(Step {
                axis: Axis::DescendantOrSelf,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
            anywhere.extend(steps.iter().cloned());
            apply_steps(vec![root], &anywhere, ctx)?
        }
        expr => node_set(expr, ctx)?,
    };
    sort_document_order(&mut nodes);
    Ok(nodes)
}

fn location_path<'a, 'i>(
    path: &LocationPath,
    ctx: &Context<'_, 'a, 'i>,
) -> Result<Vec<XNode<'a, 'i>>, XPathError> {
    let start = if path.absolute {
        ctx.node.root()
    } else {
        ctx.node
    };
    apply_steps(vec![start], &path.steps, ctx)
}

fn apply_steps<'a, 'i>(
    mut nodes: Vec<XNode<'a, 'i>>,
    steps: &[Step],
    ctx: &Context<'_, 'a, 'i>,
) -> Result<Vec<XNode<'a, 'i>>, XPathError> {
    for step in steps {
        let mut next = Vec::new();
        for node in &nodes {
            let candidates = axis_nodes(*node, step.axis)
                .into_iter()
                .filter(|candidate| node_test(&step.test, *candidate, step.axis))
                .collect::<Vec<_>>();
            next.extend(filter(candidates, &step.predicates, ctx)?);
        }
        sort_document_order(&mut next);
        nodes = next;
    }
    Ok(nodes)
}

/// Apply predicates to nodes given in axis order.
fn filter<'a, 'i>(
    mut nodes: Vec<XNode<'a, 'i>>,
    predicates: &[Expr],
    ctx: &Context<'_, 'a, 'i>,
) -> Result<Vec<XNode<'a, 'i>>, XPathError> {
    for predicate in predicates {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (index, node) in nodes.into_iter().enumerate() {
            let position = index + 1;
            let inner = ctx.focus(node, position, size);
            let keep = match evaluate(predicate, &inner)? {
                Value::Number(n) => n == position as f64,
                value => value.boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        nodes = kept;
    }
    Ok(nodes)
}

fn all_nodes<'a, 'i>(node: XNode<'a, 'i>) -> impl Iterator<Item = roxmltree::Node<'a, 'i>> {
    node.node().document().root().descendants()
}

/// The nodes on `axis` from `node`, in axis order.
fn axis_nodes<'a, 'i>(node: XNode<'a, 'i>, axis: Axis) -> Vec<XNode<'a, 'i>> {
    match (axis, node) {
        (Axis::Child, XNode::Node(n)) => n.children().map(XNode::Node).collect(),
        (Axis::Descendant, XNode::Node(n)) => n.descendants().skip(1).map(XNode::Node).collect(),
        (Axis::DescendantOrSelf, XNode::Node(n)) => n.descendants().map(XNode::Node).collect(),
        (Axis::Child | Axis::Descendant, XNode::Attribute(..)) => Vec::new(),
        (Axis::DescendantOrSelf | Axis::SelfAxis, _) => vec![node],
        (Axis::Parent, _) => node.parent().into_iter().collect(),
        (Axis::Ancestor | Axis::AncestorOrSelf, _) => {
            let mut nodes = Vec::new();
            if axis == Axis::AncestorOrSelf {
                nodes.push(node);
            }
            let mut current = node.parent();
            while let Some(parent) = current {
                nodes.push(parent);
                current = parent.parent();
            }
            nodes
        }
        (Axis::FollowingSibling, XNode::Node(n)) => {
            n.next_siblings().skip(1).map(XNode::Node).collect()
        }
        (Axis::PrecedingSibling, XNode::Node(n)) => {
            n.prev_siblings().skip(1).map(XNode::Node).collect()
        }
        (Axis::FollowingSibling | Axis::PrecedingSibling, XNode::Attribute(..)) => Vec::new(),
        (Axis::Following, _) => {
            // Everything after the node that is not one of its descendants
            let after = match node {
                XNode::Node(n) => n
                    .descendants()
                    .last()
                    .map(|last| last.id().get_usize())
                    .unwrap_or_else(|| n.id().get_usize()),
                XNode::Attribute(owner, _) => owner.id().get_usize(),
            };
            all_nodes(node)
                .filter(|n| n.id().get_usize() > after)
                .map(XNode::Node)
                .collect()
        }
        (Axis::Preceding, _) => {
            let element = node.node();
            let before = element.id().get_usize();
            let mut nodes = all_nodes(node)
                .filter(|n| n.id().get_usize() < before)
                .filter(|n| !element.ancestors().any(|a| a == *n))
                .map(XNode::Node)
                .collect::<Vec<_>>();
            nodes.reverse();
            nodes
        }
        (Axis::Attribute, XNode::Node(n)) if n.is_element() => (0..n.attributes().count())
            .map(|index| XNode::Attribute(n, index))
            .collect(),
        (Axis::Attribute, _) => Vec::new(),
    }
}

fn node_test(test: &NodeTest, node: XNode, axis: Axis) -> bool {
    // The principal node type is attribute on the attribute axis, element elsewhere
    let principal = match node {
        XNode::Attribute(..) => axis == Axis::Attribute,
        XNode::Node(n) => axis != Axis::Attribute && n.is_element(),
    };
    match test {
        NodeTest::Node => true,
        NodeTest::Text => matches!(node, XNode::Node(n) if n.is_text()),
        NodeTest::Comment => matches!(node, XNode::Node(n) if n.is_comment()),
        NodeTest::ProcessingInstruction(target) => match node {
            XNode::Node(n) if n.is_pi() => match target {
                Some(target) => n.pi().is_some_and(|pi| pi.target == target.as_str()),
                None => true,
            },
            _ => false,
        },
        NodeTest::Any => principal,
        NodeTest::AnyInNamespace(namespace) => {
            principal
                && node
                    .expanded_name()
                    .is_some_and(|(ns, _)| ns == Some(namespace.as_str()))
        }
        NodeTest::Name { namespace, local } => {
            principal
                && node.expanded_name().is_some_and(|(ns, name)| {
                    name == local.as_str() && ns == namespace.as_deref()
                })
        }
    }
}

pub(super) fn sort_document_order(nodes: &mut Vec<XNode>) {
    nodes.sort_by_key(XNode::key);
    nodes.dedup_by_key(|node| node.key());
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::NodeSet(a), Value::NodeSet(b)) => {
            let b = b.iter().map(XNode::string_value).collect::<Vec<_>>();
            a.iter().any(|x| {
                let x = Value::String(x.string_value());
                b.iter()
                    .any(|y| compare_atomic(op, &x, &Value::String(y.clone())))
            })
        }
        (Value::NodeSet(a), Value::Boolean(_)) => {
            compare_atomic(op, &Value::Boolean(!a.is_empty()), rhs)
        }
        (Value::Boolean(_), Value::NodeSet(b)) => {
            compare_atomic(op, lhs, &Value::Boolean(!b.is_empty()))
        }
        (Value::NodeSet(a), other) => a
            .iter()
            .any(|x| compare_atomic(op, &atomize(x, other), other)),
        (other, Value::NodeSet(b)) => b
            .iter()
            .any(|y| compare_atomic(op, other, &atomize(y, other))),
        _ => compare_atomic(op, lhs, rhs),
    }
}

/// Convert a node to the type of the value it is compared against.
fn atomize<'a, 'i>(node: &XNode<'a, 'i>, other: &Value) -> Value<'a, 'i> {
    let string = node.string_value();
    match other {
        Value::Number(_) => Value::Number(string_to_number(&string)),
        _ => Value::String(string),
    }
}

fn compare_atomic(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq | CompareOp::NotEq => {
            let equal = match (lhs, rhs) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => lhs.boolean() == rhs.boolean(),
                (Value::Number(_), _) | (_, Value::Number(_)) => lhs.number() == rhs.number(),
                _ => lhs.string() == rhs.string(),
            };
            equal == (op == CompareOp::Eq)
        }
        CompareOp::Lt => lhs.number() < rhs.number(),
        CompareOp::Le => lhs.number() <= rhs.number(),
        CompareOp::Gt => lhs.number() > rhs.number(),
        CompareOp::Ge => lhs.number() >= rhs.number(),
    }
}

pub(super) fn is_xpath_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// The `number()` conversion of a string (§4.4).
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim_matches(is_xpath_whitespace);
    let digits = s.strip_prefix('-').unwrap_or(s);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && digits.chars().any(|c| c.is_ascii_digit());
    if valid {
        s.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// The `string()` conversion of a number (§4.2).
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}
