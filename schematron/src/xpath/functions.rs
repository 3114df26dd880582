//! Core function library (§4) and XSLT `current()`

use super::{
    eval::{evaluate, is_xpath_whitespace, node_set, sort_document_order, string_to_number},
    parser::{Expr, Step},
    Context, Value, XNode, XPathError,
};

/// Arity bounds of the supported functions.
fn arity(name: &str) -> Option<(usize, usize)> {
    Some(match name {
        "last" | "position" | "true" | "false" | "current" => (0, 0),
        "count" | "boolean" | "not" | "sum" | "floor" | "ceiling" | "round" => (1, 1),
        "local-name" | "namespace-uri" | "name" | "string" | "string-length"
        | "normalize-space" | "number" => (0, 1),
        "starts-with" | "contains" | "substring-before" | "substring-after" => (2, 2),
        "substring" => (2, 3),
        "translate" => (3, 3),
        "concat" => (2, usize::MAX),
        _ => return None,
    })
}

/// Reject unknown functions and wrong argument counts before evaluation.
pub(super) fn check(expr: &Expr) -> Result<(), XPathError> {
    match expr {
        Expr::Or(lhs, rhs)
        | Expr::And(lhs, rhs)
        | Expr::Compare(_, lhs, rhs)
        | Expr::Arithmetic(_, lhs, rhs)
        | Expr::Union(lhs, rhs) => {
            check(lhs)?;
            check(rhs)
        }
        Expr::Negate(operand) => check(operand),
        Expr::Literal(_) | Expr::Number(_) | Expr::Variable(_) => Ok(()),
        Expr::Function(name, arguments) => {
            let Some((min, max)) = arity(name) else {
                return Err(match name.as_str() {
                    "id" | "lang" => XPathError::Unsupported(format!("{name}()")),
                    _ => XPathError::UnknownFunction(name.clone()),
                });
            };
            if arguments.len() < min || arguments.len() > max {
                let expected = match (min, max) {
                    (min, usize::MAX) => format!("at least {min}"),
                    (min, max) if min == max => min.to_string(),
                    (min, max) => format!("{min} to {max}"),
                };
                return Err(XPathError::Arity {
                    function: name.clone(),
                    expected,
                    found: arguments.len(),
                });
            }
            arguments.iter().try_for_each(check)
        }
        Expr::Path(path) => check_steps(&path.steps),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            check(primary)?;
            predicates.iter().try_for_each(check)?;
            check_steps(steps)
        }
    }
}

fn check_steps(steps: &[Step]) -> Result<(), XPathError> {
    steps
        .iter()
        .flat_map(|step| step.predicates.iter())
        .try_for_each(check)
}

pub(super) fn call<'a, 'i>(
    name: &str,
    arguments: &[Expr],
    ctx: &Context<'_, 'a, 'i>,
) -> Result<Value<'a, 'i>, XPathError> {
    let string_arg = |index: usize| -> Result<String, XPathError> {
        Ok(evaluate(&arguments[index], ctx)?.string())
    };
    let number_arg = |index: usize| -> Result<f64, XPathError> {
        Ok(evaluate(&arguments[index], ctx)?.number())
    };
    // String of the optional argument, or of the context node
    let string_or_context = || -> Result<String, XPathError> {
        match arguments.first() {
            Some(argument) => Ok(evaluate(argument, ctx)?.string()),
            None => Ok(ctx.node.string_value()),
        }
    };
    // First node of the optional node-set argument, or the context node
    let node_or_context = || -> Result<Option<XNode<'a, 'i>>, XPathError> {
        match arguments.first() {
            Some(argument) => {
                let mut nodes = node_set(argument, ctx)?;
                sort_document_order(&mut nodes);
                Ok(nodes.first().copied())
            }
            None => Ok(Some(ctx.node)),
        }
    };

    let value = match name {
        "last" => Value::Number(ctx.size as f64),
        "position" => Value::Number(ctx.position as f64),
        "current" => Value::NodeSet(vec![ctx.current]),
        "count" => Value::Number(node_set(&arguments[0], ctx)?.len() as f64),
        "local-name" => Value::String(
            node_or_context()?
                .and_then(|node| node.expanded_name())
                .map(|(_, local)| local.to_string())
                .unwrap_or_default(),
        ),
        "namespace-uri" => Value::String(
            node_or_context()?
                .and_then(|node| node.expanded_name())
                .and_then(|(namespace, _)| namespace)
                .unwrap_or_default()
                .to_string(),
        ),
        "name" => Value::String(
            node_or_context()?
                .map(|node| node.name())
                .unwrap_or_default(),
        ),
        "string" => Value::String(string_or_context()?),
        "concat" => {
            let mut result = String::new();
            for index in 0..arguments.len() {
                result.push_str(&string_arg(index)?);
            }
            Value::String(result)
        }
        "starts-with" => Value::Boolean(string_arg(0)?.starts_with(&string_arg(1)?)),
        "contains" => Value::Boolean(string_arg(0)?.contains(&string_arg(1)?)),
        "substring-before" => {
            let haystack = string_arg(0)?;
            let needle = string_arg(1)?;
            Value::String(
                haystack
                    .find(&needle)
                    .map(|at| haystack[..at].to_string())
                    .unwrap_or_default(),
            )
        }
        "substring-after" => {
            let haystack = string_arg(0)?;
            let needle = string_arg(1)?;
            Value::String(
                haystack
                    .find(&needle)
                    .map(|at| haystack[at + needle.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        "substring" => {
            let string = string_arg(0)?;
            let start = round(number_arg(1)?);
            let end = if arguments.len() == 3 {
                start + round(number_arg(2)?)
            } else {
                f64::INFINITY
            };
            Value::String(
                string
                    .chars()
                    .enumerate()
                    .filter(|(index, _)| {
                        let position = (index + 1) as f64;
                        position >= start && position < end
                    })
                    .map(|(_, c)| c)
                    .collect(),
            )
        }
        "string-length" => Value::Number(string_or_context()?.chars().count() as f64),
        "normalize-space" => Value::String(
            string_or_context()?
                .split(is_xpath_whitespace)
                .filter(|word| !word.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "translate" => {
            let from = string_arg(1)?.chars().collect::<Vec<_>>();
            let to = string_arg(2)?.chars().collect::<Vec<_>>();
            Value::String(
                string_arg(0)?
                    .chars()
                    .filter_map(|c| match from.iter().position(|&f| f == c) {
                        Some(index) => to.get(index).copied(),
                        None => Some(c),
                    })
                    .collect(),
            )
        }
        "boolean" => Value::Boolean(evaluate(&arguments[0], ctx)?.boolean()),
        "not" => Value::Boolean(!evaluate(&arguments[0], ctx)?.boolean()),
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "number" => Value::Number(match arguments.first() {
            Some(argument) => evaluate(argument, ctx)?.number(),
            None => string_to_number(&ctx.node.string_value()),
        }),
        "sum" => Value::Number(
            node_set(&arguments[0], ctx)?
                .iter()
                .map(|node| string_to_number(&node.string_value()))
                .sum(),
        ),
        "floor" => Value::Number(number_arg(0)?.floor()),
        "ceiling" => Value::Number(number_arg(0)?.ceil()),
        "round" => Value::Number(round(number_arg(0)?)),
        _ => return Err(XPathError::UnknownFunction(name.to_string())),
    };
    Ok(value)
}

/// XPath rounding: halves go towards positive infinity.
fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

#[cfg(test)]
mod tests {
    use crate::xpath::{Context, Namespaces, Value, Variables, XNode, XPath, XPathError};
    use roxmltree::Document;

    fn eval(expr: &str) -> String {
        let doc = Document::parse(
            r#"<r xmlns="urn:default" xmlns:p="urn:p"><p:item code=" A  b "/>text</r>"#,
        )
        .unwrap();
        let mut variables = Variables::default();
        variables.bind("greeting", Value::String("hello".to_string()));
        let context = Context::new(XNode::Node(doc.root_element()), &variables);
        let mut namespaces = Namespaces::default();
        namespaces.insert("p", "urn:p");
        XPath::compile(expr, &namespaces)
            .unwrap()
            .evaluate(&context)
            .unwrap()
            .string()
    }

    #[test]
    fn string_functions() {
        assert_eq!(eval("concat($greeting, ', ', 'world')"), "hello, world");
        assert_eq!(eval("substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(eval("substring('12345', 0, 3)"), "12");
        assert_eq!(eval("substring('12345', 2)"), "2345");
        assert_eq!(eval("substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(eval("substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(eval("translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert_eq!(eval("normalize-space(p:item/@code)"), "A b");
        assert_eq!(eval("string-length(p:item/@code)"), "6");
        assert_eq!(eval("starts-with($greeting, 'he')"), "true");
        assert_eq!(eval("contains($greeting, 'xyz')"), "false");
    }

    #[test]
    fn name_functions() {
        assert_eq!(eval("name(p:item)"), "p:item");
        assert_eq!(eval("local-name(p:item)"), "item");
        assert_eq!(eval("namespace-uri(p:item)"), "urn:p");
        assert_eq!(eval("name()"), "r");
        assert_eq!(eval("namespace-uri()"), "urn:default");
        assert_eq!(eval("name(missing)"), "");
    }

    #[test]
    fn numeric_functions() {
        assert_eq!(eval("round(2.5)"), "3");
        assert_eq!(eval("round(-2.5)"), "-2");
        assert_eq!(eval("floor(-1.5)"), "-2");
        assert_eq!(eval("ceiling(1.1)"), "2");
        assert_eq!(eval("number('x')"), "NaN");
        assert_eq!(eval("boolean(0)"), "false");
        assert_eq!(eval("not(p:item)"), "false");
        assert_eq!(eval("count(*) = count(current()/*)"), "true");
    }

    #[test]
    fn compile_checks_functions() {
        let namespaces = Namespaces::default();
        assert_eq!(
            XPath::compile("matches(., 'x')", &namespaces).unwrap_err(),
            XPathError::UnknownFunction("matches".to_string())
        );
        assert!(matches!(
            XPath::compile("count()", &namespaces).unwrap_err(),
            XPathError::Arity { found: 0, .. }
        ));
        assert!(matches!(
            XPath::compile("a[id('x')]", &namespaces).unwrap_err(),
            XPathError::Unsupported(_)
        ));
    }
}
