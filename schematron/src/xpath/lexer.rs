//! XPath 1.0 tokenizer (§3.7 Lexical Structure)

use super::XPathError;

#[derive(Clone, Debug, PartialEq)]
pub(super) enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Slash,
    DoubleSlash,
    Pipe,
    Plus,
    Minus,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    /// `*` as a name test
    Star,
    /// `*` as the multiply operator
    Multiply,
    And,
    Or,
    Mod,
    Div,
    Variable(String),
    Literal(String),
    Number(f64),
    /// `prefix:local` or `local`
    Name {
        prefix: Option<String>,
        local: String,
    },
    /// `prefix:*`
    PrefixWildcard(String),
}

impl Token {
    /// Whether a following `*` or NCName must be read as an operator.
    ///
    /// "If there is a preceding token and the preceding token is not one of @, ::, (, [, , or an
    /// Operator, then a * must be recognized as a MultiplyOperator and an NCName must be recognized
    /// as an OperatorName."
    fn forces_operator(&self) -> bool {
        !matches!(
            self,
            Token::At
                | Token::ColonColon
                | Token::LParen
                | Token::LBracket
                | Token::Comma
                | Token::And
                | Token::Or
                | Token::Mod
                | Token::Div
                | Token::Multiply
                | Token::Slash
                | Token::DoubleSlash
                | Token::Pipe
                | Token::Plus
                | Token::Minus
                | Token::Eq
                | Token::NotEq
                | Token::Lt
                | Token::Le
                | Token::Gt
                | Token::Ge
        )
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

pub(super) fn tokenize(source: &str) -> Result<Vec<Token>, XPathError> {
    let chars = source.chars().collect::<Vec<_>>();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    let syntax = |message: &str, at: usize| XPathError::Syntax {
        expression: source.to_string(),
        message: format!("{message} at offset {at}"),
    };

    let read_ncname = |start: usize| -> (String, usize) {
        let mut end = start;
        while end < chars.len() && is_name_char(chars[end]) {
            end += 1;
        }
        (chars[start..end].iter().collect(), end)
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let operator_position = tokens.last().is_some_and(Token::forces_operator);

        let token = match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
                continue;
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '@' => Token::At,
            ',' => Token::Comma,
            '|' => Token::Pipe,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '=' => Token::Eq,
            '!' if next == Some('=') => {
                i += 1;
                Token::NotEq
            }
            '<' if next == Some('=') => {
                i += 1;
                Token::Le
            }
            '<' => Token::Lt,
            '>' if next == Some('=') => {
                i += 1;
                Token::Ge
            }
            '>' => Token::Gt,
            '/' if next == Some('/') => {
                i += 1;
                Token::DoubleSlash
            }
            '/' => Token::Slash,
            ':' if next == Some(':') => {
                i += 1;
                Token::ColonColon
            }
            '*' if operator_position => Token::Multiply,
            '*' => Token::Star,
            '.' if next == Some('.') => {
                i += 1;
                Token::DotDot
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let number: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(number.parse().unwrap_or(f64::NAN)));
                continue;
            }
            '.' => Token::Dot,
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let Some(len) = chars[start..].iter().position(|&c| c == quote) else {
                    return Err(syntax("unterminated string literal", i));
                };
                tokens.push(Token::Literal(chars[start..start + len].iter().collect()));
                i = start + len + 1;
                continue;
            }
            '$' => {
                if !next.is_some_and(is_name_start) {
                    return Err(syntax("expected variable name", i));
                }
                let (first, end) = read_ncname(i + 1);
                // Variable names are QNames
                let (name, end) = if chars.get(end) == Some(&':')
                    && chars.get(end + 1).is_some_and(|&c| is_name_start(c))
                {
                    let (local, end) = read_ncname(end + 1);
                    (format!("{first}:{local}"), end)
                } else {
                    (first, end)
                };
                tokens.push(Token::Variable(name));
                i = end;
                continue;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i < chars.len() && chars[i] == '.' {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let number: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(number.parse().unwrap_or(f64::NAN)));
                continue;
            }
            c if is_name_start(c) => {
                let (first, end) = read_ncname(i);
                if operator_position {
                    let token = match first.as_str() {
                        "and" => Token::And,
                        "or" => Token::Or,
                        "mod" => Token::Mod,
                        "div" => Token::Div,
                        _ => return Err(syntax(&format!("unexpected name {first:?}"), i)),
                    };
                    tokens.push(token);
                    i = end;
                    continue;
                }
                // A single colon continues a QName; `::` ends it
                if chars.get(end) == Some(&':') && chars.get(end + 1) != Some(&':') {
                    match chars.get(end + 1).copied() {
                        Some('*') => {
                            tokens.push(Token::PrefixWildcard(first));
                            i = end + 2;
                        }
                        Some(c) if is_name_start(c) => {
                            let (local, end) = read_ncname(end + 1);
                            tokens.push(Token::Name {
                                prefix: Some(first),
                                local,
                            });
                            i = end;
                        }
                        _ => return Err(syntax("malformed qualified name", end)),
                    }
                } else {
                    tokens.push(Token::Name {
                        prefix: None,
                        local: first,
                    });
                    i = end;
                }
                continue;
            }
            c => return Err(syntax(&format!("unexpected character {c:?}"), i)),
        };
        tokens.push(token);
        i += 1;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(local: &str) -> Token {
        Token::Name {
            prefix: None,
            local: local.to_string(),
        }
    }

    #[test]
    fn star_and_names_depend_on_position() {
        let tokens = tokenize("* * div").unwrap();
        assert_eq!(tokens, vec![Token::Star, Token::Multiply, name("div")]);

        let tokens = tokenize("a div b").unwrap();
        assert_eq!(tokens, vec![name("a"), Token::Div, name("b")]);
    }

    #[test]
    fn hyphenated_names_are_single_tokens() {
        let tokens = tokenize("normalize-space(a-b) - 1").unwrap();
        assert_eq!(
            tokens,
            vec![
                name("normalize-space"),
                Token::LParen,
                name("a-b"),
                Token::RParen,
                Token::Minus,
                Token::Number(1.0),
            ]
        );
    }

    #[test]
    fn axes_and_qualified_names() {
        let tokens = tokenize("child::h:p/@x:*").unwrap();
        assert_eq!(
            tokens,
            vec![
                name("child"),
                Token::ColonColon,
                Token::Name {
                    prefix: Some("h".to_string()),
                    local: "p".to_string()
                },
                Token::Slash,
                Token::At,
                Token::PrefixWildcard("x".to_string()),
            ]
        );
    }

    #[test]
    fn numbers_literals_and_variables() {
        let tokens = tokenize("$v != '.5' and .5 < 3.25").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Variable("v".to_string()),
                Token::NotEq,
                Token::Literal(".5".to_string()),
                Token::And,
                Token::Number(0.5),
                Token::Lt,
                Token::Number(3.25),
            ]
        );
    }

    #[test]
    fn unterminated_literal_is_an_error() {
        assert!(matches!(
            tokenize("'abc"),
            Err(XPathError::Syntax { .. })
        ));
    }
}
