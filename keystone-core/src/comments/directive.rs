// Directive grammar of documentation comments
//
//   directive  := '@' NAME [ '(' [ args ] ')' ]
//   args       := value | property ( ',' property )*
//   property   := NAME '=' value
//   value      := QUOTED | BARE

use std::iter::Peekable;
use std::str::Chars;

/// Arguments of a directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveArgs {
    /// `@Name` or `@Name()`
    None,
    /// `@Name("value")` or `@Name(value)`
    Single(String),
    /// `@Name(key = value, ...)`
    Properties(Vec<(String, String)>),
}

/// One parsed directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub args: DirectiveArgs,
}

impl Directive {
    /// A named property.
    pub fn get(&self, key: &str) -> Option<&str> {
        match &self.args {
            DirectiveArgs::Properties(props) => props
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// The main value: the single argument, or the `value` property.
    pub fn value(&self) -> Option<&str> {
        match &self.args {
            DirectiveArgs::Single(value) => Some(value),
            DirectiveArgs::Properties(_) => self.get("value"),
            DirectiveArgs::None => None,
        }
    }

    /// Property keys in declaration order.
    pub fn keys(&self) -> Vec<&str> {
        match &self.args {
            DirectiveArgs::Properties(props) => props.iter().map(|(k, _)| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// The name of the directive on a line, if the line is one.
pub fn directive_name(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix('@')?;
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    Some(&rest[..end]).filter(|name| !name.is_empty())
}

/// Parse one documentation line.
///
/// Returns `Ok(None)` for lines that are not directives and an error message
/// for malformed ones.
pub fn parse_directive(line: &str) -> Result<Option<Directive>, String> {
    let Some(rest) = line.trim().strip_prefix('@') else {
        return Ok(None);
    };

    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let (name, rest) = rest.split_at(name_len);
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err("expected a directive name after '@'".to_string());
    }

    let rest = rest.trim_start();
    if rest.is_empty() {
        return Ok(Some(Directive {
            name: name.to_string(),
            args: DirectiveArgs::None,
        }));
    }

    let Some(inner) = rest.strip_prefix('(') else {
        return Err(format!("unexpected '{}' after @{}", rest, name));
    };

    let mut chars = inner.chars().peekable();
    let args = parse_args(&mut chars)?;

    let trailing: String = chars.collect();
    if !trailing.trim().is_empty() {
        return Err(format!(
            "unexpected '{}' after closing parenthesis",
            trailing.trim()
        ));
    }

    Ok(Some(Directive {
        name: name.to_string(),
        args,
    }))
}

/// A scanned token, remembering whether it was quoted.
struct Token {
    text: String,
    quoted: bool,
}

fn skip_ws(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

fn parse_args(chars: &mut Peekable<Chars<'_>>) -> Result<DirectiveArgs, String> {
    skip_ws(chars);
    if chars.next_if_eq(&')').is_some() {
        return Ok(DirectiveArgs::None);
    }

    let first = parse_token(chars)?;
    skip_ws(chars);

    match chars.next() {
        Some(')') => Ok(DirectiveArgs::Single(first.text)),
        Some('=') => {
            let mut props = vec![(property_key(first)?, parse_value(chars)?)];
            loop {
                skip_ws(chars);
                match chars.next() {
                    Some(')') => return Ok(DirectiveArgs::Properties(props)),
                    Some(',') => {
                        skip_ws(chars);
                        let key = property_key(parse_token(chars)?)?;
                        skip_ws(chars);
                        if chars.next_if_eq(&'=').is_none() {
                            return Err(format!("missing '=' after property '{}'", key));
                        }
                        props.push((key, parse_value(chars)?));
                    }
                    Some(c) => return Err(format!("unexpected '{}' in property list", c)),
                    None => return Err("unbalanced parentheses".to_string()),
                }
            }
        }
        Some(',') => Err("multiple arguments must be written as key=value".to_string()),
        Some(c) => Err(format!("unexpected '{}' after argument", c)),
        None => Err("unbalanced parentheses".to_string()),
    }
}

fn property_key(token: Token) -> Result<String, String> {
    if token.quoted || token.text.is_empty() {
        return Err("property names must be bare identifiers".to_string());
    }
    Ok(token.text)
}

fn parse_value(chars: &mut Peekable<Chars<'_>>) -> Result<String, String> {
    skip_ws(chars);
    let token = parse_token(chars)?;
    if !token.quoted && token.text.is_empty() {
        return Err("missing property value".to_string());
    }
    Ok(token.text)
}

fn parse_token(chars: &mut Peekable<Chars<'_>>) -> Result<Token, String> {
    if chars.next_if_eq(&'"').is_some() {
        let mut text = String::new();
        loop {
            match chars.next() {
                Some('"') => return Ok(Token { text, quoted: true }),
                Some('\\') => match chars.next() {
                    Some(c @ ('"' | '\\')) => text.push(c),
                    Some(c) => {
                        text.push('\\');
                        text.push(c);
                    }
                    None => return Err("unterminated string".to_string()),
                },
                Some(c) => text.push(c),
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    let mut text = String::new();
    while let Some(c) =
        chars.next_if(|c| !matches!(c, ',' | ')' | '=' | '(' | '"') && !c.is_whitespace())
    {
        text.push(c);
    }
    if let Some(&c) = chars.peek()
        && (c == '(' || c == '"')
    {
        return Err(format!("unexpected '{}' in bare value", c));
    }

    Ok(Token {
        text,
        quoted: false,
    })
}
