//! Store connection parsing
//!
//! Hosts paste the connection object straight from their store console, so
//! the text may be strict JSON or a JavaScript object literal wrapped in a
//! statement (`const cfg = { apiKey: '...', };`). The first balanced object
//! is extracted and rewritten into JSON by a scanner. Nothing is evaluated:
//! an expression such as `process.env.URL` is a syntax error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionParseError {
    #[error("no object literal found")]
    NoObject,

    #[error("unbalanced braces or unterminated string")]
    Unbalanced,

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// Connection details of the shared room store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConnection {
    #[serde(rename = "databaseURL")]
    pub database_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl StoreConnection {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            api_key: None,
            auth_domain: None,
            project_id: None,
            app_id: None,
        }
    }
}

/// Parse pasted connection text into a [`StoreConnection`]
pub fn parse_connection(text: &str) -> Result<StoreConnection, ConnectionParseError> {
    let object = extract_object(text)?;
    let json = normalize_object(object)?;
    let value: Value =
        serde_json::from_str(&json).map_err(|e| ConnectionParseError::Syntax(e.to_string()))?;

    match value.get("databaseURL").and_then(Value::as_str) {
        Some(url) if !url.trim().is_empty() => {}
        _ => return Err(ConnectionParseError::MissingField("databaseURL")),
    }

    serde_json::from_value(value).map_err(|e| ConnectionParseError::Syntax(e.to_string()))
}

/// Slice of `text` from the first `{` to its matching `}`
fn extract_object(text: &str) -> Result<&str, ConnectionParseError> {
    let start = text.find('{').ok_or(ConnectionParseError::NoObject)?;
    let body = &text[start..];

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = body.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err(ConnectionParseError::Unbalanced);
                }
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&body[..=i]);
                }
            }
            _ => {}
        }
    }

    Err(ConnectionParseError::Unbalanced)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Index of the next character that is neither whitespace nor a comment
fn skip_trivia(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
        } else {
            break;
        }
    }
    i
}

/// Rewrite a JS object literal into JSON text
fn normalize_object(object: &str) -> Result<String, ConnectionParseError> {
    let chars: Vec<char> = object.chars().collect();
    let mut out = String::with_capacity(object.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() || (c == '/' && matches!(chars.get(i + 1), Some('/' | '*'))) {
            let next = skip_trivia(&chars, i);
            out.push(' ');
            i = next;
            continue;
        }

        match c {
            '"' => {
                let end = string_end(&chars, i, '"')?;
                out.extend(&chars[i..=end]);
                i = end + 1;
            }
            '\'' | '`' => {
                let end = string_end(&chars, i, c)?;
                out.push('"');
                let mut j = i + 1;
                while j < end {
                    match chars[j] {
                        '\\' if chars.get(j + 1) == Some(&c) => {
                            out.push(c);
                            j += 2;
                            continue;
                        }
                        '\\' => {
                            out.push('\\');
                            if let Some(next) = chars.get(j + 1) {
                                out.push(*next);
                            }
                            j += 2;
                            continue;
                        }
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                    j += 1;
                }
                out.push('"');
                i = end + 1;
            }
            ',' => {
                let next = skip_trivia(&chars, i + 1);
                if !matches!(chars.get(next), Some('}' | ']')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '-' | '+'))
                {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let after = skip_trivia(&chars, i);
                if chars.get(after) == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else if matches!(ident.as_str(), "true" | "false" | "null") {
                    out.push_str(&ident);
                } else {
                    return Err(ConnectionParseError::Syntax(format!(
                        "unexpected identifier '{}'",
                        ident
                    )));
                }
            }
            '{' | '}' | '[' | ']' | ':' => {
                out.push(c);
                i += 1;
            }
            other => {
                return Err(ConnectionParseError::Syntax(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    Ok(out)
}

/// Index of the quote closing the string that opens at `start`
fn string_end(chars: &[char], start: usize, quote: char) -> Result<usize, ConnectionParseError> {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            c if c == quote => return Ok(j),
            _ => j += 1,
        }
    }
    Err(ConnectionParseError::Unbalanced)
}
