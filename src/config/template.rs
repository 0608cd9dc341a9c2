//! Compiler and executor for the canonical template syntax.
//!
//! Text outside `{{ ... }}` is copied through. An action holds a pipeline of
//! commands separated by `|`; each command's result becomes the last argument
//! of the next one:
//!
//! ```text
//! {{ .name }}                 variable lookup
//! {{ indent .block 4 }}       directive call
//! {{ "literal" | encrypt }}   piped call
//! ```
//!
//! Lookups of absent variables fail with [`TemplateError::MissingKey`], which
//! callers can tell apart from every other failure.

use std::fmt;

use super::directives::Directives;
use super::error::TemplateError;
use super::table::VariableTable;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A value produced while executing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Action(Vec<Command>),
}

#[derive(Debug, Clone)]
struct Command {
    operands: Vec<Operand>,
}

#[derive(Debug, Clone)]
enum Operand {
    Field(String),
    Literal(Value),
    Function(String),
}

#[derive(Debug)]
enum Token {
    Field(String),
    Literal(Value),
    Ident(String),
    Pipe,
}

/// A compiled template bound to a directive table.
#[derive(Debug, Clone)]
pub struct Template<'d> {
    name: String,
    nodes: Vec<Node>,
    directives: &'d Directives,
}

impl<'d> Template<'d> {
    /// Parses `text`, checking that every called directive exists.
    pub fn compile(
        name: impl Into<String>,
        text: &str,
        directives: &'d Directives,
    ) -> Result<Self, TemplateError> {
        let mut nodes = Vec::new();
        let mut offset = 0;

        while let Some(start) = text[offset..].find(OPEN) {
            let start = offset + start;
            if start > offset {
                nodes.push(Node::Text(text[offset..start].to_string()));
            }

            let body_start = start + OPEN.len();
            let (tokens, end) = lex_action(text, body_start)?;
            nodes.push(Node::Action(parse_pipeline(tokens, body_start, directives)?));
            offset = end;
        }

        if offset < text.len() {
            nodes.push(Node::Text(text[offset..].to_string()));
        }

        Ok(Self {
            name: name.into(),
            nodes,
            directives,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the template against `vars`.
    pub fn execute(&self, vars: &VariableTable) -> Result<String, TemplateError> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.eval_pipeline(pipeline, vars)?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }

    fn eval_pipeline(&self, pipeline: &[Command], vars: &VariableTable) -> Result<Value, TemplateError> {
        let mut piped = None;
        for command in pipeline {
            piped = Some(self.eval_command(command, vars, piped.take())?);
        }
        piped.ok_or_else(|| TemplateError::Exec("empty pipeline".to_string()))
    }

    fn eval_command(
        &self,
        command: &Command,
        vars: &VariableTable,
        piped: Option<Value>,
    ) -> Result<Value, TemplateError> {
        match command.operands.split_first() {
            Some((Operand::Function(name), args)) => {
                let mut values = args
                    .iter()
                    .map(|arg| self.eval_operand(arg, vars))
                    .collect::<Result<Vec<_>, _>>()?;
                values.extend(piped);
                self.directives.call(name, &values)
            }
            Some((operand, [])) if piped.is_none() => self.eval_operand(operand, vars),
            Some(_) => Err(TemplateError::Exec(
                "can't give argument to non-function".to_string(),
            )),
            None => Err(TemplateError::Exec("empty command".to_string())),
        }
    }

    fn eval_operand(&self, operand: &Operand, vars: &VariableTable) -> Result<Value, TemplateError> {
        match operand {
            Operand::Field(key) => vars
                .get(key)
                .map(|v| Value::Str(v.to_string()))
                .ok_or_else(|| TemplateError::MissingKey(key.clone())),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Function(name) => self.directives.call(name, &[]),
        }
    }
}

fn syntax(offset: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        offset,
        message: message.into(),
    }
}

/// Lexes one action body starting at byte `start`.
/// Returns the tokens and the offset just past the closing delimiter.
fn lex_action(text: &str, start: usize) -> Result<(Vec<Token>, usize), TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = text[start..].char_indices().peekable();

    while let Some(&(rel, ch)) = chars.peek() {
        let pos = start + rel;

        if text[pos..].starts_with(CLOSE) {
            return Ok((tokens, pos + CLOSE.len()));
        }

        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '.' => {
                chars.next();
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || c == '|' || c == '}' {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(syntax(pos, "missing variable name after '.'"));
                }
                tokens.push(Token::Field(name));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, c @ ('"' | '\\'))) => value.push(c),
                            Some((_, c)) => {
                                return Err(syntax(pos, format!("unknown escape sequence '\\{c}'")))
                            }
                            None => return Err(syntax(pos, "unterminated quoted string")),
                        },
                        Some((_, c)) => value.push(c),
                        None => return Err(syntax(pos, "unterminated quoted string")),
                    }
                }
                tokens.push(Token::Literal(Value::Str(value)));
            }
            '`' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '`')) => break,
                        Some((_, c)) => value.push(c),
                        None => return Err(syntax(pos, "unterminated raw string")),
                    }
                }
                tokens.push(Token::Literal(Value::Str(value)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut digits = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !(c.is_ascii_digit() || (c == '-' && digits.is_empty())) {
                        break;
                    }
                    digits.push(c);
                    chars.next();
                }
                let number = digits
                    .parse::<i64>()
                    .map_err(|_| syntax(pos, format!("bad number syntax: {digits:?}")))?;
                tokens.push(Token::Literal(Value::Int(number)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    ident.push(c);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(syntax(pos, format!("unexpected {other:?} in action"))),
        }
    }

    Err(syntax(start, "unclosed action"))
}

fn parse_pipeline(
    tokens: Vec<Token>,
    offset: usize,
    directives: &Directives,
) -> Result<Vec<Command>, TemplateError> {
    let mut pipeline = Vec::new();
    let mut operands = Vec::new();

    for token in tokens.into_iter().chain(std::iter::once(Token::Pipe)) {
        match token {
            Token::Pipe => {
                if operands.is_empty() {
                    return Err(syntax(offset, "missing command in pipeline"));
                }
                pipeline.push(Command {
                    operands: std::mem::take(&mut operands),
                });
            }
            Token::Ident(name) => {
                if !directives.contains(&name) {
                    return Err(TemplateError::UnknownFunction(name));
                }
                operands.push(Operand::Function(name));
            }
            Token::Field(name) => operands.push(Operand::Field(name)),
            Token::Literal(value) => operands.push(Operand::Literal(value)),
        }
    }

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptError;

    fn vars(pairs: &[(&str, &str)]) -> VariableTable {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn render(text: &str, table: &VariableTable) -> Result<String, TemplateError> {
        let directives = Directives::new();
        Template::compile("test", text, &directives)?.execute(table)
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(render("no actions here", &vars(&[])).unwrap(), "no actions here");
    }

    #[test]
    fn test_field_lookup() {
        let table = vars(&[("host", "localhost"), ("port", "8080")]);
        assert_eq!(
            render("http://{{ .host }}:{{.port}}/api", &table).unwrap(),
            "http://localhost:8080/api"
        );
    }

    #[test]
    fn test_field_names_may_contain_dots_and_dashes() {
        let table = vars(&[("db.host", "h"), ("my-key", "k")]);
        assert_eq!(render("{{ .db.host }} {{ .my-key }}", &table).unwrap(), "h k");
    }

    #[test]
    fn test_missing_key_is_distinct() {
        let err = render("{{ .absent }}", &vars(&[])).unwrap_err();
        assert_eq!(err, TemplateError::MissingKey("absent".into()));
        assert!(err.is_missing_key());
    }

    #[test]
    fn test_indent_call() {
        let table = vars(&[("block", "a: 1\nb: 2")]);
        assert_eq!(
            render("root:\n{{indent .block 2}}", &table).unwrap(),
            "root:\n  a: 1\n  b: 2"
        );
    }

    #[test]
    fn test_pipe_appends_argument() {
        let directives = Directives::new()
            .with_encryptor(|plain: &str| Ok::<_, EncryptError>(format!("<{plain}>")));
        let template = Template::compile("t", r#"{{ "pw" | encrypt }}"#, &directives).unwrap();
        assert_eq!(template.execute(&vars(&[])).unwrap(), "<pw>");
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            render(r#"{{ "a \"q\" }}" }}{{ `raw\n` }}{{ 42 }}"#, &vars(&[])).unwrap(),
            "a \"q\" }}raw\\n42"
        );
    }

    #[test]
    fn test_unknown_function_fails_at_compile_time() {
        let directives = Directives::new();
        let err = Template::compile("t", "{{ frobnicate .x }}", &directives).unwrap_err();
        assert_eq!(err, TemplateError::UnknownFunction("frobnicate".into()));
    }

    #[test]
    fn test_syntax_errors() {
        let directives = Directives::new();
        for text in ["{{ .x", "{{ }}", "{{ . }}", "{{ \"open }}", "{{ .x | }}", "{{ # }}"] {
            let err = Template::compile("t", text, &directives).unwrap_err();
            assert!(matches!(err, TemplateError::Syntax { .. }), "{text}: {err:?}");
        }
    }

    #[test]
    fn test_argument_to_non_function() {
        let err = render("{{ .a .b }}", &vars(&[("a", "1"), ("b", "2")])).unwrap_err();
        assert!(matches!(err, TemplateError::Exec(_)));
    }

    #[test]
    fn test_unicode_text_is_preserved() {
        let table = vars(&[("name", "wörld")]);
        assert_eq!(render("héllo {{ .name }} ✓", &table).unwrap(), "héllo wörld ✓");
    }
}
