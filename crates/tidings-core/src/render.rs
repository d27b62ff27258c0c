//! Template rendering for notification subjects and bodies.
//!
//! Templates use a small fixed grammar evaluated against a [`Context`]:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `{{ user.full_name }}` | Output a value; `null` prints as nothing |
//! | `{% if path %}` … `{% elif not path %}` … `{% else %}` … `{% endif %}` | Conditional on truthiness |
//! | `{% for item in path %}` … `{% endfor %}` | Iterate an array |
//!
//! Paths are dotted identifiers; numeric segments index into arrays. A few
//! read-only accessors are also allowed as segments: `count`, `size` and
//! `length` on arrays, objects and strings, `first` and `last` on arrays and
//! strings. There is no arithmetic, no function calls with arguments and no
//! way to reach anything outside the context.

use std::borrow::Cow;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
  context::{Context, template_scope},
  model::Template,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// The reason a template failed to render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderFailure {
  #[error("syntax error at byte {offset}: {message}")]
  Syntax { offset: usize, message: String },

  #[error("undefined variable `{0}`")]
  Undefined(String),

  #[error("`{0}` is not iterable")]
  NotIterable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to render template: {cause}")]
pub struct TemplateRenderError {
  #[source]
  pub cause: RenderFailure,
}

impl From<RenderFailure> for TemplateRenderError {
  fn from(cause: RenderFailure) -> Self { Self { cause } }
}

fn syntax(offset: usize, message: impl Into<String>) -> RenderFailure {
  RenderFailure::Syntax { offset, message: message.into() }
}

// ─── Public entry points ─────────────────────────────────────────────────────

/// Render `template` against `context`. A blank template renders as `""`.
pub fn render(
  template: &str,
  context: &Context,
) -> Result<String, TemplateRenderError> {
  if template.trim().is_empty() {
    return Ok(String::new());
  }
  render_scope(template, &template_scope(context))
}

/// Like [`render`], but a failure is logged and yields `""`.
pub fn safe_render(template: &str, context: &Context) -> String {
  render(template, context).unwrap_or_else(|e| {
    tracing::warn!(error = %e, "template render failed, using empty string");
    String::new()
  })
}

pub fn render_subject(
  template: &Template,
  context: &Context,
) -> Result<String, TemplateRenderError> {
  render(&template.subject_template, context)
}

pub fn render_body(
  template: &Template,
  context: &Context,
) -> Result<String, TemplateRenderError> {
  render(&template.body_template, context)
}

fn render_scope(
  template: &str,
  scope: &Map<String, Value>,
) -> Result<String, TemplateRenderError> {
  let nodes = parse(template)?;
  let mut out = String::with_capacity(template.len());
  let mut frames = Frames { base: scope, locals: Vec::new() };
  eval_nodes(&nodes, &mut frames, &mut out)?;
  Ok(out)
}

// ─── Lexing ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Token<'a> {
  Text(&'a str),
  Output { src: &'a str, offset: usize },
  Tag { src: &'a str, offset: usize },
}

fn lex(template: &str) -> Result<Vec<Token<'_>>, RenderFailure> {
  let mut tokens = Vec::new();
  let mut pos = 0;

  while pos < template.len() {
    let rest = &template[pos..];
    let next = [rest.find("{{"), rest.find("{%")]
      .into_iter()
      .flatten()
      .min();

    let Some(start) = next else {
      tokens.push(Token::Text(rest));
      break;
    };
    if start > 0 {
      tokens.push(Token::Text(&rest[..start]));
    }

    let open = pos + start;
    let is_output = template[open..].starts_with("{{");
    let close = if is_output { "}}" } else { "%}" };
    let inner_start = open + 2;
    let Some(len) = template[inner_start..].find(close) else {
      return Err(syntax(open, format!("unterminated `{}`", &template[open..open + 2])));
    };
    let src = template[inner_start..inner_start + len].trim();
    tokens.push(if is_output {
      Token::Output { src, offset: open }
    } else {
      Token::Tag { src, offset: open }
    });
    pos = inner_start + len + 2;
  }

  Ok(tokens)
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Path {
  source:   String,
  segments: Vec<String>,
}

#[derive(Debug, Clone)]
struct Condition {
  negated: bool,
  path:    Path,
}

#[derive(Debug)]
enum Node {
  Text(String),
  Output(Path),
  If {
    branches:  Vec<(Condition, Vec<Node>)>,
    otherwise: Vec<Node>,
  },
  For {
    binding:  String,
    iterable: Path,
    body:     Vec<Node>,
  },
}

fn is_ident(s: &str) -> bool {
  let mut chars = s.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_path(src: &str, offset: usize) -> Result<Path, RenderFailure> {
  let segments: Vec<String> = src.split('.').map(str::to_owned).collect();
  let head_ok = segments.first().is_some_and(|s| is_ident(s));
  let tail_ok = segments
    .iter()
    .skip(1)
    .all(|s| is_ident(s) || (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())));
  if !head_ok || !tail_ok {
    return Err(syntax(offset, format!("invalid expression `{src}`")));
  }
  Ok(Path { source: src.to_owned(), segments })
}

fn parse_condition(src: &str, offset: usize) -> Result<Condition, RenderFailure> {
  match src.strip_prefix("not ") {
    Some(rest) => Ok(Condition {
      negated: true,
      path:    parse_path(rest.trim(), offset)?,
    }),
    None => Ok(Condition { negated: false, path: parse_path(src, offset)? }),
  }
}

/// A block terminator encountered while parsing a nested block.
struct Terminator<'a> {
  keyword: &'a str,
  rest:    &'a str,
  offset:  usize,
}

struct Parser<'a> {
  tokens: std::vec::IntoIter<Token<'a>>,
}

impl<'a> Parser<'a> {
  /// Parse nodes until one of `stops` (or end of input when `stops` is empty).
  fn block(
    &mut self,
    stops: &[&str],
  ) -> Result<(Vec<Node>, Option<Terminator<'a>>), RenderFailure> {
    let mut nodes = Vec::new();

    while let Some(token) = self.tokens.next() {
      match token {
        Token::Text(t) => nodes.push(Node::Text(t.to_owned())),
        Token::Output { src, offset } => {
          nodes.push(Node::Output(parse_path(src, offset)?));
        }
        Token::Tag { src, offset } => {
          let (keyword, rest) = match src.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (src, ""),
          };
          if stops.iter().any(|stop| *stop == keyword) {
            return Ok((nodes, Some(Terminator { keyword, rest, offset })));
          }
          match keyword {
            "if" => nodes.push(self.if_block(rest, offset)?),
            "for" => nodes.push(self.for_block(rest, offset)?),
            other => {
              return Err(syntax(offset, format!("unexpected tag `{other}`")));
            }
          }
        }
      }
    }

    if let Some(first) = stops.first() {
      return Err(syntax(0, format!("missing `{{% {first} %}}`")));
    }
    Ok((nodes, None))
  }

  fn if_block(&mut self, cond: &str, offset: usize) -> Result<Node, RenderFailure> {
    let mut branches = Vec::new();
    let mut condition = parse_condition(cond, offset)?;

    loop {
      let (body, term) = self.block(&["endif", "elif", "else"])?;
      branches.push((condition, body));
      match term {
        Some(Terminator { keyword: "elif", rest, offset }) => {
          condition = parse_condition(rest, offset)?;
        }
        Some(Terminator { keyword: "else", .. }) => {
          let (otherwise, _) = self.block(&["endif"])?;
          return Ok(Node::If { branches, otherwise });
        }
        _ => return Ok(Node::If { branches, otherwise: Vec::new() }),
      }
    }
  }

  fn for_block(&mut self, spec: &str, offset: usize) -> Result<Node, RenderFailure> {
    let parts: Vec<&str> = spec.split_whitespace().collect();
    let [binding, "in", iterable] = parts.as_slice() else {
      return Err(syntax(offset, format!("expected `for <name> in <path>`, got `{spec}`")));
    };
    if !is_ident(binding) {
      return Err(syntax(offset, format!("invalid loop variable `{binding}`")));
    }
    let iterable = parse_path(iterable, offset)?;
    let (body, _) = self.block(&["endfor"])?;
    Ok(Node::For { binding: (*binding).to_owned(), iterable, body })
  }
}

fn parse(template: &str) -> Result<Vec<Node>, RenderFailure> {
  let mut parser = Parser { tokens: lex(template)?.into_iter() };
  let (nodes, _) = parser.block(&[])?;
  Ok(nodes)
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

struct Frames<'s> {
  base:   &'s Map<String, Value>,
  locals: Vec<(String, Value)>,
}

impl Frames<'_> {
  fn lookup(&self, path: &Path) -> Result<Cow<'_, Value>, RenderFailure> {
    let undefined = || RenderFailure::Undefined(path.source.clone());
    let (head, tail) = path.segments.split_first().ok_or_else(undefined)?;

    let mut current = self
      .locals
      .iter()
      .rev()
      .find(|(name, _)| name == head)
      .map(|(_, v)| v)
      .or_else(|| self.base.get(head))
      .map(Cow::Borrowed)
      .ok_or_else(undefined)?;

    for segment in tail {
      current = match current {
        Cow::Borrowed(value) => child(value, segment)
          .map(Cow::Borrowed)
          .or_else(|| accessor(value, segment).map(Cow::Owned)),
        Cow::Owned(value) => child(&value, segment)
          .cloned()
          .or_else(|| accessor(&value, segment))
          .map(Cow::Owned),
      }
      .ok_or_else(undefined)?;
    }
    Ok(current)
  }
}

/// An object key or an array index.
fn child<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
  match value {
    Value::Object(map) => map.get(segment),
    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
    _ => None,
  }
}

/// Read-only accessors on collections and strings. Object keys of the same
/// name win.
fn accessor(value: &Value, name: &str) -> Option<Value> {
  let char_value = |c: Option<char>| c.map_or(Value::Null, |c| c.to_string().into());
  match (value, name) {
    (Value::Array(items), "count" | "size" | "length") => Some(items.len().into()),
    (Value::Object(map), "count" | "size" | "length") => Some(map.len().into()),
    (Value::String(s), "count" | "size" | "length") => {
      Some(s.chars().count().into())
    }
    (Value::Array(items), "first") => {
      Some(items.first().cloned().unwrap_or(Value::Null))
    }
    (Value::Array(items), "last") => Some(items.last().cloned().unwrap_or(Value::Null)),
    (Value::String(s), "first") => Some(char_value(s.chars().next())),
    (Value::String(s), "last") => Some(char_value(s.chars().next_back())),
    _ => None,
  }
}

fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(a) => !a.is_empty(),
    Value::Object(o) => !o.is_empty(),
  }
}

fn write_value(value: &Value, out: &mut String) {
  match value {
    Value::Null => {}
    Value::String(s) => out.push_str(s),
    Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    Value::Number(n) => out.push_str(&n.to_string()),
    other => out.push_str(&other.to_string()),
  }
}

fn eval_nodes(
  nodes: &[Node],
  frames: &mut Frames<'_>,
  out: &mut String,
) -> Result<(), RenderFailure> {
  for node in nodes {
    match node {
      Node::Text(t) => out.push_str(t),
      Node::Output(path) => write_value(&*frames.lookup(path)?, out),
      Node::If { branches, otherwise } => {
        let mut chosen = otherwise;
        for (cond, body) in branches {
          if truthy(&*frames.lookup(&cond.path)?) != cond.negated {
            chosen = body;
            break;
          }
        }
        eval_nodes(chosen, frames, out)?;
      }
      Node::For { binding, iterable, body } => {
        let items = match &*frames.lookup(iterable)? {
          Value::Array(items) => items.clone(),
          Value::Null => Vec::new(),
          _ => return Err(RenderFailure::NotIterable(iterable.source.clone())),
        };
        for item in items {
          frames.locals.push((binding.clone(), item));
          let result = eval_nodes(body, frames, out);
          frames.locals.pop();
          result?;
        }
      }
    }
  }
  Ok(())
}
