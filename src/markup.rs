//! Markup Backend - The Default Template Language
//!
//! Plain text with `{{ ... }}` tags:
//!
//! - `{{ model.key }}`, `{{ bag.key }}`, `{{ item.key }}`: HTML-encoded value
//! - `{{ raw model.key }}`: value without encoding
//! - `{{ render_body }}`: wrapped content (layouts only)
//! - `{{ partial "shared/nav" }}`: nested render
//! - `{{ set title = "Home" }}` / `{{ set title = model.name }}`: view bag write
//! - `{{ if expr }} ... {{ else }} ... {{ /if }}`
//! - `{{ each expr |item| }} ... {{ /each }}`
//! - `{{! comment }}`, and `\{{` for a literal `{{`

use serde_json::Value;
use std::sync::Arc;

use crate::compiler::{
    BodyRenderer, Diagnostic, ExecutableUnit, ExecutionContext, PageInstance, TemplateBackend,
};
use crate::error::ExecError;
use crate::model::{is_truthy, lookup, ViewModel};
use crate::output::CommitWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pos {
    line: usize,
    column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Root {
    Model,
    Bag,
    Local(String),
}

#[derive(Debug, Clone)]
struct Expr {
    root: Root,
    path: Vec<String>,
    text: String,
}

#[derive(Debug, Clone)]
enum SetValue {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Echo { expr: Expr, encode: bool, pos: Pos },
    RenderBody { pos: Pos },
    Partial { name: String, pos: Pos },
    Set { key: String, value: SetValue },
    If { cond: Expr, then: Vec<Node>, otherwise: Vec<Node> },
    Each { source: Expr, binding: String, body: Vec<Node>, pos: Pos },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupBackend;

impl MarkupBackend {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateBackend for MarkupBackend {
    fn compile(
        &self,
        source: &str,
        logical_path: &str,
    ) -> Result<Arc<dyn ExecutableUnit>, Vec<Diagnostic>> {
        let unit = MarkupUnit::parse(source, logical_path)?;
        Ok(Arc::new(unit))
    }
}

/// A compiled markup template.
#[derive(Debug, Clone)]
pub struct MarkupUnit {
    template: String,
    nodes: Vec<Node>,
}

impl MarkupUnit {
    pub fn parse(source: &str, template: &str) -> Result<Self, Vec<Diagnostic>> {
        let mut diagnostics = vec![];
        let tokens = tokenize(source, &mut diagnostics);
        let nodes = Parser::default().parse(tokens, &mut diagnostics);
        if diagnostics.is_empty() {
            Ok(Self {
                template: template.to_string(),
                nodes,
            })
        } else {
            Err(diagnostics)
        }
    }

    /// True when the template contains `{{ render_body }}` anywhere.
    pub fn renders_body(&self) -> bool {
        fn any(nodes: &[Node]) -> bool {
            nodes.iter().any(|n| match n {
                Node::RenderBody { .. } => true,
                Node::If { then, otherwise, .. } => any(then) || any(otherwise),
                Node::Each { body, .. } => any(body),
                _ => false,
            })
        }
        any(&self.nodes)
    }
}

impl ExecutableUnit for MarkupUnit {
    fn activate<'a>(&'a self, model: &'a ViewModel) -> Box<dyn PageInstance + 'a> {
        Box::new(MarkupInstance {
            unit: self,
            model,
            locals: vec![],
        })
    }
}

// --- Tokenizer ---

#[derive(Debug)]
enum Token {
    Text(String),
    Tag { body: String, pos: Pos },
}

struct LineIndex<'s> {
    source: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(source: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn pos(&self, offset: usize) -> Pos {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = self.source[self.starts[line]..offset].chars().count() + 1;
        Pos { line: line + 1, column }
    }
}

fn tokenize(source: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<Token> {
    let index = LineIndex::new(source);
    let mut tokens = vec![];
    let mut text = String::new();
    let mut pos = 0;

    while let Some(found) = source[pos..].find("{{") {
        let open = pos + found;

        if open > pos && source.as_bytes()[open - 1] == b'\\' {
            text.push_str(&source[pos..open - 1]);
            text.push_str("{{");
            pos = open + 2;
            continue;
        }

        text.push_str(&source[pos..open]);
        let Some(close) = source[open + 2..].find("}}") else {
            let at = index.pos(open);
            diagnostics.push(Diagnostic::new(at.line, at.column, "Unclosed tag: expected '}}'"));
            pos = source.len();
            break;
        };

        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut text)));
        }
        tokens.push(Token::Tag {
            body: source[open + 2..open + 2 + close].trim().to_string(),
            pos: index.pos(open),
        });
        pos = open + 2 + close + 2;
    }

    text.push_str(&source[pos..]);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    tokens
}

// --- Parser ---

enum Block {
    Root,
    If {
        cond: Expr,
        then: Option<Vec<Node>>,
        pos: Pos,
    },
    Each {
        source: Expr,
        binding: String,
        pos: Pos,
    },
}

struct Frame {
    block: Block,
    nodes: Vec<Node>,
}

struct Parser {
    stack: Vec<Frame>,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            stack: vec![Frame {
                block: Block::Root,
                nodes: vec![],
            }],
        }
    }
}

impl Parser {
    fn parse(mut self, tokens: Vec<Token>, diagnostics: &mut Vec<Diagnostic>) -> Vec<Node> {
        for token in tokens {
            match token {
                Token::Text(text) => self.push(Node::Text(text)),
                Token::Tag { body, pos } => {
                    if let Err(message) = self.tag(&body, pos) {
                        diagnostics.push(Diagnostic::new(pos.line, pos.column, message));
                    }
                }
            }
        }

        while self.stack.len() > 1 {
            if let Some(frame) = self.stack.pop() {
                let (what, pos) = match frame.block {
                    Block::If { pos, .. } => ("if", pos),
                    Block::Each { pos, .. } => ("each", pos),
                    Block::Root => continue,
                };
                diagnostics.push(Diagnostic::new(
                    pos.line,
                    pos.column,
                    format!("Unclosed '{}' block: expected {{{{ /{} }}}}", what, what),
                ));
            }
        }

        self.stack.pop().map(|f| f.nodes).unwrap_or_default()
    }

    fn push(&mut self, node: Node) {
        if let Some(frame) = self.stack.last_mut() {
            frame.nodes.push(node);
        }
    }

    fn locals(&self) -> Vec<&str> {
        self.stack
            .iter()
            .filter_map(|f| match &f.block {
                Block::Each { binding, .. } => Some(binding.as_str()),
                _ => None,
            })
            .collect()
    }

    fn tag(&mut self, body: &str, pos: Pos) -> Result<(), String> {
        if body.starts_with('!') {
            return Ok(());
        }
        if body.is_empty() {
            return Err("Empty tag".to_string());
        }

        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };

        match head {
            "render_body" => {
                if !rest.is_empty() {
                    return Err("render_body takes no arguments".to_string());
                }
                self.push(Node::RenderBody { pos });
            }
            "raw" => {
                let expr = self.expr(rest)?;
                self.push(Node::Echo { expr, encode: false, pos });
            }
            "partial" => {
                let name = parse_string_literal(rest)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| format!("Invalid partial syntax: expected a quoted view name in '{}'", body))?;
                self.push(Node::Partial { name, pos });
            }
            "set" => {
                let (key, value) = rest
                    .split_once('=')
                    .ok_or_else(|| format!("Invalid set syntax: expected 'set key = value' in '{}'", body))?;
                let key = key.trim();
                if !is_identifier(key) {
                    return Err(format!("Invalid set target '{}'", key));
                }
                let value = value.trim();
                let value = match parse_string_literal(value) {
                    Some(literal) => SetValue::Literal(literal),
                    None => SetValue::Expr(self.expr(value)?),
                };
                self.push(Node::Set { key: key.to_string(), value });
            }
            "if" => {
                let cond = self.expr(rest)?;
                self.stack.push(Frame {
                    block: Block::If { cond, then: None, pos },
                    nodes: vec![],
                });
            }
            "else" => {
                if !rest.is_empty() {
                    return Err("else takes no arguments".to_string());
                }
                let frame = self.stack.last_mut().ok_or("Unexpected {{ else }}")?;
                match &mut frame.block {
                    Block::If { then, .. } if then.is_none() => {
                        *then = Some(std::mem::take(&mut frame.nodes));
                    }
                    Block::If { .. } => return Err("Duplicate {{ else }} in if block".to_string()),
                    _ => return Err("Unexpected {{ else }} outside of an if block".to_string()),
                }
            }
            "/if" => {
                if !matches!(self.stack.last().map(|f| &f.block), Some(Block::If { .. })) {
                    return Err("Unexpected {{ /if }} without matching {{ if }}".to_string());
                }
                if let Some(Frame { block: Block::If { cond, then, .. }, nodes }) = self.stack.pop() {
                    let node = match then {
                        Some(then) => Node::If { cond, then, otherwise: nodes },
                        None => Node::If { cond, then: nodes, otherwise: vec![] },
                    };
                    self.push(node);
                }
            }
            "each" => {
                let (source, binding) = self.each(rest, body)?;
                self.stack.push(Frame {
                    block: Block::Each { source, binding, pos },
                    nodes: vec![],
                });
            }
            "/each" => {
                if !matches!(self.stack.last().map(|f| &f.block), Some(Block::Each { .. })) {
                    return Err("Unexpected {{ /each }} without matching {{ each }}".to_string());
                }
                if let Some(Frame { block: Block::Each { source, binding, pos }, nodes }) = self.stack.pop() {
                    self.push(Node::Each { source, binding, body: nodes, pos });
                }
            }
            _ if rest.is_empty() => {
                let expr = self.expr(head)?;
                self.push(Node::Echo { expr, encode: true, pos });
            }
            _ => return Err(format!("Unknown directive '{}'", head)),
        }
        Ok(())
    }

    fn each(&self, rest: &str, body: &str) -> Result<(Expr, String), String> {
        let invalid = || format!("Invalid each syntax: expected 'each expr |var|' in '{}'", body);
        let (source, binding) = rest.split_once('|').ok_or_else(invalid)?;
        let (binding, trailing) = binding.split_once('|').ok_or_else(invalid)?;
        if !trailing.trim().is_empty() {
            return Err(invalid());
        }
        let binding = binding.trim();
        if !is_identifier(binding) || binding == "model" || binding == "bag" {
            return Err(format!("Invalid loop variable '{}'", binding));
        }
        Ok((self.expr(source.trim())?, binding.to_string()))
    }

    fn expr(&self, text: &str) -> Result<Expr, String> {
        if text.is_empty() {
            return Err("Missing expression".to_string());
        }
        let segments: Vec<&str> = text.split('.').collect();
        if segments.iter().any(|s| !is_identifier(s)) {
            return Err(format!("Malformed expression '{}'", text));
        }

        let root = match segments[0] {
            "model" => Root::Model,
            "bag" => Root::Bag,
            name if self.locals().contains(&name) => Root::Local(name.to_string()),
            name => return Err(format!("Unknown identifier '{}'", name)),
        };

        Ok(Expr {
            root,
            path: segments[1..].iter().map(|s| s.to_string()).collect(),
            text: text.to_string(),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_string_literal(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    if inner.contains('"') {
        return None;
    }
    Some(inner.to_string())
}

/// Escape text for HTML element and attribute content.
pub fn encode_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// --- Execution ---

struct MarkupInstance<'a> {
    unit: &'a MarkupUnit,
    model: &'a ViewModel,
    locals: Vec<(String, Value)>,
}

impl PageInstance for MarkupInstance<'_> {
    fn execute(
        &mut self,
        cx: &mut ExecutionContext<'_>,
        out: &mut CommitWriter<'_>,
        mut body: Option<&mut dyn BodyRenderer>,
    ) -> Result<(), ExecError> {
        let unit = self.unit;
        self.run(&unit.nodes, cx, out, &mut body)
    }
}

impl MarkupInstance<'_> {
    fn run(
        &mut self,
        nodes: &[Node],
        cx: &mut ExecutionContext<'_>,
        out: &mut CommitWriter<'_>,
        body: &mut Option<&mut dyn BodyRenderer>,
    ) -> Result<(), ExecError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.write_str(text)?,
                Node::Echo { expr, encode, pos } => {
                    let value = self.require(expr, cx, *pos)?;
                    let text = self.stringify(&value, expr, *pos)?;
                    if *encode {
                        out.write_str(&encode_html(&text))?;
                    } else {
                        out.write_str(&text)?;
                    }
                }
                Node::RenderBody { pos } => match body {
                    Some(inner) => inner.render_body(cx, out)?,
                    None => {
                        return Err(self.runtime(*pos, "render_body is only valid in a layout"));
                    }
                },
                Node::Partial { name, pos } => {
                    if cx.depth() >= cx.max_depth() {
                        return Err(self.runtime(
                            *pos,
                            format!("Partial nesting exceeds {} levels at '{}'", cx.max_depth(), name),
                        ));
                    }
                    cx.check_cancelled()?;
                    cx.render_partial(name, out)?;
                }
                Node::Set { key, value } => {
                    let value = match value {
                        SetValue::Literal(s) => Value::String(s.clone()),
                        SetValue::Expr(expr) => self.resolve(expr, cx).unwrap_or(Value::Null),
                    };
                    cx.bag_mut().set(key.clone(), value);
                }
                Node::If { cond, then, otherwise } => {
                    let truthy = self.resolve(cond, cx).map_or(false, |v| is_truthy(&v));
                    let branch = if truthy { then } else { otherwise };
                    self.run(branch, cx, out, body)?;
                }
                Node::Each { source, binding, body: inner, pos } => {
                    let value = self.require(source, cx, *pos)?;
                    let Value::Array(items) = value else {
                        return Err(self.runtime(*pos, format!("'{}' is not an array", source.text)));
                    };
                    for item in items {
                        self.locals.push((binding.clone(), item));
                        let result = self.run(inner, cx, out, body);
                        self.locals.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, expr: &Expr, cx: &ExecutionContext<'_>) -> Option<Value> {
        match &expr.root {
            Root::Model => self.model.lookup(&expr.path).cloned(),
            Root::Bag => cx.bag().lookup(&expr.path).cloned(),
            Root::Local(name) => self
                .locals
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .and_then(|(_, v)| lookup(v, &expr.path))
                .cloned(),
        }
    }

    /// Like `resolve`, but only the view bag may be missing a key.
    fn require(&self, expr: &Expr, cx: &ExecutionContext<'_>, pos: Pos) -> Result<Value, ExecError> {
        match self.resolve(expr, cx) {
            Some(value) => Ok(value),
            None if expr.root == Root::Bag => Ok(Value::Null),
            None => Err(self.runtime(pos, format!("Undefined value '{}'", expr.text))),
        }
    }

    fn stringify(&self, value: &Value, expr: &Expr, pos: Pos) -> Result<String, ExecError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Array(_) => Err(self.runtime(
                pos,
                format!("Array '{}' cannot be rendered directly; use {{{{ each }}}}", expr.text),
            )),
            Value::Object(_) => Err(self.runtime(
                pos,
                format!("Object '{}' cannot be rendered directly; use a nested key", expr.text),
            )),
        }
    }

    fn runtime(&self, pos: Pos, message: impl Into<String>) -> ExecError {
        ExecError::Runtime {
            template: self.unit.template.clone(),
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::PartialRenderer;
    use crate::model::ViewBag;
    use serde_json::json;

    struct NoPartials;

    impl PartialRenderer for NoPartials {
        fn render_partial(
            &self,
            name: &str,
            _cx: &mut ExecutionContext<'_>,
            _out: &mut CommitWriter<'_>,
        ) -> Result<(), ExecError> {
            Err(ExecError::NotFound(name.to_string()))
        }
    }

    fn render(source: &str, model: serde_json::Value) -> Result<String, ExecError> {
        let unit = MarkupUnit::parse(source, "test.html").expect("template should compile");
        let model = ViewModel::new(model);
        let mut bag = ViewBag::new();
        let mut sink = Vec::new();
        let mut out = CommitWriter::new(&mut sink, usize::MAX);
        {
            let mut cx = ExecutionContext::new(&model, &mut bag, &NoPartials, None, 4);
            unit.activate(&model).execute(&mut cx, &mut out, None)?;
        }
        out.finish()?;
        Ok(String::from_utf8(sink).unwrap())
    }

    fn diagnostics(source: &str) -> Vec<Diagnostic> {
        MarkupUnit::parse(source, "test.html").unwrap_err()
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(render("<p>hello</p>", json!({})).unwrap(), "<p>hello</p>");
    }

    #[test]
    fn test_echo_encodes_and_raw_does_not() {
        let model = json!({"name": "<b>Ada</b>"});
        assert_eq!(
            render("{{ model.name }}|{{raw model.name}}", model).unwrap(),
            "&lt;b&gt;Ada&lt;/b&gt;|<b>Ada</b>"
        );
    }

    #[test]
    fn test_escaped_open_braces() {
        assert_eq!(render(r"\{{ model.x }}", json!({})).unwrap(), "{{ model.x }}");
    }

    #[test]
    fn test_each_and_if() {
        let source = "{{ each model.items |item| }}{{ if item.on }}[{{ item.name }}]{{ else }}-{{ /if }}{{ /each }}";
        let model = json!({"items": [{"name": "a", "on": true}, {"name": "b", "on": false}]});
        assert_eq!(render(source, model).unwrap(), "[a]-");
    }

    #[test]
    fn test_set_writes_bag() {
        let source = r#"{{ set title = "Home" }}<title>{{ bag.title }}</title>{{ bag.none }}"#;
        assert_eq!(render(source, json!({})).unwrap(), "<title>Home</title>");
    }

    #[test]
    fn test_comment_is_dropped() {
        assert_eq!(render("a{{! note }}b", json!({})).unwrap(), "ab");
    }

    #[test]
    fn test_undefined_model_value_is_runtime_error() {
        let err = render("x\n  {{ model.missing }}", json!({})).unwrap_err();
        match err {
            ExecError::Runtime { line, column, message, .. } => {
                assert_eq!((line, column), (2, 3));
                assert!(message.contains("model.missing"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_render_body_in_leaf_is_runtime_error() {
        let err = render("{{ render_body }}", json!({})).unwrap_err();
        assert!(matches!(err, ExecError::Runtime { .. }));
    }

    #[test]
    fn test_unknown_identifier_diagnostic() {
        let diags = diagnostics("line one\nline two\n  {{ user.name }}");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 3);
        assert_eq!(diags[0].column, 3);
        assert!(diags[0].message.contains("Unknown identifier 'user'"));
    }

    #[test]
    fn test_multiple_diagnostics_reported() {
        let diags = diagnostics("{{ }}\n{{ /each }}\n{{ bogus thing }}");
        let lines: Vec<_> = diags.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_unclosed_block_reports_opening_position() {
        let diags = diagnostics("a\n{{ if model.x }}\nb");
        assert_eq!(diags.len(), 1);
        assert_eq!((diags[0].line, diags[0].column), (2, 1));
        assert!(diags[0].message.contains("Unclosed 'if'"));
    }

    #[test]
    fn test_loop_variable_out_of_scope_after_block() {
        let diags = diagnostics("{{ each model.xs |x| }}{{ x }}{{ /each }}{{ x }}");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("Unknown identifier 'x'"));
    }

    #[test]
    fn test_renders_body_detection() {
        let layout = MarkupUnit::parse("<main>{{ if model.a }}{{ render_body }}{{ /if }}</main>", "l").unwrap();
        let leaf = MarkupUnit::parse("<p/>", "p").unwrap();
        assert!(layout.renders_body());
        assert!(!leaf.renders_body());
    }

    #[test]
    fn test_same_source_compiles_to_same_behavior() {
        let source = "{{ each model.xs |x| }}<i>{{ x }}</i>{{ /each }}";
        let model = json!({"xs": [1, 2, 3]});
        assert_eq!(render(source, model.clone()).unwrap(), render(source, model).unwrap());
    }
}
