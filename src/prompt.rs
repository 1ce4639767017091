//! Prompt rendering for the fixed flow templates.
//!
//! Template syntax:
//!
//! - `{{path}}` interpolates a field; dotted paths reach into nested records
//!   (`{{diagnosis.disease}}`).
//! - `{{#if path}} ... {{/if}}` renders its body only when the field is truthy.
//! - `{{#each path}} ... {{/each}}` renders its body once per item, in order, with the item
//!   as the lookup scope.
//! - `{{media url=path}}` emits the data URI held by the field as a separate media part.
//!
//! A block tag that sits alone on its line takes the whole line with it, so an empty
//! `#each` leaves no trace in the output.

use serde_json::Value;

use crate::{
    data_uri::DataUri,
    error::{FlowError, Result},
};

/// One ordered piece of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    Media(DataUri),
}

/// Output of [`Template::render`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPrompt {
    parts: Vec<PromptPart>,
}

impl RenderedPrompt {
    pub fn parts(&self) -> &[PromptPart] {
        &self.parts
    }

    /// Concatenation of the text parts. Media parts contribute nothing.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) => Some(text.as_str()),
                PromptPart::Media(_) => None,
            })
            .collect()
    }

    pub fn media(&self) -> impl Iterator<Item = &DataUri> {
        self.parts.iter().filter_map(|part| match part {
            PromptPart::Media(uri) => Some(uri),
            PromptPart::Text(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.parts.last_mut() {
            Some(PromptPart::Text(existing)) => existing.push_str(text),
            _ => self.parts.push(PromptPart::Text(text.to_string())),
        }
    }

    fn push_media(&mut self, uri: DataUri) {
        self.parts.push(PromptPart::Media(uri));
    }
}

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    Each,
}

impl BlockKind {
    fn keyword(&self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Each => "each",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Field(String),
    Media(String),
    Block {
        kind: BlockKind,
        path: String,
        body: Vec<Node>,
    },
}

enum Tag {
    Field(String),
    Media(String),
    Open(BlockKind, String),
    Close(BlockKind),
}

impl Tag {
    fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix('#') {
            let (keyword, path) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let kind = match keyword {
                "if" => BlockKind::If,
                "each" => BlockKind::Each,
                other => return Err(format!("unknown block helper '#{other}'")),
            };
            let path = path.trim();
            if !is_path(path) {
                return Err(format!("'#{keyword}' needs a field path, got '{path}'"));
            }
            return Ok(Self::Open(kind, path.to_string()));
        }
        if let Some(keyword) = raw.strip_prefix('/') {
            return match keyword.trim() {
                "if" => Ok(Self::Close(BlockKind::If)),
                "each" => Ok(Self::Close(BlockKind::Each)),
                other => Err(format!("unknown closing tag '/{other}'")),
            };
        }
        if let Some(rest) = raw.strip_prefix("media ") {
            let path = rest
                .trim()
                .strip_prefix("url=")
                .ok_or_else(|| format!("media tag needs 'url=<field>', got '{rest}'"))?;
            if !is_path(path) {
                return Err(format!("media url must be a field path, got '{path}'"));
            }
            return Ok(Self::Media(path.to_string()));
        }
        if is_path(raw) {
            return Ok(Self::Field(raw.to_string()));
        }
        Err(format!("cannot parse tag '{{{{{raw}}}}}'"))
    }

    fn is_block(&self) -> bool {
        matches!(self, Self::Open(..) | Self::Close(_))
    }
}

fn is_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// If the tag spanning `open..close_end` is alone on its line, return where the kept text
/// before it ends and where scanning should resume.
fn standalone_span(source: &str, open: usize, close_end: usize) -> Option<(usize, usize)> {
    let line_start = source[..open].rfind('\n').map(|i| i + 1).unwrap_or(0);
    if !source[line_start..open].chars().all(|c| c == ' ' || c == '\t') {
        return None;
    }
    let rest = &source[close_end..];
    match rest.find('\n') {
        Some(nl) if rest[..nl].trim().is_empty() => Some((line_start, close_end + nl + 1)),
        None if rest.trim().is_empty() => Some((line_start, source.len())),
        _ => None,
    }
}

struct Frame {
    block: Option<(BlockKind, String)>,
    nodes: Vec<Node>,
}

/// A parsed flow template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse `source`. `name` only appears in error messages.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let fail = |message: String| FlowError::Template(format!("{name}: {message}"));

        let mut stack = vec![Frame {
            block: None,
            nodes: Vec::new(),
        }];
        let mut pos = 0usize;

        while let Some(offset) = source[pos..].find("{{") {
            let open = pos + offset;
            let close = source[open + 2..]
                .find("}}")
                .map(|o| open + 2 + o)
                .ok_or_else(|| fail(format!("unclosed tag at byte {open}")))?;
            let tag = Tag::parse(&source[open + 2..close]).map_err(&fail)?;

            let mut literal_end = open;
            let mut next = close + 2;
            if tag.is_block() {
                if let Some((kept_until, resume)) = standalone_span(source, open, next) {
                    literal_end = kept_until;
                    next = resume;
                }
            }

            let literal = &source[pos..literal_end];
            let frame = stack
                .last_mut()
                .ok_or_else(|| fail("block stack underflow".to_string()))?;
            if !literal.is_empty() {
                frame.nodes.push(Node::Text(literal.to_string()));
            }

            match tag {
                Tag::Field(path) => frame.nodes.push(Node::Field(path)),
                Tag::Media(path) => frame.nodes.push(Node::Media(path)),
                Tag::Open(kind, path) => stack.push(Frame {
                    block: Some((kind, path)),
                    nodes: Vec::new(),
                }),
                Tag::Close(kind) => {
                    if stack.len() == 1 {
                        return Err(fail(format!(
                            "'/{}' without an open block",
                            kind.keyword()
                        )));
                    }
                    let finished = stack
                        .pop()
                        .ok_or_else(|| fail("block stack underflow".to_string()))?;
                    let (open_kind, path) = finished
                        .block
                        .ok_or_else(|| fail("block stack underflow".to_string()))?;
                    if open_kind != kind {
                        return Err(fail(format!(
                            "'#{} {path}' closed by '/{}'",
                            open_kind.keyword(),
                            kind.keyword()
                        )));
                    }
                    let parent = stack
                        .last_mut()
                        .ok_or_else(|| fail("block stack underflow".to_string()))?;
                    parent.nodes.push(Node::Block {
                        kind,
                        path,
                        body: finished.nodes,
                    });
                }
            }
            pos = next;
        }

        if stack.len() != 1 {
            let unclosed: Vec<String> = stack
                .iter()
                .filter_map(|f| f.block.as_ref())
                .map(|(kind, path)| format!("#{} {path}", kind.keyword()))
                .collect();
            return Err(fail(format!("unclosed block(s): {}", unclosed.join(", "))));
        }

        let mut root = stack
            .pop()
            .ok_or_else(|| fail("block stack underflow".to_string()))?;
        if pos < source.len() {
            root.nodes.push(Node::Text(source[pos..].to_string()));
        }

        Ok(Self {
            name,
            nodes: root.nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level fields the template reads from its input, in first-use order.
    pub fn referenced_fields(&self) -> Vec<String> {
        fn walk(nodes: &[Node], out: &mut Vec<String>) {
            for node in nodes {
                let path = match node {
                    Node::Text(_) => continue,
                    Node::Field(path) | Node::Media(path) => path,
                    Node::Block { kind, path, body } => {
                        push_root(path, out);
                        // Inside #each the scope is the item, not the input.
                        if *kind == BlockKind::If {
                            walk(body, out);
                        }
                        continue;
                    }
                };
                push_root(path, out);
            }
        }
        fn push_root(path: &str, out: &mut Vec<String>) {
            let root = path.split('.').next().unwrap_or(path).to_string();
            if !out.contains(&root) {
                out.push(root);
            }
        }

        let mut out = Vec::new();
        walk(&self.nodes, &mut out);
        out
    }

    /// Render against the JSON form of a validated input record.
    ///
    /// Pure: the same input always yields the same parts.
    pub fn render(&self, input: &Value) -> Result<RenderedPrompt> {
        let mut out = RenderedPrompt::default();
        let mut scopes = vec![input];
        self.render_nodes(&self.nodes, &mut scopes, &mut out)?;
        Ok(out)
    }

    fn render_nodes<'v>(
        &self,
        nodes: &[Node],
        scopes: &mut Vec<&'v Value>,
        out: &mut RenderedPrompt,
    ) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_text(text),
                Node::Field(path) => {
                    let value = self.lookup(scopes, path)?;
                    out.push_text(&display_value(value));
                }
                Node::Media(path) => {
                    let value = self.lookup(scopes, path)?;
                    let uri = value.as_str().ok_or_else(|| {
                        FlowError::invalid_input(format!("media field '{path}' is not a string"))
                    })?;
                    out.push_media(DataUri::parse(uri)?);
                }
                Node::Block {
                    kind: BlockKind::If,
                    path,
                    body,
                } => {
                    if is_truthy(self.lookup(scopes, path)?) {
                        self.render_nodes(body, scopes, out)?;
                    }
                }
                Node::Block {
                    kind: BlockKind::Each,
                    path,
                    body,
                } => match self.lookup(scopes, path)? {
                    Value::Array(items) => {
                        for item in items {
                            scopes.push(item);
                            let rendered = self.render_nodes(body, scopes, out);
                            scopes.pop();
                            rendered?;
                        }
                    }
                    Value::Null => {}
                    _ => {
                        return Err(FlowError::Template(format!(
                            "{}: '#each {path}' needs a list",
                            self.name
                        )))
                    }
                },
            }
        }
        Ok(())
    }

    /// Resolve a dotted path, innermost scope first.
    fn lookup<'v>(&self, scopes: &[&'v Value], path: &str) -> Result<&'v Value> {
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or(path);

        let mut current: &'v Value = scopes
            .iter()
            .rev()
            .find_map(|scope| (*scope).get(head))
            .ok_or_else(|| {
                FlowError::Template(format!("{}: unknown field '{head}'", self.name))
            })?;

        for segment in segments {
            current = match current {
                Value::Null => return Ok(&NULL),
                Value::Object(map) => map.get(segment).ok_or_else(|| {
                    FlowError::Template(format!("{}: unknown field '{path}'", self.name))
                })?,
                _ => {
                    return Err(FlowError::Template(format!(
                        "{}: '{path}' descends into a non-record value",
                        self.name
                    )))
                }
            };
        }
        Ok(current)
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interpolates_fields_and_nested_paths() {
        let template = Template::parse("t", "Plant: {{plant.name}} ({{count}})").unwrap();
        let rendered = template
            .render(&json!({"plant": {"name": "Basil"}, "count": 3}))
            .unwrap();
        assert_eq!(rendered.text(), "Plant: Basil (3)");
    }

    #[test]
    fn standalone_block_lines_are_removed() {
        let source = "Items:\n{{#each items}}\n- {{this_name}}\n{{/each}}\nDone.";
        let template = Template::parse("t", source).unwrap();

        let empty = template.render(&json!({"items": []})).unwrap();
        assert_eq!(empty.text(), "Items:\nDone.");

        let two = template
            .render(&json!({"items": [{"this_name": "a"}, {"this_name": "b"}]}))
            .unwrap();
        assert_eq!(two.text(), "Items:\n- a\n- b\nDone.");
    }

    #[test]
    fn inline_if_keeps_surrounding_text() {
        let template = Template::parse("t", "a{{#if flag}}b{{/if}}c").unwrap();
        assert_eq!(template.render(&json!({"flag": true})).unwrap().text(), "abc");
        assert_eq!(template.render(&json!({"flag": false})).unwrap().text(), "ac");
        assert_eq!(template.render(&json!({"flag": null})).unwrap().text(), "ac");
    }

    #[test]
    fn each_scope_falls_back_to_outer_fields() {
        let template = Template::parse("t", "{{#each items}}{{name}}@{{place}};{{/each}}").unwrap();
        let rendered = template
            .render(&json!({"place": "greenhouse", "items": [{"name": "fern"}]}))
            .unwrap();
        assert_eq!(rendered.text(), "fern@greenhouse;");
    }

    #[test]
    fn unknown_field_is_a_template_error() {
        let template = Template::parse("t", "Hello {{missing}}").unwrap();
        let err = template.render(&json!({"present": 1})).unwrap_err();
        assert!(matches!(err, FlowError::Template(_)), "{err}");
    }

    #[test]
    fn malformed_templates_are_rejected() {
        for source in [
            "{{#if a}}never closed",
            "{{/each}}",
            "{{#if a}}x{{/each}}",
            "{{#unless a}}x{{/unless}}",
            "{{media src=a}}",
            "{{ not a path }}",
            "{{open",
        ] {
            let err = Template::parse("t", source).unwrap_err();
            assert!(matches!(err, FlowError::Template(_)), "{source}: {err}");
        }
    }

    #[test]
    fn media_tag_emits_a_separate_part() {
        let template = Template::parse("t", "Photo: {{media url=photo}}").unwrap();
        let rendered = template
            .render(&json!({"photo": "data:image/png;base64,iVBORw0KGgo="}))
            .unwrap();
        assert_eq!(rendered.parts().len(), 2);
        assert_eq!(rendered.text(), "Photo: ");
        assert_eq!(rendered.media().next().unwrap().mime_type(), "image/png");
    }

    #[test]
    fn referenced_fields_skip_each_item_scope() {
        let template =
            Template::parse("t", "{{a}}{{#if b.c}}{{d}}{{/if}}{{#each e}}{{f}}{{/each}}").unwrap();
        assert_eq!(template.referenced_fields(), vec!["a", "b", "d", "e"]);
    }
}
