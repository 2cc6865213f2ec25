//! Rich-text schema transformer
//!
//! Converts between the editor's hierarchical JSON form and the replicated
//! XML tree, and derives projections (plain text, mentions) from the JSON
//! form.
//!
//! # Mapping
//!
//! ```text
//! {"type":"doc","content":[...]}          root XmlFragment
//! {"type":"paragraph","attrs":{..}}       XmlElement tag="paragraph", attributes=attrs
//! consecutive {"type":"text",...} nodes   one XmlText, marks as formatting attributes
//! {"type":"bold"}                         attribute bold -> {}
//! {"type":"comment","attrs":{"id":"c1"}}  attribute comment -> {"id":"c1"}
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;
use yrs::types::text::{Diff, YChange};
use yrs::types::xml::XmlOut;
use yrs::types::Attrs;
use yrs::{
    Any, Out, ReadTxn, Text, TransactionMut, Xml, XmlElementPrelim, XmlElementRef, XmlFragment,
    XmlTextPrelim, XmlTextRef,
};

use crate::shared::error::DocumentError;

/// Separator inserted between block nodes in the plain-text projection
const BLOCK_SEPARATOR: &str = "\n\n";

/// Node types that flow inline with text
const INLINE_NODES: &[&str] = &["text", "hardBreak", "mention", "emoji", "inlineMath"];

/// Convert a JSON value into a yrs `Any`
pub fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) if n.is_i64() => Any::BigInt(i),
            _ => Any::Number(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Any::String(Arc::from(s.as_str())),
        Value::Array(items) => Any::Array(items.iter().map(json_to_any).collect()),
        Value::Object(map) => Any::Map(Arc::new(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_any(v)))
                .collect::<HashMap<String, Any>>(),
        )),
    }
}

/// Convert a yrs `Any` into a JSON value
pub fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) => {
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                json!(*n as i64)
            } else {
                json!(n)
            }
        }
        Any::BigInt(i) => json!(i),
        Any::String(s) => Value::String(s.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| json!(b)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), any_to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

/// Write a rich-text JSON document into an (empty) XML fragment
pub fn json_to_fragment<F: XmlFragment>(
    txn: &mut TransactionMut,
    fragment: &F,
    content: &Value,
) -> Result<(), DocumentError> {
    let root = content
        .as_object()
        .ok_or_else(|| DocumentError::schema("$", "document must be an object"))?;
    let children = children_of(root, "$")?;
    write_children(txn, fragment, children, "$")
}

fn children_of<'a>(node: &'a Map<String, Value>, path: &str) -> Result<&'a [Value], DocumentError> {
    match node.get("content") {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(DocumentError::schema(path, "content must be an array")),
    }
}

fn node_type<'a>(node: &'a Map<String, Value>, path: &str) -> Result<&'a str, DocumentError> {
    node.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DocumentError::schema(path, "node is missing a type"))
}

fn write_children<F: XmlFragment>(
    txn: &mut TransactionMut,
    parent: &F,
    children: &[Value],
    path: &str,
) -> Result<(), DocumentError> {
    let mut pending_text: Vec<&Map<String, Value>> = Vec::new();

    for (i, child) in children.iter().enumerate() {
        let child_path = format!("{}.content[{}]", path, i);
        let node = child
            .as_object()
            .ok_or_else(|| DocumentError::schema(&child_path, "node must be an object"))?;

        if node_type(node, &child_path)? == "text" {
            pending_text.push(node);
            continue;
        }

        flush_text_run(txn, parent, &mut pending_text, &child_path)?;
        write_element(txn, parent, node, &child_path)?;
    }

    flush_text_run(txn, parent, &mut pending_text, path)
}

fn write_element<F: XmlFragment>(
    txn: &mut TransactionMut,
    parent: &F,
    node: &Map<String, Value>,
    path: &str,
) -> Result<(), DocumentError> {
    let tag = node_type(node, path)?;
    let index = parent.len(&*txn);
    let element: XmlElementRef = parent.insert(txn, index, XmlElementPrelim::empty(tag));

    if let Some(attrs) = node.get("attrs").and_then(Value::as_object) {
        for (name, value) in attrs {
            if value.is_null() {
                continue;
            }
            element.insert_attribute(txn, name.as_str(), json_to_any(value));
        }
    }

    write_children(txn, &element, children_of(node, path)?, path)
}

fn flush_text_run<F: XmlFragment>(
    txn: &mut TransactionMut,
    parent: &F,
    pending: &mut Vec<&Map<String, Value>>,
    path: &str,
) -> Result<(), DocumentError> {
    if pending.is_empty() {
        return Ok(());
    }

    let index = parent.len(&*txn);
    let run: XmlTextRef = parent.insert(txn, index, XmlTextPrelim::new(""));

    for node in pending.drain(..) {
        let text = node
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| DocumentError::schema(path, "text node is missing its text"))?;
        if text.is_empty() {
            continue;
        }
        let attrs = marks_to_attrs(node.get("marks"), path)?;
        let offset = run.len(&*txn);
        if attrs.is_empty() {
            run.insert(txn, offset, text);
        } else {
            run.insert_with_attributes(txn, offset, text, attrs);
        }
    }

    Ok(())
}

fn marks_to_attrs(marks: Option<&Value>, path: &str) -> Result<Attrs, DocumentError> {
    let mut attrs = Attrs::new();
    let marks = match marks {
        None | Some(Value::Null) => return Ok(attrs),
        Some(Value::Array(marks)) => marks,
        Some(_) => return Err(DocumentError::schema(path, "marks must be an array")),
    };

    for mark in marks {
        let mark = mark
            .as_object()
            .ok_or_else(|| DocumentError::schema(path, "mark must be an object"))?;
        let name = node_type(mark, path)?;
        let value = match mark.get("attrs") {
            Some(Value::Object(map)) => json_to_any(&Value::Object(map.clone())),
            _ => Any::Map(Arc::new(HashMap::new())),
        };
        attrs.insert(Arc::from(name), value);
    }

    Ok(attrs)
}

/// Read an XML fragment back into a rich-text JSON document
pub fn fragment_to_json<T: ReadTxn, F: XmlFragment>(txn: &T, fragment: &F) -> Value {
    json!({
        "type": "doc",
        "content": children_to_json(txn, fragment),
    })
}

fn children_to_json<T: ReadTxn, F: XmlFragment>(txn: &T, parent: &F) -> Vec<Value> {
    let mut nodes = Vec::new();
    for child in parent.children(txn) {
        match child {
            XmlOut::Element(element) => nodes.push(element_to_json(txn, &element)),
            XmlOut::Text(run) => nodes.extend(text_run_to_json(txn, &run)),
            XmlOut::Fragment(_) => {}
        }
    }
    nodes
}

fn element_to_json<T: ReadTxn>(txn: &T, element: &XmlElementRef) -> Value {
    let mut node = Map::new();
    node.insert("type".into(), Value::String(element.tag().to_string()));

    let mut attrs = Map::new();
    for (name, value) in element.attributes(txn) {
        let value = match value {
            Out::Any(any) => any_to_json(&any),
            other => Value::String(other.to_string(txn)),
        };
        attrs.insert(name.to_string(), value);
    }
    if !attrs.is_empty() {
        node.insert("attrs".into(), Value::Object(attrs));
    }

    let content = children_to_json(txn, element);
    if !content.is_empty() {
        node.insert("content".into(), Value::Array(content));
    }

    Value::Object(node)
}

fn text_run_to_json<T: ReadTxn>(txn: &T, run: &XmlTextRef) -> Vec<Value> {
    let chunks: Vec<Diff<YChange>> = run.diff(txn, YChange::identity);
    let mut nodes = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let text = match &chunk.insert {
            Out::Any(Any::String(s)) if !s.is_empty() => s.to_string(),
            _ => continue,
        };
        let marks = chunk
            .attributes
            .as_deref()
            .map(attrs_to_marks)
            .unwrap_or_default();

        // Formatting boundaries left behind by removed marks split the diff
        // into chunks with identical marks; the editor treats those as one node.
        if let Some(Value::Object(previous)) = nodes.last_mut() {
            let previous_marks = previous.get("marks").and_then(Value::as_array);
            if previous_marks.map(Vec::as_slice).unwrap_or_default() == marks.as_slice() {
                if let Some(Value::String(existing)) = previous.get_mut("text") {
                    existing.push_str(&text);
                    continue;
                }
            }
        }

        let mut node = Map::new();
        node.insert("type".into(), Value::String("text".into()));
        node.insert("text".into(), Value::String(text));
        if !marks.is_empty() {
            node.insert("marks".into(), Value::Array(marks));
        }
        nodes.push(Value::Object(node));
    }

    nodes
}

fn attrs_to_marks(attrs: &Attrs) -> Vec<Value> {
    let mut names: Vec<&Arc<str>> = attrs.keys().collect();
    names.sort();

    names
        .into_iter()
        .filter_map(|name| {
            let mut mark = Map::new();
            mark.insert("type".into(), Value::String(name.to_string()));
            match attrs.get(name)? {
                Any::Null | Any::Undefined => return None,
                Any::Map(map) if !map.is_empty() => {
                    mark.insert("attrs".into(), any_to_json(&Any::Map(map.clone())));
                }
                _ => {}
            }
            Some(Value::Object(mark))
        })
        .collect()
}

/// Plain-text projection of a rich-text JSON document
///
/// Block nodes are separated by a blank line, hard breaks become newlines
/// and mentions render as `@label`.
pub fn plain_text(content: &Value) -> Result<String, DocumentError> {
    let root = content
        .as_object()
        .ok_or_else(|| DocumentError::schema("$", "document must be an object"))?;
    node_text(root, "$")
}

fn node_text(node: &Map<String, Value>, path: &str) -> Result<String, DocumentError> {
    let kind = node_type(node, path)?;
    match kind {
        "text" => {
            return node
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| DocumentError::schema(path, "text node is missing its text"));
        }
        "hardBreak" => return Ok("\n".to_string()),
        "mention" => {
            let label = node
                .get("attrs")
                .and_then(|a| a.get("label"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Ok(format!("@{}", label));
        }
        _ => {}
    }

    let children = children_of(node, path)?;
    let mut parts = Vec::with_capacity(children.len());
    let mut inline = true;
    for (i, child) in children.iter().enumerate() {
        let child_path = format!("{}.content[{}]", path, i);
        let child = child
            .as_object()
            .ok_or_else(|| DocumentError::schema(&child_path, "node must be an object"))?;
        if !INLINE_NODES.contains(&node_type(child, &child_path)?) {
            inline = false;
        }
        parts.push(node_text(child, &child_path)?);
    }

    Ok(if inline {
        parts.concat()
    } else {
        parts.join(BLOCK_SEPARATOR)
    })
}

/// What a mention node points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionKind {
    User,
    Page,
}

/// A mention node found in a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mention {
    /// Id of the mention node itself
    pub id: String,
    pub kind: MentionKind,
    /// Mentioned user or page
    pub entity_id: Uuid,
    pub label: Option<String>,
    /// User who inserted the mention, when recorded
    pub creator_id: Option<Uuid>,
}

/// Collect every well-formed mention node in a rich-text JSON tree
///
/// Malformed mentions (unknown entity type, unparsable ids) are skipped.
pub fn extract_mentions(content: &Value) -> Vec<Mention> {
    let mut mentions = Vec::new();
    collect_mentions(content, &mut mentions);
    mentions
}

fn collect_mentions(node: &Value, out: &mut Vec<Mention>) {
    let Some(node) = node.as_object() else {
        return;
    };

    if node.get("type").and_then(Value::as_str) == Some("mention") {
        if let Some(mention) = node.get("attrs").and_then(parse_mention) {
            out.push(mention);
        }
    }

    if let Some(Value::Array(children)) = node.get("content") {
        for child in children {
            collect_mentions(child, out);
        }
    }
}

fn parse_mention(attrs: &Value) -> Option<Mention> {
    let kind = match attrs.get("entityType").and_then(Value::as_str)? {
        "user" => MentionKind::User,
        "page" => MentionKind::Page,
        _ => return None,
    };
    let uuid_attr = |name: &str| {
        attrs
            .get(name)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    };

    Some(Mention {
        id: attrs.get("id").and_then(Value::as_str)?.to_string(),
        kind,
        entity_id: uuid_attr("entityId")?,
        label: attrs.get("label").and_then(Value::as_str).map(str::to_string),
        creator_id: uuid_attr("creatorId"),
    })
}
