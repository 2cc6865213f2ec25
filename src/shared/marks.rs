//! Mark Editor primitives
//!
//! Direct structural edits of formatting marks on a [`ReplicatedDocument`],
//! outside of any interactive editing transaction. Comment threads use these
//! to attach, resolve and delete their highlight.
//!
//! A mark is stored on a text run as the formatting attribute `mark_name`
//! whose value is the mark's attribute map. Clearing a mark writes `null`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use yrs::types::text::YChange;
use yrs::types::xml::XmlOut;
use yrs::types::Attrs;
use yrs::{Any, Out, ReadTxn, Text, XmlFragment, XmlTextRef};

use crate::shared::anchor::{node_size, AnchorRange};
use crate::shared::document::ReplicatedDocument;
use crate::shared::error::DocumentError;
use crate::shared::schema::{any_to_json, json_to_any};

/// One span whose formatting is about to change
struct SpanEdit {
    run: XmlTextRef,
    offset: u32,
    len: u32,
    value: Any,
}

/// Apply `mark_name` with `attrs` to the span between two anchors
///
/// Both anchors are resolved against the live document first; if either no
/// longer resolves the call fails and nothing is changed. Each text run
/// intersecting the span is formatted only on its intersecting part.
/// Returns the number of runs touched.
pub fn apply_mark(
    document: &ReplicatedDocument,
    range: &AnchorRange,
    mark_name: &str,
    attrs: &Value,
) -> Result<usize, DocumentError> {
    let (start, end) = range.resolve(document)?;
    if start == end {
        return Ok(0);
    }

    let value = mark_value(attrs)?;
    let edits = {
        let txn = document.transact();
        let mut edits = Vec::new();
        collect_range(&txn, document.root(), start, end, 0, &value, &mut edits);
        edits
    };

    apply_edits(document, mark_name, edits)
}

/// Clear `mark_name` from every span whose mark attrs have
/// `attribute == value`
pub fn remove_marks_where(
    document: &ReplicatedDocument,
    mark_name: &str,
    attribute: &str,
    value: &Value,
) -> Result<usize, DocumentError> {
    let edits = matching_spans(document, mark_name, attribute, value, |_| Any::Null);
    apply_edits(document, mark_name, edits)
}

/// Merge `new_attrs` into the attrs of every `mark_name` span whose
/// `attribute == value`
pub fn update_marks_where(
    document: &ReplicatedDocument,
    mark_name: &str,
    attribute: &str,
    value: &Value,
    new_attrs: &Value,
) -> Result<usize, DocumentError> {
    let updates = new_attrs
        .as_object()
        .ok_or_else(|| DocumentError::schema("attrs", "mark attributes must be an object"))?;

    let edits = matching_spans(document, mark_name, attribute, value, |existing| {
        let mut merged: HashMap<String, Any> = match existing {
            Any::Map(map) => map.as_ref().clone(),
            _ => HashMap::new(),
        };
        for (key, value) in updates {
            merged.insert(key.clone(), json_to_any(value));
        }
        Any::Map(Arc::new(merged))
    });
    apply_edits(document, mark_name, edits)
}

fn mark_value(attrs: &Value) -> Result<Any, DocumentError> {
    match attrs {
        Value::Null => Ok(Any::Map(Arc::new(HashMap::new()))),
        Value::Object(_) => Ok(json_to_any(attrs)),
        _ => Err(DocumentError::schema("attrs", "mark attributes must be an object")),
    }
}

fn apply_edits(
    document: &ReplicatedDocument,
    mark_name: &str,
    edits: Vec<SpanEdit>,
) -> Result<usize, DocumentError> {
    if edits.is_empty() {
        return Ok(0);
    }

    let touched = edits.len();
    let mut txn = document.transact_mut();
    for edit in edits {
        let mut attrs = Attrs::new();
        attrs.insert(Arc::from(mark_name), edit.value);
        edit.run.format(&mut txn, edit.offset, edit.len, attrs);
    }
    Ok(touched)
}

fn collect_range<T: ReadTxn, F: XmlFragment>(
    txn: &T,
    parent: &F,
    start: u32,
    end: u32,
    base: u32,
    value: &Any,
    edits: &mut Vec<SpanEdit>,
) {
    let mut position = base;
    for child in parent.children(txn) {
        if position >= end {
            break;
        }
        match child {
            XmlOut::Text(run) => {
                let run_end = position + run.len(txn);
                let lo = start.max(position);
                let hi = end.min(run_end);
                if lo < hi {
                    edits.push(SpanEdit {
                        run,
                        offset: lo - position,
                        len: hi - lo,
                        value: value.clone(),
                    });
                }
                position = run_end;
            }
            XmlOut::Element(element) => {
                let size = node_size(txn, &element);
                if position + size > start {
                    collect_range(txn, &element, start, end, position + 1, value, edits);
                }
                position += size;
            }
            XmlOut::Fragment(_) => {}
        }
    }
}

fn matching_spans<F>(
    document: &ReplicatedDocument,
    mark_name: &str,
    attribute: &str,
    value: &Value,
    rewrite: F,
) -> Vec<SpanEdit>
where
    F: Fn(&Any) -> Any,
{
    let txn = document.transact();
    let mut runs = Vec::new();
    collect_runs(&txn, document.root(), &mut runs);

    let mut edits = Vec::new();
    for run in runs {
        let mut offset = 0;
        for chunk in run.diff(&txn, YChange::identity) {
            let len = match &chunk.insert {
                Out::Any(Any::String(s)) => s.encode_utf16().count() as u32,
                _ => 1,
            };
            let existing = chunk
                .attributes
                .as_deref()
                .and_then(|attrs| attrs.get(mark_name));
            if let Some(existing) = existing {
                if mark_matches(existing, attribute, value) {
                    edits.push(SpanEdit {
                        run: run.clone(),
                        offset,
                        len,
                        value: rewrite(existing),
                    });
                }
            }
            offset += len;
        }
    }
    edits
}

fn mark_matches(existing: &Any, attribute: &str, value: &Value) -> bool {
    match existing {
        Any::Map(map) => map
            .get(attribute)
            .map(|found| &any_to_json(found) == value)
            .unwrap_or(false),
        _ => false,
    }
}

fn collect_runs<T: ReadTxn, F: XmlFragment>(txn: &T, parent: &F, runs: &mut Vec<XmlTextRef>) {
    for child in parent.children(txn) {
        match child {
            XmlOut::Text(run) => runs.push(run),
            XmlOut::Element(element) => collect_runs(txn, &element, runs),
            XmlOut::Fragment(_) => {}
        }
    }
}
