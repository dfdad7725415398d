use std::collections::BTreeMap;

use log::debug;

use super::controller::{FieldKey, WrapperOptions};
use super::native::{self, NativeValidity, NativeValidityProvider};
use crate::dom::{Document, NodeId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// `input`, `textarea` and `select` controls with their own value.
    TextLike,
    ContentEditable,
    /// Radio or checkbox inputs sharing one name.
    GroupedChoice,
}

/// A field as found in the document, before its value is read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveredField {
    pub key: FieldKey,
    pub kind: FieldKind,
    pub elements: Vec<NodeId>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    pub key: FieldKey,
    pub kind: FieldKind,
    pub elements: Vec<NodeId>,
    pub value: String,
    pub native: NativeValidity,
}

/// Every named field under `root`, in document order. Radio and checkbox
/// inputs with the same name collapse into one grouped field.
pub fn discover_fields(document: &Document, root: NodeId) -> Vec<DiscoveredField> {
    let mut fields: Vec<DiscoveredField> = Vec::new();
    for node in document.descendants(root) {
        let Some(kind) = classify(document, node) else {
            continue;
        };
        let Some(name) = document
            .attr(node, "name")
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            continue;
        };

        match fields.iter_mut().find(|field| field.key.as_str() == name) {
            Some(existing) if existing.kind == kind => existing.elements.push(node),
            Some(existing) => {
                debug!(
                    "ignoring {kind:?} element named {name:?}; field already bound as {:?}",
                    existing.kind
                );
            }
            None => fields.push(DiscoveredField {
                key: FieldKey::from(name),
                kind,
                elements: vec![node],
            }),
        }
    }
    fields
}

/// Reads the current value and native validity of a discovered field.
/// `reported` holds values pushed by custom widgets for contenteditable fields.
pub fn describe_field(
    document: &Document,
    field: &DiscoveredField,
    provider: &dyn NativeValidityProvider,
    options: &WrapperOptions,
    reported: Option<&str>,
) -> FieldDescriptor {
    let value = field_value(document, field, reported);
    let native = native::field_validity(
        provider,
        document,
        field.kind,
        &field.elements,
        &value,
        options,
    );
    FieldDescriptor {
        key: field.key.clone(),
        kind: field.kind,
        elements: field.elements.clone(),
        value,
        native,
    }
}

pub fn extract_fields(
    document: &Document,
    root: NodeId,
    provider: &dyn NativeValidityProvider,
    options: &WrapperOptions,
    reported: &BTreeMap<FieldKey, String>,
) -> Vec<FieldDescriptor> {
    discover_fields(document, root)
        .iter()
        .map(|field| {
            describe_field(
                document,
                field,
                provider,
                options,
                reported.get(&field.key).map(String::as_str),
            )
        })
        .collect()
}

fn classify(document: &Document, node: NodeId) -> Option<FieldKind> {
    if document.has_tag(node, "input") {
        let kind = native::input_type(document, node);
        if !native::participates(&kind) {
            return None;
        }
        return Some(if matches!(kind.as_str(), "radio" | "checkbox") {
            FieldKind::GroupedChoice
        } else {
            FieldKind::TextLike
        });
    }
    if document.has_tag(node, "textarea") || document.has_tag(node, "select") {
        return Some(FieldKind::TextLike);
    }
    let editable = document.attr(node, "contenteditable")?;
    (!editable.trim().eq_ignore_ascii_case("false")).then_some(FieldKind::ContentEditable)
}

fn field_value(document: &Document, field: &DiscoveredField, reported: Option<&str>) -> String {
    let Some(first) = field.elements.first().copied() else {
        return String::new();
    };
    match field.kind {
        FieldKind::TextLike => document.control_value(first).unwrap_or_default(),
        FieldKind::ContentEditable => match reported {
            Some(value) => value.to_string(),
            None => document
                .text_content(first)
                .map(|text| text.trim().to_string())
                .unwrap_or_default(),
        },
        FieldKind::GroupedChoice => field
            .elements
            .iter()
            .filter(|node| document.checked(**node).unwrap_or(false))
            .map(|node| document.attr(*node, "value").unwrap_or("on").to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}
