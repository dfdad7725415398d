use std::str::FromStr;

use log::debug;
use regex::Regex;
use rust_decimal::Decimal;

use super::controller::WrapperOptions;
use super::extract::FieldKind;
use crate::dom::{Document, NodeId};

/// Native constraint-validation outcome of one field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NativeValidity {
    pub valid: bool,
    pub message: String,
}

impl NativeValidity {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: String::new(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Source of built-in validity for a single element. Answers `None` when the
/// element is no longer in the document.
pub trait NativeValidityProvider: Send + Sync {
    fn element_validity(&self, document: &Document, node: NodeId) -> Option<NativeValidity>;
}

/// Browser validity flags, declared in the order their messages take
/// precedence.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Constraint {
    ValueMissing,
    TypeMismatch,
    PatternMismatch,
    TooLong,
    TooShort,
    RangeUnderflow,
    RangeOverflow,
    StepMismatch,
    BadInput,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Violation {
    pub constraint: Constraint,
    pub message: String,
}

/// HTML constraint validation over [`Document`] elements, reporting the
/// browser's English messages.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintValidation;

impl NativeValidityProvider for ConstraintValidation {
    fn element_validity(&self, document: &Document, node: NodeId) -> Option<NativeValidity> {
        let violations = self.violations(document, node)?;
        Some(
            violations
                .into_iter()
                .min_by_key(|violation| violation.constraint)
                .map(|violation| NativeValidity::invalid(violation.message))
                .unwrap_or_else(NativeValidity::valid),
        )
    }
}

impl ConstraintValidation {
    /// Every constraint `node` currently violates, or `None` if it is gone.
    pub fn violations(&self, document: &Document, node: NodeId) -> Option<Vec<Violation>> {
        let tag = document.tag_name(node)?;
        let mut out = Vec::new();
        if is_barred(document, node) {
            return Some(out);
        }

        if tag.eq_ignore_ascii_case("input") {
            input_violations(document, node, &mut out);
        } else if tag.eq_ignore_ascii_case("textarea") {
            let value = document.control_value(node).unwrap_or_default();
            if document.has_attr(node, "required") && value.is_empty() {
                push(&mut out, Constraint::ValueMissing, FILL_OUT_MESSAGE);
            }
            if !value.is_empty() {
                length_violations(document, node, &value, &mut out);
            }
        } else if tag.eq_ignore_ascii_case("select") {
            let value = document.control_value(node).unwrap_or_default();
            if document.has_attr(node, "required") && value.is_empty() {
                push(
                    &mut out,
                    Constraint::ValueMissing,
                    "Please select an item in the list.",
                );
            }
        }
        Some(out)
    }
}

const FILL_OUT_MESSAGE: &str = "Please fill out this field.";

/// Normalizes an input's `type` the way browsers do: lowercase, with unknown
/// values falling back to `text`.
pub fn input_type(document: &Document, node: NodeId) -> String {
    let raw = document
        .attr(node, "type")
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match raw.as_str() {
        "button" | "checkbox" | "color" | "date" | "datetime-local" | "email" | "file"
        | "hidden" | "image" | "month" | "number" | "password" | "radio" | "range" | "reset"
        | "search" | "submit" | "tel" | "text" | "time" | "url" | "week" => raw,
        _ => "text".to_string(),
    }
}

pub(super) fn participates(kind: &str) -> bool {
    !matches!(kind, "button" | "submit" | "reset" | "hidden" | "image")
}

/// Adapts element answers into one field answer. Contenteditable regions get
/// the configured non-empty rule instead of a provider query.
pub(super) fn field_validity(
    provider: &dyn NativeValidityProvider,
    document: &Document,
    kind: FieldKind,
    elements: &[NodeId],
    value: &str,
    options: &WrapperOptions,
) -> NativeValidity {
    if kind == FieldKind::ContentEditable {
        let Some(node) = elements.first().copied().filter(|n| document.contains(*n)) else {
            return NativeValidity::valid();
        };
        let required = document.has_attr(node, "required")
            || document
                .attr(node, "aria-required")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if required && value.trim().is_empty() {
            return NativeValidity::invalid(options.contenteditable_required_message.clone());
        }
        return NativeValidity::valid();
    }

    elements
        .iter()
        .filter_map(|node| provider.element_validity(document, *node))
        .find(|validity| !validity.valid)
        .unwrap_or_else(NativeValidity::valid)
}

fn push(out: &mut Vec<Violation>, constraint: Constraint, message: impl Into<String>) {
    out.push(Violation {
        constraint,
        message: message.into(),
    });
}

fn is_barred(document: &Document, node: NodeId) -> bool {
    if document.has_attr(node, "disabled") {
        return true;
    }
    if (document.has_tag(node, "input") || document.has_tag(node, "textarea"))
        && document.has_attr(node, "readonly")
    {
        return true;
    }
    let mut ancestor = document.parent(node);
    while let Some(id) = ancestor {
        if document.has_tag(id, "fieldset") && document.has_attr(id, "disabled") {
            return true;
        }
        ancestor = document.parent(id);
    }
    false
}

fn input_violations(document: &Document, node: NodeId, out: &mut Vec<Violation>) {
    let kind = input_type(document, node);
    if !participates(&kind) {
        return;
    }
    let required = document.has_attr(node, "required");

    match kind.as_str() {
        "checkbox" => {
            if required && !document.checked(node).unwrap_or(false) {
                push(
                    out,
                    Constraint::ValueMissing,
                    "Please check this box if you want to proceed.",
                );
            }
            return;
        }
        "radio" => {
            if radio_group_required(document, node) && !radio_group_checked(document, node) {
                push(
                    out,
                    Constraint::ValueMissing,
                    "Please select one of these options.",
                );
            }
            return;
        }
        _ => {}
    }

    let raw = document.control_value(node).unwrap_or_default();
    let multiple = document.has_attr(node, "multiple");
    let value = if kind == "email" {
        raw.trim().to_string()
    } else {
        raw
    };

    if value.is_empty() {
        if required {
            push(out, Constraint::ValueMissing, FILL_OUT_MESSAGE);
        }
        return;
    }

    match kind.as_str() {
        "email" => {
            let problem = if multiple {
                value
                    .split(',')
                    .map(str::trim)
                    .find_map(email_problem)
            } else {
                email_problem(&value)
            };
            if let Some(message) = problem {
                push(out, Constraint::TypeMismatch, message);
            }
        }
        "url" => {
            if url::Url::parse(&value).is_err() {
                push(out, Constraint::TypeMismatch, "Please enter a URL.");
            }
        }
        "number" | "range" => number_violations(document, node, &value, out),
        _ => {}
    }

    if matches!(
        kind.as_str(),
        "text" | "search" | "url" | "tel" | "email" | "password"
    ) {
        length_violations(document, node, &value, out);
        pattern_violation(document, node, &value, kind == "email" && multiple, out);
    }
}

fn radio_group_required(document: &Document, node: NodeId) -> bool {
    radio_group(document, node)
        .into_iter()
        .any(|member| document.has_attr(member, "required"))
}

fn radio_group_checked(document: &Document, node: NodeId) -> bool {
    radio_group(document, node)
        .into_iter()
        .any(|member| document.checked(member).unwrap_or(false))
}

/// Radios sharing `node`'s name and form owner, `node` included.
fn radio_group(document: &Document, node: NodeId) -> Vec<NodeId> {
    let name = document.attr(node, "name").unwrap_or_default();
    if name.is_empty() {
        return vec![node];
    }
    let owner = form_owner(document, node);
    let scope = owner.unwrap_or_else(|| document.body());
    document
        .descendants(scope)
        .into_iter()
        .filter(|candidate| {
            document.has_tag(*candidate, "input")
                && input_type(document, *candidate) == "radio"
                && document.attr(*candidate, "name") == Some(name)
                && form_owner(document, *candidate) == owner
        })
        .collect()
}

fn form_owner(document: &Document, node: NodeId) -> Option<NodeId> {
    let mut ancestor = document.parent(node);
    while let Some(id) = ancestor {
        if document.has_tag(id, "form") {
            return Some(id);
        }
        ancestor = document.parent(id);
    }
    None
}

fn length_violations(document: &Document, node: NodeId, value: &str, out: &mut Vec<Violation>) {
    let length = value.chars().count();
    if let Some(max) = parse_attr::<usize>(document, node, "maxlength") {
        if length > max {
            push(
                out,
                Constraint::TooLong,
                format!(
                    "Please shorten this text to no more than {max} characters (you are currently using {length} characters)."
                ),
            );
        }
    }
    if let Some(min) = parse_attr::<usize>(document, node, "minlength") {
        if length < min {
            push(
                out,
                Constraint::TooShort,
                format!(
                    "Please lengthen this text to {min} characters or more (you are currently using {length} characters)."
                ),
            );
        }
    }
}

fn pattern_violation(
    document: &Document,
    node: NodeId,
    value: &str,
    per_address: bool,
    out: &mut Vec<Violation>,
) {
    let Some(pattern) = document.attr(node, "pattern").filter(|p| !p.is_empty()) else {
        return;
    };
    // Patterns the engine cannot compile are ignored, like an invalid pattern
    // attribute in a browser.
    let Ok(regex) = Regex::new(&format!("^(?:{pattern})$")) else {
        debug!("ignoring uncompilable pattern {pattern:?}");
        return;
    };
    let mismatch = if per_address {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .any(|part| !regex.is_match(part))
    } else {
        !regex.is_match(value)
    };
    if mismatch {
        let message = match document.attr(node, "title").filter(|t| !t.is_empty()) {
            Some(title) => format!("Please match the requested format.\n{title}"),
            None => "Please match the requested format.".to_string(),
        };
        push(out, Constraint::PatternMismatch, message);
    }
}

fn number_violations(document: &Document, node: NodeId, value: &str, out: &mut Vec<Violation>) {
    let Some(number) = parse_number(value) else {
        push(out, Constraint::BadInput, "Please enter a number.");
        return;
    };
    let min = document.attr(node, "min").and_then(parse_number);
    let max = document.attr(node, "max").and_then(parse_number);

    if let Some(min) = min.filter(|min| number < *min) {
        push(
            out,
            Constraint::RangeUnderflow,
            format!("Value must be greater than or equal to {}.", min.normalize()),
        );
    }
    if let Some(max) = max.filter(|max| number > *max) {
        push(
            out,
            Constraint::RangeOverflow,
            format!("Value must be less than or equal to {}.", max.normalize()),
        );
    }

    let step_attr = document.attr(node, "step").unwrap_or_default().trim();
    if step_attr.eq_ignore_ascii_case("any") {
        return;
    }
    let step = parse_number(step_attr)
        .filter(|step| step.is_sign_positive() && !step.is_zero())
        .unwrap_or(Decimal::ONE);
    let base = min
        .or_else(|| document.attr(node, "value").and_then(parse_number))
        .unwrap_or(Decimal::ZERO);
    let Some((lower, upper)) = step_neighbours(number, base, step) else {
        return;
    };
    let message = if max.is_some_and(|max| upper > max) {
        format!(
            "Please enter a valid value. The nearest valid value is {}.",
            lower.normalize()
        )
    } else {
        format!(
            "Please enter a valid value. The two nearest valid values are {} and {}.",
            lower.normalize(),
            upper.normalize()
        )
    };
    push(out, Constraint::StepMismatch, message);
}

/// The valid values either side of a misaligned `number`. `None` when the
/// number sits on a step, or when the values fall outside what `Decimal` can
/// represent; the step check is skipped then.
fn step_neighbours(number: Decimal, base: Decimal, step: Decimal) -> Option<(Decimal, Decimal)> {
    let offset = number.checked_sub(base)?;
    if offset.checked_rem(step)?.is_zero() {
        return None;
    }
    let lower = offset
        .checked_div(step)?
        .floor()
        .checked_mul(step)?
        .checked_add(base)?;
    let upper = lower.checked_add(step)?;
    Some((lower, upper))
}

fn parse_number(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('+') {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn parse_attr<T: FromStr>(document: &Document, node: NodeId, name: &str) -> Option<T> {
    document.attr(node, name)?.trim().parse().ok()
}

fn is_email_local_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '.' | '!'
                | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
                | '-'
        )
}

/// Browser message for the first problem in a single address, if any.
fn email_problem(value: &str) -> Option<String> {
    let Some((local, domain)) = value.split_once('@') else {
        return Some(format!(
            "Please include an '@' in the email address. '{value}' is missing an '@'."
        ));
    };
    if local.is_empty() {
        return Some(format!(
            "Please enter a part followed by '@'. '{value}' is incomplete."
        ));
    }
    if domain.is_empty() {
        return Some(format!(
            "Please enter a part following '@'. '{value}' is incomplete."
        ));
    }
    if let Some(symbol) = local.chars().find(|ch| !is_email_local_char(*ch)) {
        return Some(format!(
            "A part followed by '@' should not contain the symbol '{symbol}'."
        ));
    }
    if let Some(symbol) = domain
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '.'))
    {
        return Some(format!(
            "A part following '@' should not contain the symbol '{symbol}'."
        ));
    }
    let labels = domain.split('.').collect::<Vec<_>>();
    if labels.iter().any(|label| label.is_empty()) {
        return Some(format!("'.' is used at a wrong position in '{domain}'."));
    }
    if labels
        .iter()
        .any(|label| label.starts_with('-') || label.ends_with('-'))
    {
        return Some(format!("'-' is used at a wrong position in '{domain}'."));
    }
    if labels.iter().any(|label| label.len() > 63) {
        return Some("Please enter an email address.".to_string());
    }
    None
}
