use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use super::controller::FieldKey;

/// Read access to the caller's model, keyed by field name. The wrapper never
/// mutates a model; replacing it is how callers signal an external change.
pub trait FormModel: Clone + Send + Sync + 'static {
    fn field_value(&self, name: &str) -> Option<String>;
}

impl FormModel for BTreeMap<String, String> {
    fn field_value(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl FormModel for HashMap<String, String> {
    fn field_value(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A validator failed to produce a result. Never escapes a reconciliation
/// pass; the fields it might have covered stay undetermined.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("validator failed: {0}")]
pub struct ValidatorFault(pub String);

impl ValidatorFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Per-field output of one validator invocation. An absent entry, a `None`
/// entry and an empty message all mean "no error from this source".
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidatorResult {
    entries: BTreeMap<FieldKey, Option<String>>,
}

impl ValidatorResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, field: impl Into<FieldKey>, message: impl Into<String>) -> Self {
        self.entries.insert(field.into(), Some(message.into()));
        self
    }

    pub fn with_clear(mut self, field: impl Into<FieldKey>) -> Self {
        self.entries.insert(field.into(), None);
        self
    }

    pub fn error(&self, field: &FieldKey) -> Option<&str> {
        self.entries
            .get(field)
            .and_then(Option::as_deref)
            .filter(|message| !message.is_empty())
    }

    pub fn flagged(&self) -> impl Iterator<Item = (&FieldKey, &str)> {
        self.entries.iter().filter_map(|(key, message)| {
            message
                .as_deref()
                .filter(|message| !message.is_empty())
                .map(|message| (key, message))
        })
    }

    pub fn is_clear(&self) -> bool {
        self.flagged().next().is_none()
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for ValidatorResult
where
    K: Into<FieldKey>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, message)| (key.into(), message.map(Into::into)))
                .collect(),
        }
    }
}

pub type ValidationOutput = Result<ValidatorResult, ValidatorFault>;

pub type BoxedValidationFuture =
    Pin<Box<dyn Future<Output = ValidationOutput> + Send + 'static>>;

/// What a validator hands back: a result now, or one later.
pub enum Validation {
    Ready(ValidationOutput),
    Deferred(BoxedValidationFuture),
}

impl Validation {
    pub fn ready(result: ValidatorResult) -> Self {
        Self::Ready(Ok(result))
    }

    pub fn fault(reason: impl Into<String>) -> Self {
        Self::Ready(Err(ValidatorFault::new(reason)))
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = ValidationOutput> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }
}

impl std::fmt::Debug for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Validation::Ready(output) => f.debug_tuple("Ready").field(output).finish(),
            Validation::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

pub trait IntoValidation {
    fn into_validation(self) -> Validation;
}

impl IntoValidation for Validation {
    fn into_validation(self) -> Validation {
        self
    }
}

impl IntoValidation for ValidatorResult {
    fn into_validation(self) -> Validation {
        Validation::ready(self)
    }
}

impl IntoValidation for Option<ValidatorResult> {
    fn into_validation(self) -> Validation {
        Validation::ready(self.unwrap_or_default())
    }
}

impl IntoValidation for ValidationOutput {
    fn into_validation(self) -> Validation {
        Validation::Ready(self)
    }
}

pub trait Validator<M>: Send + Sync {
    fn validate(&self, model: &M) -> Validation;

    /// Fields this validator can flag, or `None` for any field. A fault or an
    /// unresolved answer only holds back the fields it covers.
    fn coverage(&self) -> Option<Arc<BTreeSet<FieldKey>>> {
        None
    }
}

impl<M, F, R> Validator<M> for F
where
    F: Fn(&M) -> R + Send + Sync,
    R: IntoValidation,
{
    fn validate(&self, model: &M) -> Validation {
        (self)(model).into_validation()
    }
}

struct Covering<V> {
    fields: Arc<BTreeSet<FieldKey>>,
    validator: V,
}

impl<M, V> Validator<M> for Covering<V>
where
    V: Validator<M>,
{
    fn validate(&self, model: &M) -> Validation {
        self.validator.validate(model)
    }

    fn coverage(&self) -> Option<Arc<BTreeSet<FieldKey>>> {
        Some(self.fields.clone())
    }
}

/// Ordered list of validators. A single validator is just a list of one.
pub struct Validators<M> {
    list: Vec<Arc<dyn Validator<M>>>,
}

impl<M> Clone for Validators<M> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
        }
    }
}

impl<M> Default for Validators<M> {
    fn default() -> Self {
        Self { list: Vec::new() }
    }
}

impl<M: 'static> Validators<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single<V>(validator: V) -> Self
    where
        V: Validator<M> + 'static,
    {
        Self::new().with(validator)
    }

    pub fn with<V>(mut self, validator: V) -> Self
    where
        V: Validator<M> + 'static,
    {
        self.push(validator);
        self
    }

    pub fn push<V>(&mut self, validator: V)
    where
        V: Validator<M> + 'static,
    {
        self.list.push(Arc::new(validator));
    }

    /// Like [`Validators::with`], but limited to `fields`. Flags for other
    /// fields are ignored, and a fault leaves only `fields` undetermined.
    pub fn with_covering<V, K>(mut self, fields: impl IntoIterator<Item = K>, validator: V) -> Self
    where
        V: Validator<M> + 'static,
        K: Into<FieldKey>,
    {
        self.push_covering(fields, validator);
        self
    }

    pub fn push_covering<V, K>(&mut self, fields: impl IntoIterator<Item = K>, validator: V)
    where
        V: Validator<M> + 'static,
        K: Into<FieldKey>,
    {
        self.list.push(Arc::new(Covering {
            fields: Arc::new(fields.into_iter().map(Into::into).collect()),
            validator,
        }));
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Invokes every validator once against `model`, in list order.
    pub(super) fn start(&self, model: &M) -> Vec<Slot> {
        self.list
            .iter()
            .map(|validator| {
                let slot = match validator.validate(model) {
                    Validation::Ready(output) => Slot::ready(output),
                    Validation::Deferred(future) => Slot::deferred(future),
                };
                slot.covering(validator.coverage())
            })
            .collect()
    }
}

impl<M, V> FromIterator<V> for Validators<M>
where
    M: 'static,
    V: Validator<M> + 'static,
{
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let mut validators = Self::new();
        for validator in iter {
            validators.push(validator);
        }
        validators
    }
}

enum Answer {
    Ready(ValidationOutput),
    Deferred(BoxedValidationFuture),
}

/// One validator's answer for a run, with the fields it may speak for.
pub(super) struct Slot {
    answer: Answer,
    coverage: Option<Arc<BTreeSet<FieldKey>>>,
}

impl Slot {
    pub(super) fn ready(output: ValidationOutput) -> Self {
        Self {
            answer: Answer::Ready(output),
            coverage: None,
        }
    }

    pub(super) fn deferred(future: BoxedValidationFuture) -> Self {
        Self {
            answer: Answer::Deferred(future),
            coverage: None,
        }
    }

    fn covering(mut self, coverage: Option<Arc<BTreeSet<FieldKey>>>) -> Self {
        self.coverage = coverage;
        self
    }

    /// Waits for a deferred answer; ready answers pass through.
    pub(super) async fn resolve(self) -> Self {
        let answer = match self.answer {
            Answer::Ready(output) => Answer::Ready(output),
            Answer::Deferred(future) => Answer::Ready(future.await),
        };
        Self {
            answer,
            coverage: self.coverage,
        }
    }

    fn covers(&self, field: &FieldKey) -> bool {
        self.coverage
            .as_ref()
            .is_none_or(|fields| fields.contains(field))
    }

    fn output(&self) -> Option<&ValidationOutput> {
        match &self.answer {
            Answer::Ready(output) => Some(output),
            Answer::Deferred(_) => None,
        }
    }
}

/// Custom-validator verdict for one field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum CustomOutcome {
    Clear,
    Error(String),
    /// A validator faulted before any validator flagged the field.
    Indeterminate,
    /// A deferred validator ahead of any flag has not resolved yet.
    Awaiting,
}

/// First truthy error in list order wins. Stops at the first slot whose
/// answer is unknown, since a later flag cannot override an earlier one.
///
/// A faulted validator gives no per-field answer, so every field it covers
/// and that no earlier validator flagged becomes undetermined. Validators
/// without declared coverage cover every field; register them with
/// [`Validators::with_covering`] to keep a fault to their own fields.
pub(super) fn merge_custom(slots: &[Slot], field: &FieldKey) -> CustomOutcome {
    for slot in slots.iter().filter(|slot| slot.covers(field)) {
        match slot.output() {
            Some(Ok(result)) => {
                if let Some(message) = result.error(field) {
                    return CustomOutcome::Error(message.to_string());
                }
            }
            Some(Err(_)) => return CustomOutcome::Indeterminate,
            None => return CustomOutcome::Awaiting,
        }
    }
    CustomOutcome::Clear
}
