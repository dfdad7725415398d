use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;

use super::extract::FieldKind;
use super::native::{ConstraintValidation, NativeValidityProvider};
use super::validation::{FormModel, Validator, Validators};
use crate::dom::{DomError, NodeId, SharedDocument};

static WRAPPER_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WrapperId(pub u64);

impl WrapperId {
    pub fn next() -> Self {
        Self(WRAPPER_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for WrapperId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "wrapper-{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(Arc<str>);

impl FieldKey {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldStatus {
    Pristine,
    Valid,
    Invalid,
    /// A deferred validator has not answered yet, or a validator faulted.
    Pending,
}

/// Merged validity of one field. While `Pending`, `message` keeps the last
/// committed error so the view does not flicker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldValidityState {
    pub status: FieldStatus,
    pub message: Option<String>,
}

impl FieldValidityState {
    pub fn pristine() -> Self {
        Self {
            status: FieldStatus::Pristine,
            message: None,
        }
    }

    pub fn valid() -> Self {
        Self {
            status: FieldStatus::Valid,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: FieldStatus::Invalid,
            message: Some(message.into()),
        }
    }

    pub fn pending(retained: Option<String>) -> Self {
        Self {
            status: FieldStatus::Pending,
            message: retained,
        }
    }

    /// The error a view should show, if any, ignoring the validating gate.
    pub fn error(&self) -> Option<&str> {
        match self.status {
            FieldStatus::Invalid | FieldStatus::Pending => self.message.as_deref(),
            FieldStatus::Pristine | FieldStatus::Valid => None,
        }
    }
}

impl Default for FieldValidityState {
    fn default() -> Self {
        Self::pristine()
    }
}

pub type ErrorMap = BTreeMap<FieldKey, String>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WrapperOptions {
    pub validate_on_mount: bool,
    pub reflect_model_values: bool,
    pub invalid_attribute: String,
    pub contenteditable_required_message: String,
    pub async_debounce: Duration,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            validate_on_mount: true,
            reflect_model_values: false,
            invalid_attribute: "aria-invalid".to_string(),
            contenteditable_required_message: "Please fill out this field.".to_string(),
            async_debounce: Duration::ZERO,
        }
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FormError {
    #[error("validator wrapper state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("validator wrapper is not mounted")]
    NotMounted,
    #[error("no field named {0:?} under the wrapper root")]
    UnknownField(String),
    #[error(transparent)]
    Dom(#[from] DomError),
}

pub type FormResult<T> = Result<T, FormError>;

#[derive(Clone, Debug)]
pub struct WrapperSnapshot<M> {
    pub id: WrapperId,
    pub model: Option<M>,
    pub validating: bool,
    pub mounted: bool,
    pub fields: BTreeMap<FieldKey, FieldValidityState>,
    pub error_message: ErrorMap,
    pub is_valid: bool,
}

pub(super) type ValidateCallback = Arc<dyn Fn(&FieldKey, &FieldValidityState) + Send + Sync>;

pub(super) struct FieldEntry {
    pub(super) kind: FieldKind,
    pub(super) elements: Vec<NodeId>,
    pub(super) state: FieldValidityState,
}

pub(super) struct WrapperState<M> {
    pub(super) id: WrapperId,
    pub(super) model: Option<M>,
    pub(super) validating: bool,
    pub(super) mounted: bool,
    pub(super) fields: BTreeMap<FieldKey, FieldEntry>,
    /// Ticket of the most recently started run per field.
    pub(super) tickets: BTreeMap<FieldKey, ValidationTicket>,
    pub(super) last_ticket: u64,
    pub(super) reported_values: BTreeMap<FieldKey, String>,
    /// Bumped by every edit, model replacement and field-set change.
    pub(super) revision: u64,
    /// Revision at which the last whole-model pass fully committed.
    pub(super) settled_revision: Option<u64>,
}

impl<M> WrapperState<M> {
    /// Tickets come from one counter that only grows, so a run started after
    /// a remount or field re-add never shares a ticket with an older run.
    pub(super) fn next_ticket(&mut self, key: &FieldKey) -> ValidationTicket {
        self.last_ticket += 1;
        let next = ValidationTicket(self.last_ticket);
        self.tickets.insert(key.clone(), next);
        next
    }

    pub(super) fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub(super) fn error_map(&self) -> ErrorMap {
        if !self.validating {
            return ErrorMap::new();
        }
        self.fields
            .iter()
            .filter_map(|(key, entry)| {
                entry
                    .state
                    .error()
                    .map(|message| (key.clone(), message.to_string()))
            })
            .collect()
    }
}

/// Reconciles native constraint validity and custom validators for the named
/// fields under one document subtree.
///
/// Every event method returns a [`super::ValidationRun`]; synchronous results
/// are already committed when it returns, deferred ones commit when the run
/// is settled.
pub struct ValidatorWrapper<M>
where
    M: FormModel,
{
    pub(super) options: Arc<WrapperOptions>,
    pub(super) document: SharedDocument,
    pub(super) root: NodeId,
    pub(super) provider: Arc<dyn NativeValidityProvider>,
    pub(super) validators: Arc<RwLock<Validators<M>>>,
    pub(super) state: Arc<RwLock<WrapperState<M>>>,
    pub(super) observers: Arc<RwLock<BTreeMap<FieldKey, Vec<ValidateCallback>>>>,
}

impl<M> Clone for ValidatorWrapper<M>
where
    M: FormModel,
{
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            document: self.document.clone(),
            root: self.root,
            provider: self.provider.clone(),
            validators: self.validators.clone(),
            state: self.state.clone(),
            observers: self.observers.clone(),
        }
    }
}

pub struct WrapperBuilder<M>
where
    M: FormModel,
{
    document: SharedDocument,
    root: NodeId,
    options: WrapperOptions,
    provider: Arc<dyn NativeValidityProvider>,
    validators: Validators<M>,
    model: Option<M>,
    validating: bool,
}

impl<M> WrapperBuilder<M>
where
    M: FormModel,
{
    pub fn options(mut self, options: WrapperOptions) -> Self {
        self.options = options;
        self
    }

    pub fn native_provider(mut self, provider: impl NativeValidityProvider + 'static) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    pub fn model(mut self, model: M) -> Self {
        self.model = Some(model);
        self
    }

    pub fn validating(mut self, validating: bool) -> Self {
        self.validating = validating;
        self
    }

    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: Validator<M> + 'static,
    {
        self.validators = Validators::single(validator);
        self
    }

    pub fn validators(mut self, validators: Validators<M>) -> Self {
        self.validators = validators;
        self
    }

    pub fn build(self) -> ValidatorWrapper<M> {
        ValidatorWrapper {
            options: Arc::new(self.options),
            document: self.document,
            root: self.root,
            provider: self.provider,
            validators: Arc::new(RwLock::new(self.validators)),
            state: Arc::new(RwLock::new(WrapperState {
                id: WrapperId::next(),
                model: self.model,
                validating: self.validating,
                mounted: false,
                fields: BTreeMap::new(),
                tickets: BTreeMap::new(),
                last_ticket: 0,
                reported_values: BTreeMap::new(),
                revision: 0,
                settled_revision: None,
            })),
            observers: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<M> ValidatorWrapper<M>
where
    M: FormModel,
{
    pub fn builder(document: SharedDocument, root: NodeId) -> WrapperBuilder<M> {
        WrapperBuilder {
            document,
            root,
            options: WrapperOptions::default(),
            provider: Arc::new(ConstraintValidation),
            validators: Validators::new(),
            model: None,
            validating: false,
        }
    }

    pub fn id(&self) -> FormResult<WrapperId> {
        Ok(read_lock(&self.state, "reading wrapper id")?.id)
    }

    pub fn options(&self) -> &WrapperOptions {
        &self.options
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Replaces the validator list with a single validator.
    pub fn set_validator<V>(&self, validator: V) -> FormResult<()>
    where
        V: Validator<M> + 'static,
    {
        self.set_validators(Validators::single(validator))
    }

    pub fn set_validators(&self, validators: Validators<M>) -> FormResult<()> {
        *write_lock(&self.validators, "replacing validators")? = validators;
        write_lock(&self.state, "invalidating settled revision")?.settled_revision = None;
        Ok(())
    }

    pub fn register_validator<V>(&self, validator: V) -> FormResult<()>
    where
        V: Validator<M> + 'static,
    {
        write_lock(&self.validators, "registering validator")?.push(validator);
        write_lock(&self.state, "invalidating settled revision")?.settled_revision = None;
        Ok(())
    }

    pub fn validating(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading validating flag")?.validating)
    }

    pub fn model(&self) -> FormResult<Option<M>> {
        Ok(read_lock(&self.state, "reading model")?.model.clone())
    }

    pub fn is_mounted(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading mount state")?.mounted)
    }

    /// Field name to message for every invalid field; empty while the
    /// validating flag is off.
    pub fn error_message(&self) -> FormResult<ErrorMap> {
        Ok(read_lock(&self.state, "reading error map")?.error_map())
    }

    pub fn field_error(&self, name: &str) -> FormResult<Option<String>> {
        Ok(self.error_message()?.remove(name))
    }

    pub fn field_state(&self, name: &str) -> FormResult<Option<FieldValidityState>> {
        Ok(read_lock(&self.state, "reading field state")?
            .fields
            .get(name)
            .map(|entry| entry.state.clone()))
    }

    pub fn field_keys(&self) -> FormResult<Vec<FieldKey>> {
        Ok(read_lock(&self.state, "reading field keys")?
            .fields
            .keys()
            .cloned()
            .collect())
    }

    /// True once every known field has been validated and none is in error.
    pub fn is_valid(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading validity")?
            .fields
            .values()
            .all(|entry| entry.state.status == FieldStatus::Valid))
    }

    pub fn snapshot(&self) -> FormResult<WrapperSnapshot<M>> {
        let state = read_lock(&self.state, "creating wrapper snapshot")?;
        Ok(WrapperSnapshot {
            id: state.id,
            model: state.model.clone(),
            validating: state.validating,
            mounted: state.mounted,
            fields: state
                .fields
                .iter()
                .map(|(key, entry)| (key.clone(), entry.state.clone()))
                .collect(),
            error_message: state.error_map(),
            is_valid: state
                .fields
                .values()
                .all(|entry| entry.state.status == FieldStatus::Valid),
        })
    }

    pub(super) fn register_observer(&self, key: FieldKey, callback: ValidateCallback) -> FormResult<()> {
        write_lock(&self.observers, "registering validate callback")?
            .entry(key)
            .or_default()
            .push(callback);
        Ok(())
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
