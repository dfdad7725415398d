use std::collections::BTreeMap;

use futures::future::join_all;
use futures_timer::Delay;
use log::{debug, trace, warn};

use super::accessibility;
use super::controller::{
    FieldEntry, FieldKey, FieldValidityState, FormError, FormResult, ValidationTicket,
    ValidatorWrapper, WrapperState, read_lock, write_lock,
};
use super::extract::{self, DiscoveredField};
use super::native::NativeValidity;
use super::validation::{CustomOutcome, FormModel, Slot, merge_custom};
use crate::dom::NodeId;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum Scope {
    Field(FieldKey),
    Whole,
}

/// Native constraint violations always win; a custom error only shows once
/// the native constraints hold. Unknown custom answers keep the previously
/// committed message.
pub(super) fn merge(
    native: &NativeValidity,
    custom: &CustomOutcome,
    previous: &FieldValidityState,
) -> FieldValidityState {
    if !native.valid {
        return FieldValidityState::invalid(native.message.clone());
    }
    match custom {
        CustomOutcome::Clear => FieldValidityState::valid(),
        CustomOutcome::Error(message) => FieldValidityState::invalid(message.clone()),
        CustomOutcome::Indeterminate | CustomOutcome::Awaiting => {
            FieldValidityState::pending(previous.message.clone())
        }
    }
}

pub(super) struct Commit {
    key: FieldKey,
    elements: Vec<NodeId>,
    state: FieldValidityState,
}

/// Outcome of an event. Synchronous results are committed before the run is
/// returned; a pending run commits deferred validator results once settled.
#[must_use = "deferred validator results only commit when the run is settled"]
pub enum ValidationRun<M>
where
    M: FormModel,
{
    Settled,
    Pending(PendingValidation<M>),
}

impl<M> ValidationRun<M>
where
    M: FormModel,
{
    pub fn is_pending(&self) -> bool {
        matches!(self, ValidationRun::Pending(_))
    }

    pub async fn settle(self) -> FormResult<()> {
        match self {
            ValidationRun::Settled => Ok(()),
            ValidationRun::Pending(pending) => pending.settle().await,
        }
    }
}

struct PendingField {
    key: FieldKey,
    native: NativeValidity,
    ticket: ValidationTicket,
}

/// Fields waiting on deferred validators. Only the most recently started run
/// for a field may commit; an older run resolving later is discarded.
pub struct PendingValidation<M>
where
    M: FormModel,
{
    wrapper: ValidatorWrapper<M>,
    fields: Vec<PendingField>,
    slots: Vec<Slot>,
    revision: Option<u64>,
}

impl<M> PendingValidation<M>
where
    M: FormModel,
{
    pub fn fields(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.iter().map(|field| &field.key)
    }

    /// True when a newer run has started for every field this run covers.
    pub fn is_superseded(&self) -> FormResult<bool> {
        let state = read_lock(&self.wrapper.state, "checking pending tickets")?;
        Ok(self
            .fields
            .iter()
            .all(|field| state.tickets.get(&field.key) != Some(&field.ticket)))
    }

    pub async fn settle(self) -> FormResult<()> {
        let debounce = self.wrapper.options.async_debounce;
        if !debounce.is_zero() {
            Delay::new(debounce).await;
            if self.is_superseded()? {
                debug!("pending validation superseded during debounce; skipping");
                return Ok(());
            }
        }

        let PendingValidation {
            wrapper,
            fields,
            slots,
            revision,
        } = self;

        let resolved = join_all(slots.into_iter().map(Slot::resolve)).await;

        let commits = {
            let mut guard = write_lock(&wrapper.state, "committing deferred validation")?;
            let state = &mut *guard;
            let mut commits = Vec::with_capacity(fields.len());
            let mut all_current = true;
            for field in fields {
                if state.tickets.get(&field.key) != Some(&field.ticket) {
                    debug!(
                        "{}: discarding superseded result for {} ({:?})",
                        state.id, field.key, field.ticket
                    );
                    all_current = false;
                    continue;
                }
                let Some(entry) = state.fields.get_mut(&field.key) else {
                    all_current = false;
                    continue;
                };
                let outcome = merge_custom(&resolved, &field.key);
                if outcome == CustomOutcome::Indeterminate {
                    warn!(
                        "{}: validator fault leaves {} undetermined",
                        state.id, field.key
                    );
                }
                let next = merge(&field.native, &outcome, &entry.state);
                trace!("{}: {} settled as {:?}", state.id, field.key, next);
                entry.state = next.clone();
                commits.push(Commit {
                    key: field.key,
                    elements: entry.elements.clone(),
                    state: next,
                });
            }
            if let Some(revision) = revision {
                if all_current && state.revision == revision {
                    state.settled_revision = Some(revision);
                }
            }
            commits
        };
        wrapper.apply_commits(commits)
    }
}

impl<M> ValidatorWrapper<M>
where
    M: FormModel,
{
    /// One reconciliation pass. Synchronous validator answers and native
    /// violations commit atomically for every field in scope; fields still
    /// waiting on a deferred validator come back as a pending run.
    pub(super) fn run_pass(&self, scope: Scope) -> FormResult<ValidationRun<M>> {
        let (id, model, reported, known) = {
            let state = read_lock(&self.state, "reading state for reconciliation")?;
            if !state.mounted {
                return Ok(ValidationRun::Settled);
            }
            (
                state.id,
                state.model.clone(),
                state.reported_values.clone(),
                state
                    .fields
                    .iter()
                    .map(|(key, entry)| (key.clone(), entry.kind))
                    .collect::<BTreeMap<_, _>>(),
            )
        };

        let Some(model) = model else {
            debug!("{id}: no model; forgetting all fields");
            self.forget_fields()?;
            return Ok(ValidationRun::Settled);
        };

        let (discovered, descriptors, scope) = {
            let document = read_lock(&self.document, "scanning document for fields")?;
            let discovered = extract::discover_fields(&document, self.root);
            let scope = match scope {
                Scope::Field(_) if field_set_changed(&known, &discovered) => {
                    debug!("{id}: field set changed; widening to whole-model pass");
                    Scope::Whole
                }
                scope => scope,
            };
            let in_scope = match &scope {
                Scope::Whole => discovered.iter().collect::<Vec<_>>(),
                Scope::Field(key) => vec![
                    discovered
                        .iter()
                        .find(|field| &field.key == key)
                        .ok_or_else(|| FormError::UnknownField(key.to_string()))?,
                ],
            };
            let descriptors = in_scope
                .into_iter()
                .map(|field| {
                    extract::describe_field(
                        &document,
                        field,
                        self.provider.as_ref(),
                        &self.options,
                        reported.get(&field.key).map(String::as_str),
                    )
                })
                .collect::<Vec<_>>();
            (discovered, descriptors, scope)
        };
        debug!(
            "{id}: reconciling {} field(s) ({:?})",
            descriptors.len(),
            scope
        );

        let validators = read_lock(&self.validators, "reading validators")?.clone();
        let slots = validators.start(&model);

        let mut pending = Vec::new();
        let (commits, revision) = {
            let mut guard = write_lock(&self.state, "applying reconciliation")?;
            let state = &mut *guard;
            if scope == Scope::Whole {
                sync_field_set(state, &discovered);
            }

            let mut commits = Vec::with_capacity(descriptors.len());
            for descriptor in descriptors {
                let ticket = state.next_ticket(&descriptor.key);
                let outcome = merge_custom(&slots, &descriptor.key);
                if outcome == CustomOutcome::Indeterminate {
                    warn!(
                        "{id}: validator fault leaves {} undetermined",
                        descriptor.key
                    );
                }
                let entry = state
                    .fields
                    .entry(descriptor.key.clone())
                    .or_insert_with(|| FieldEntry {
                        kind: descriptor.kind,
                        elements: Vec::new(),
                        state: FieldValidityState::pristine(),
                    });
                entry.kind = descriptor.kind;
                entry.elements = descriptor.elements.clone();

                let next = merge(&descriptor.native, &outcome, &entry.state);
                trace!("{id}: {} -> {:?}", descriptor.key, next);
                entry.state = next.clone();

                if outcome == CustomOutcome::Awaiting && descriptor.native.valid {
                    pending.push(PendingField {
                        key: descriptor.key.clone(),
                        native: descriptor.native,
                        ticket,
                    });
                }
                commits.push(Commit {
                    key: descriptor.key,
                    elements: descriptor.elements,
                    state: next,
                });
            }

            let revision = (scope == Scope::Whole).then_some(state.revision);
            if revision.is_some() && pending.is_empty() {
                state.settled_revision = revision;
            }
            (commits, revision)
        };
        self.apply_commits(commits)?;

        if pending.is_empty() {
            return Ok(ValidationRun::Settled);
        }
        debug!("{id}: {} field(s) awaiting deferred validators", pending.len());
        Ok(ValidationRun::Pending(PendingValidation {
            wrapper: self.clone(),
            fields: pending,
            slots,
            revision,
        }))
    }

    /// Writes invalid indicators for committed fields, then notifies
    /// validate callbacks with no locks held.
    pub(super) fn apply_commits(&self, commits: Vec<Commit>) -> FormResult<()> {
        if commits.is_empty() {
            return Ok(());
        }
        {
            let mut document = write_lock(&self.document, "syncing invalid indicators")?;
            for commit in &commits {
                accessibility::sync_invalid_indicator(
                    &mut document,
                    &self.options.invalid_attribute,
                    &commit.elements,
                    &commit.state,
                );
            }
        }

        let observers = read_lock(&self.observers, "reading validate callbacks")?.clone();
        for commit in &commits {
            if let Some(callbacks) = observers.get(&commit.key) {
                for callback in callbacks {
                    callback(&commit.key, &commit.state);
                }
            }
        }
        Ok(())
    }

    /// Writes the invalid indicator for every tracked field from its current
    /// state, without running validators or notifying callbacks.
    pub(super) fn sync_indicators(&self) -> FormResult<()> {
        let fields = read_lock(&self.state, "reading field states")?
            .fields
            .values()
            .map(|entry| (entry.elements.clone(), entry.state.clone()))
            .collect::<Vec<_>>();
        let mut document = write_lock(&self.document, "syncing invalid indicators")?;
        for (elements, state) in &fields {
            accessibility::sync_invalid_indicator(
                &mut document,
                &self.options.invalid_attribute,
                elements,
                state,
            );
        }
        Ok(())
    }

    pub(super) fn forget_fields(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "forgetting fields")?;
        state.fields.clear();
        state.tickets.clear();
        state.settled_revision = Some(state.revision);
        Ok(())
    }
}

/// Aligns tracked fields with a fresh scan: new fields start pristine, gone
/// fields drop their state and any in-flight ticket.
pub(super) fn sync_field_set<M>(state: &mut WrapperState<M>, discovered: &[DiscoveredField]) {
    state
        .fields
        .retain(|key, _| discovered.iter().any(|field| &field.key == key));
    state
        .tickets
        .retain(|key, _| discovered.iter().any(|field| &field.key == key));
    for field in discovered {
        let entry = state
            .fields
            .entry(field.key.clone())
            .or_insert_with(|| FieldEntry {
                kind: field.kind,
                elements: Vec::new(),
                state: FieldValidityState::pristine(),
            });
        if entry.kind != field.kind {
            entry.state = FieldValidityState::pristine();
        }
        entry.kind = field.kind;
        entry.elements = field.elements.clone();
    }
}

pub(super) fn field_set_changed(
    known: &BTreeMap<FieldKey, super::extract::FieldKind>,
    discovered: &[DiscoveredField],
) -> bool {
    known.len() != discovered.len()
        || discovered
            .iter()
            .any(|field| known.get(&field.key) != Some(&field.kind))
}
