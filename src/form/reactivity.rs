use log::debug;

use super::binding::{self, ValidityAccessor};
use super::controller::{FieldKey, FormError, FormResult, ValidatorWrapper, read_lock, write_lock};
use super::extract;
use super::reconcile::{Scope, ValidationRun, field_set_changed, sync_field_set};
use super::validation::FormModel;

impl<M> ValidatorWrapper<M>
where
    M: FormModel,
{
    /// Scans the subtree and starts tracking its fields. Runs a whole-model
    /// pass when `validate_on_mount` is set or errors are already visible.
    pub fn mount(&self) -> FormResult<ValidationRun<M>> {
        let discovered = {
            let document = read_lock(&self.document, "scanning document on mount")?;
            extract::discover_fields(&document, self.root)
        };
        let (id, eager) = {
            let mut state = write_lock(&self.state, "mounting wrapper")?;
            if state.mounted {
                drop(state);
                return self.refresh();
            }
            state.mounted = true;
            sync_field_set(&mut state, &discovered);
            state.touch();
            (
                state.id,
                state.validating || self.options.validate_on_mount,
            )
        };
        debug!("{id}: mounted with {} field(s)", discovered.len());
        if eager {
            self.run_pass(Scope::Whole)
        } else {
            self.sync_indicators()?;
            Ok(ValidationRun::Settled)
        }
    }

    /// Stops tracking. In-flight runs lose their tickets and commit nothing.
    pub fn unmount(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "unmounting wrapper")?;
        state.mounted = false;
        state.fields.clear();
        state.tickets.clear();
        state.settled_revision = None;
        debug!("{}: unmounted", state.id);
        Ok(())
    }

    /// Rescans after the subtree mutated. A changed field set triggers a
    /// whole-model pass; otherwise only element handles are refreshed.
    pub fn refresh(&self) -> FormResult<ValidationRun<M>> {
        let discovered = {
            let document = read_lock(&self.document, "rescanning document")?;
            extract::discover_fields(&document, self.root)
        };
        let changed = {
            let mut state = write_lock(&self.state, "refreshing field set")?;
            if !state.mounted {
                return Err(FormError::NotMounted);
            }
            let known = state
                .fields
                .iter()
                .map(|(key, entry)| (key.clone(), entry.kind))
                .collect();
            let changed = field_set_changed(&known, &discovered);
            if changed {
                state.touch();
            } else {
                sync_field_set(&mut state, &discovered);
            }
            changed
        };
        if changed {
            self.run_pass(Scope::Whole)
        } else {
            self.sync_indicators()?;
            Ok(ValidationRun::Settled)
        }
    }

    /// A user edit of one field. Only that field is revalidated.
    pub fn input(&self, name: &str) -> FormResult<ValidationRun<M>> {
        {
            let mut state = write_lock(&self.state, "recording field input")?;
            if !state.mounted {
                return Err(FormError::NotMounted);
            }
            state.touch();
        }
        self.run_pass(Scope::Field(FieldKey::from(name)))
    }

    /// A user edit that also hands over the model it produced. This is still
    /// field scoped; use [`ValidatorWrapper::set_model`] for outside changes.
    pub fn input_with_model(&self, name: &str, model: M) -> FormResult<ValidationRun<M>> {
        {
            let mut state = write_lock(&self.state, "recording field input with model")?;
            if !state.mounted {
                return Err(FormError::NotMounted);
            }
            state.model = Some(model);
            state.touch();
        }
        self.run_pass(Scope::Field(FieldKey::from(name)))
    }

    /// Replaces the model from outside. Every field is revalidated so the
    /// change shows without a synthetic input event. `None` means no model,
    /// which leaves no known fields.
    pub fn set_model(&self, model: Option<M>) -> FormResult<ValidationRun<M>> {
        let mounted = {
            let mut state = write_lock(&self.state, "replacing model")?;
            state.model = model.clone();
            state.touch();
            state.mounted
        };
        if !mounted {
            return Ok(ValidationRun::Settled);
        }

        if let Some(model) = model.filter(|_| self.options.reflect_model_values) {
            let written = {
                let mut document = write_lock(&self.document, "reflecting model values")?;
                let discovered = extract::discover_fields(&document, self.root);
                binding::reflect_model(&mut document, &discovered, &model)?
            };
            let mut state = write_lock(&self.state, "clearing reported values")?;
            for key in written {
                state.reported_values.remove(&key);
            }
        }
        self.run_pass(Scope::Whole)
    }

    pub fn replace_model(&self, model: M) -> FormResult<ValidationRun<M>> {
        self.set_model(Some(model))
    }

    /// Turning validation on discloses every current error at once; turning
    /// it off hides errors but keeps the computed state.
    pub fn set_validating(&self, validating: bool) -> FormResult<ValidationRun<M>> {
        let needs_pass = {
            let mut state = write_lock(&self.state, "toggling validating flag")?;
            let was = state.validating;
            state.validating = validating;
            debug!("{}: validating {was} -> {validating}", state.id);
            state.mounted
                && validating
                && !was
                && state.settled_revision != Some(state.revision)
        };
        if needs_pass {
            self.run_pass(Scope::Whole)
        } else {
            Ok(ValidationRun::Settled)
        }
    }

    /// Handle for a custom widget bound to `name`.
    pub fn accessor(&self, name: &str) -> ValidityAccessor<M> {
        ValidityAccessor::new(self.clone(), FieldKey::from(name))
    }

    pub async fn mount_async(&self) -> FormResult<()> {
        self.mount()?.settle().await
    }

    pub async fn refresh_async(&self) -> FormResult<()> {
        self.refresh()?.settle().await
    }

    pub async fn input_async(&self, name: &str) -> FormResult<()> {
        self.input(name)?.settle().await
    }

    pub async fn input_with_model_async(&self, name: &str, model: M) -> FormResult<()> {
        self.input_with_model(name, model)?.settle().await
    }

    pub async fn set_model_async(&self, model: Option<M>) -> FormResult<()> {
        self.set_model(model)?.settle().await
    }

    pub async fn set_validating_async(&self, validating: bool) -> FormResult<()> {
        self.set_validating(validating)?.settle().await
    }
}
