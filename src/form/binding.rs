use std::sync::Arc;

use log::debug;

use super::controller::{
    FieldKey, FieldValidityState, FormError, FormResult, ValidatorWrapper, read_lock, write_lock,
};
use super::extract::{DiscoveredField, FieldKind};
use super::reconcile::{Scope, ValidationRun};
use super::validation::FormModel;
use crate::dom::{Document, DomResult};

/// Handle through which a custom widget (a contenteditable region, say)
/// reports its value and observes the validity computed for it.
pub struct ValidityAccessor<M>
where
    M: FormModel,
{
    wrapper: ValidatorWrapper<M>,
    key: FieldKey,
}

impl<M> Clone for ValidityAccessor<M>
where
    M: FormModel,
{
    fn clone(&self) -> Self {
        Self {
            wrapper: self.wrapper.clone(),
            key: self.key.clone(),
        }
    }
}

impl<M> ValidityAccessor<M>
where
    M: FormModel,
{
    pub(super) fn new(wrapper: ValidatorWrapper<M>, key: FieldKey) -> Self {
        Self { wrapper, key }
    }

    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    /// Records the widget's current value and revalidates its field.
    pub fn report_value(&self, value: impl Into<String>) -> FormResult<ValidationRun<M>> {
        {
            let mut state = write_lock(&self.wrapper.state, "recording reported value")?;
            if !state.mounted {
                return Err(FormError::NotMounted);
            }
            state.reported_values.insert(self.key.clone(), value.into());
            state.touch();
        }
        self.wrapper.run_pass(Scope::Field(self.key.clone()))
    }

    pub async fn report_value_async(&self, value: impl Into<String>) -> FormResult<()> {
        self.report_value(value)?.settle().await
    }

    /// Called with every committed state for this field, synchronous or
    /// deferred, after the wrapper's locks are released.
    pub fn on_validate<F>(&self, callback: F) -> FormResult<()>
    where
        F: Fn(&FieldKey, &FieldValidityState) + Send + Sync + 'static,
    {
        self.wrapper
            .register_observer(self.key.clone(), Arc::new(callback))
    }

    pub fn state(&self) -> FormResult<Option<FieldValidityState>> {
        self.wrapper.field_state(self.key.as_str())
    }

    /// The model's value for this field, if a model is set and has one.
    pub fn model_value(&self) -> FormResult<Option<String>> {
        Ok(read_lock(&self.wrapper.state, "reading model value")?
            .model
            .as_ref()
            .and_then(|model| model.field_value(self.key.as_str())))
    }
}

/// Writes model values into the controls they belong to. Returns the keys of
/// contenteditable fields that were written, whose reported values are stale.
pub(super) fn reflect_model<M>(
    document: &mut Document,
    fields: &[DiscoveredField],
    model: &M,
) -> FormResult<Vec<FieldKey>>
where
    M: FormModel,
{
    let mut written = Vec::new();
    for field in fields {
        let Some(value) = model.field_value(field.key.as_str()) else {
            continue;
        };
        reflect_field(document, field, &value)?;
        debug!("reflected model value into {}", field.key);
        if field.kind == FieldKind::ContentEditable {
            written.push(field.key.clone());
        }
    }
    Ok(written)
}

fn reflect_field(document: &mut Document, field: &DiscoveredField, value: &str) -> DomResult<()> {
    for node in field.elements.iter().copied() {
        if !document.contains(node) {
            continue;
        }
        match field.kind {
            FieldKind::TextLike => document.set_value(node, value)?,
            FieldKind::ContentEditable => document.set_text_content(node, value)?,
            FieldKind::GroupedChoice => {
                let member = document.attr(node, "value").unwrap_or("on").to_string();
                let checked = value.split(',').any(|part| part.trim() == member);
                document.set_checked(node, checked)?;
            }
        }
    }
    Ok(())
}
