use log::debug;

use super::controller::{FieldStatus, FieldValidityState};
use crate::dom::{Document, NodeId};

/// Whether assistive technology should see the field as invalid. Tracks the
/// computed state, not whether the message is currently shown.
pub fn invalid_indicator(state: &FieldValidityState) -> bool {
    match state.status {
        FieldStatus::Invalid => true,
        FieldStatus::Pending => state.message.is_some(),
        FieldStatus::Valid | FieldStatus::Pristine => false,
    }
}

pub(super) fn sync_invalid_indicator(
    document: &mut Document,
    attribute: &str,
    elements: &[NodeId],
    state: &FieldValidityState,
) {
    let value = if invalid_indicator(state) {
        "true"
    } else {
        "false"
    };
    for node in elements.iter().copied() {
        if !document.contains(node) {
            continue;
        }
        if let Err(error) = document.set_attr(node, attribute, value) {
            debug!("skipping {attribute} on {node:?}: {error}");
        }
    }
}
