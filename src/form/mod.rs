mod accessibility;
mod binding;
mod controller;
mod extract;
mod native;
mod reactivity;
mod reconcile;
mod validation;

#[cfg(test)]
mod tests;

pub use accessibility::invalid_indicator;
pub use binding::ValidityAccessor;
pub use controller::{
    ErrorMap, FieldKey, FieldStatus, FieldValidityState, FormError, FormResult, ValidationTicket,
    ValidatorWrapper, WrapperBuilder, WrapperId, WrapperOptions, WrapperSnapshot,
};
pub use extract::{
    DiscoveredField, FieldDescriptor, FieldKind, describe_field, discover_fields, extract_fields,
};
pub use native::{
    Constraint, ConstraintValidation, NativeValidity, NativeValidityProvider, Violation,
    input_type,
};
pub use reconcile::{PendingValidation, ValidationRun};
pub use validation::{
    BoxedValidationFuture, FormModel, IntoValidation, Validation, ValidationOutput, Validator,
    ValidatorFault, ValidatorResult, Validators,
};
pub use validator_wrapper_derive::FormModel;
