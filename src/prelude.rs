pub use crate::dom::{Document, NodeId, SharedDocument};
pub use crate::form::{
    ErrorMap, FieldKey, FieldStatus, FieldValidityState, FormError, FormModel, FormResult,
    Validation, ValidationRun, ValidatorFault, ValidatorResult, ValidatorWrapper, Validators,
    ValidityAccessor, WrapperOptions,
};
