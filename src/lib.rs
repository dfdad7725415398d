//! Reconciles native constraint validity with custom validators for the
//! named form fields under a document subtree.

pub mod dom;
pub mod form;
pub mod prelude;
