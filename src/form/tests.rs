use super::*;
use futures::channel::oneshot;
use futures::executor::block_on;
use simplelog::{Config, LevelFilter, TestLogger};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::dom::{Document, NodeId, SharedDocument};

const LINKEDIN_EMAIL_ERROR: &str = "LINKEDIN_EMAIL_ERROR";
const MS_EMAIL_ERROR: &str = "MS_EMAIL_ERROR";
const NOT_EMPTY_ERROR: &str = "NOT_EMPTY_ERROR";

type MapModel = BTreeMap<String, String>;

#[derive(Clone, Debug, FormModel)]
struct SignupForm {
    email: String,
    field2: String,
}

fn init_logger() {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
}

fn map(entries: &[(&str, &str)]) -> MapModel {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn not_linkedin_email(model: &MapModel) -> Option<ValidatorResult> {
    model
        .get("email")
        .filter(|email| email.len() > "@linkedin.com".len() && email.ends_with("@linkedin.com"))
        .map(|_| ValidatorResult::new().with_error("email", LINKEDIN_EMAIL_ERROR))
}

fn not_ms_email(model: &MapModel) -> Option<ValidatorResult> {
    model
        .get("email")
        .filter(|email| email.len() > "@microsoft.com".len() && email.ends_with("@microsoft.com"))
        .map(|_| ValidatorResult::new().with_error("email", MS_EMAIL_ERROR))
}

/// Builds a document whose wrapper root is a `div` under the body.
fn document_with(build: impl FnOnce(&mut Document, NodeId)) -> (SharedDocument, NodeId) {
    let mut document = Document::new();
    let body = document.body();
    let root = document.element("div").append_to(body).expect("root");
    build(&mut document, root);
    (document.shared(), root)
}

fn fill(document: &SharedDocument, node: NodeId, value: &str) {
    document
        .write()
        .expect("document lock")
        .set_value(node, value)
        .expect("set value");
}

fn attr(document: &SharedDocument, node: NodeId, name: &str) -> Option<String> {
    document
        .read()
        .expect("document lock")
        .attr(node, name)
        .map(str::to_string)
}

fn email_form() -> (SharedDocument, NodeId, NodeId) {
    let mut input = None;
    let (document, root) = document_with(|document, root| {
        input = Some(
            document
                .element("input")
                .attr("type", "email")
                .flag("required")
                .attr("name", "email")
                .attr("pattern", ".+\\.com")
                .append_to(root)
                .expect("email input"),
        );
    });
    (document, root, input.expect("email input"))
}

#[test]
fn simple_input_walks_through_native_and_custom_errors() {
    init_logger();
    let (document, root, input) = email_form();
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .validators(
            Validators::new()
                .with(not_linkedin_email)
                .with(not_ms_email),
        )
        .model(map(&[("email", "")]))
        .build();

    assert!(!wrapper.mount().expect("mount").is_pending());
    assert!(wrapper.error_message().expect("errors").is_empty());
    assert_eq!(attr(&document, input, "aria-invalid").as_deref(), Some("true"));

    assert!(!wrapper.set_validating(true).expect("validate").is_pending());
    assert_eq!(
        wrapper.field_error("email").expect("error").as_deref(),
        Some("Please fill out this field.")
    );

    let type_in = |value: &str| {
        fill(&document, input, value);
        let run = wrapper
            .input_with_model("email", map(&[("email", value)]))
            .expect("input");
        assert!(!run.is_pending());
        wrapper.field_error("email").expect("error")
    };

    assert!(type_in("456").expect("syntax error").contains("email"));
    assert_eq!(
        type_in("123@linkedin.net").as_deref(),
        Some("Please match the requested format.")
    );
    assert_eq!(
        type_in("123@linkedin.com").as_deref(),
        Some(LINKEDIN_EMAIL_ERROR)
    );
    assert_eq!(
        type_in("123@microsoft.com").as_deref(),
        Some(MS_EMAIL_ERROR)
    );
    assert_eq!(type_in("123@gmail.com"), None);
    assert_eq!(attr(&document, input, "aria-invalid").as_deref(), Some("false"));
    assert!(wrapper.is_valid().expect("validity"));

    let run = wrapper
        .replace_model(map(&[("email", "789@linkedin.com")]))
        .expect("external change");
    assert!(!run.is_pending());
    assert_eq!(
        wrapper.field_error("email").expect("error").as_deref(),
        Some(LINKEDIN_EMAIL_ERROR)
    );
    assert_eq!(attr(&document, input, "aria-invalid").as_deref(), Some("true"));
}

#[test]
fn multiple_fields_are_scoped_per_edit_and_cleared_by_external_change() {
    init_logger();
    let mut nodes = Vec::new();
    let (document, root) = document_with(|document, root| {
        nodes.push(
            document
                .element("input")
                .attr("type", "email")
                .attr("name", "email")
                .attr("pattern", ".+\\.com")
                .flag("required")
                .append_to(root)
                .expect("email"),
        );
        let fieldset = document
            .element("fieldset")
            .attr("name", "gender-set")
            .append_to(root)
            .expect("fieldset");
        for value in ["bar", "foo", "invalid"] {
            nodes.push(
                document
                    .element("input")
                    .attr("type", "radio")
                    .attr("name", "field2")
                    .attr("value", value)
                    .flag("required")
                    .append_to(fieldset)
                    .expect("radio"),
            );
        }
    });
    let (email, invalid_radio) = (nodes[0], nodes[3]);

    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .options(WrapperOptions {
            reflect_model_values: true,
            ..WrapperOptions::default()
        })
        .validator(|model: &SignupForm| {
            ValidatorResult::new()
                .with_error(
                    "email",
                    if model.email.contains("invalid") {
                        "CUSTOM_VALIDATION_ERROR_EMAIL"
                    } else {
                        ""
                    },
                )
                .with_error(
                    "field2",
                    if model.field2 == "invalid" {
                        "CUSTOM_VALIDATION_ERROR_FIELD2"
                    } else {
                        ""
                    },
                )
        })
        .validating(true)
        .model(SignupForm {
            email: String::new(),
            field2: String::new(),
        })
        .build();

    let _ = wrapper.mount().expect("mount");
    let errors = wrapper.error_message().expect("errors");
    assert!(errors["email"].contains("fill"));
    assert!(errors["field2"].contains("select"));

    fill(&document, email, "invalid@gmail.com");
    let _ = wrapper
        .input_with_model(
            "email",
            SignupForm {
                email: "invalid@gmail.com".into(),
                field2: String::new(),
            },
        )
        .expect("email input");
    let errors = wrapper.error_message().expect("errors");
    assert_eq!(errors["email"], "CUSTOM_VALIDATION_ERROR_EMAIL");
    assert!(errors["field2"].contains("select"), "field2 is untouched");

    document
        .write()
        .expect("document lock")
        .set_checked(invalid_radio, true)
        .expect("check radio");
    let _ = wrapper
        .input_with_model(
            "field2",
            SignupForm {
                email: "invalid@gmail.com".into(),
                field2: "invalid".into(),
            },
        )
        .expect("radio input");
    assert_eq!(
        wrapper.field_error("field2").expect("error").as_deref(),
        Some("CUSTOM_VALIDATION_ERROR_FIELD2")
    );

    let _ = wrapper
        .replace_model(SignupForm {
            email: "valid@foo.com".into(),
            field2: "invalid".into(),
        })
        .expect("external email change");
    assert_eq!(wrapper.field_error("email").expect("error"), None);
    assert_eq!(
        document
            .read()
            .expect("document lock")
            .control_value(email)
            .as_deref(),
        Some("valid@foo.com")
    );

    let _ = wrapper
        .replace_model(SignupForm {
            email: "valid@foo.com".into(),
            field2: "foo".into(),
        })
        .expect("external field2 change");
    assert!(wrapper.error_message().expect("errors").is_empty());
    assert!(wrapper.is_valid().expect("validity"));
}

#[test]
fn markup_case_does_not_hide_constraints() {
    init_logger();
    let mut input = None;
    let (document, root) = document_with(|document, root| {
        input = Some(
            document
                .element("INPUT")
                .attr("TYPE", "EMAIL")
                .flag("REQUIRED")
                .attr("name", "email")
                .append_to(root)
                .expect("input"),
        );
    });
    let input = input.expect("input");
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .model(map(&[("email", "")]))
        .validating(true)
        .build();

    let _ = wrapper.mount().expect("mount");
    assert_eq!(
        wrapper.field_error("email").expect("error").as_deref(),
        Some("Please fill out this field.")
    );

    fill(&document, input, "aa");
    let _ = wrapper.input("email").expect("input");
    assert!(
        wrapper
            .field_error("email")
            .expect("error")
            .expect("syntax error")
            .contains("email")
    );

    document
        .write()
        .expect("document lock")
        .set_attr(input, "type", "URL")
        .expect("type");
    fill(&document, input, "aab");
    let _ = wrapper.input("email").expect("input");
    assert!(
        wrapper
            .field_error("email")
            .expect("error")
            .expect("url error")
            .contains("URL")
    );
}

#[test]
fn contenteditable_reports_through_accessor() {
    init_logger();
    let mut editor = None;
    let (document, root) = document_with(|document, root| {
        editor = Some(
            document
                .element("div")
                .attr("contenteditable", "true")
                .attr("name", "rich-text-editor")
                .flag("required")
                .append_to(root)
                .expect("editor"),
        );
    });
    let editor = editor.expect("editor");
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .validator(|model: &MapModel| {
            model
                .get("rich-text-editor")
                .filter(|value| value.is_empty())
                .map(|_| ValidatorResult::new().with_error("rich-text-editor", NOT_EMPTY_ERROR))
        })
        .model(map(&[("rich-text-editor", "")]))
        .build();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let accessor = wrapper.accessor("rich-text-editor");
    let sink = seen.clone();
    accessor
        .on_validate(move |_, state| sink.lock().expect("sink").push(state.status))
        .expect("observer");

    let _ = wrapper.mount().expect("mount");
    assert!(wrapper.error_message().expect("errors").is_empty());
    assert_eq!(attr(&document, editor, "aria-invalid").as_deref(), Some("true"));

    let _ = wrapper.set_validating(true).expect("validate");
    assert_eq!(
        wrapper
            .field_error("rich-text-editor")
            .expect("error")
            .as_deref(),
        Some("Please fill out this field.")
    );

    let _ = accessor.report_value("123").expect("report");
    assert_eq!(
        wrapper
            .field_error("rich-text-editor")
            .expect("error")
            .as_deref(),
        Some(NOT_EMPTY_ERROR),
        "custom error shows once the native constraint holds"
    );

    let _ = wrapper
        .input_with_model("rich-text-editor", map(&[("rich-text-editor", "123")]))
        .expect("input");
    assert!(wrapper.error_message().expect("errors").is_empty());
    assert_eq!(attr(&document, editor, "aria-invalid").as_deref(), Some("false"));
    assert_eq!(
        accessor.model_value().expect("model value").as_deref(),
        Some("123")
    );
    assert_eq!(
        seen.lock().expect("sink").as_slice(),
        &[FieldStatus::Invalid, FieldStatus::Invalid, FieldStatus::Valid]
    );
}

/// Deferred validator whose answers are handed out by the test, one channel
/// per invocation.
fn deferred_validator(
    senders: Arc<Mutex<Vec<oneshot::Sender<ValidatorResult>>>>,
) -> impl Fn(&MapModel) -> Validation + Send + Sync + 'static {
    move |_model: &MapModel| {
        let (tx, rx) = oneshot::channel();
        senders.lock().expect("senders").push(tx);
        Validation::deferred(async move {
            rx.await
                .map_err(|_| ValidatorFault::new("answer channel dropped"))
        })
    }
}

fn answer(senders: &Mutex<Vec<oneshot::Sender<ValidatorResult>>>, result: ValidatorResult) {
    let sender = senders.lock().expect("senders").remove(0);
    sender.send(result).expect("receiver alive");
}

fn username_form() -> (SharedDocument, NodeId) {
    document_with(|document, root| {
        document
            .element("input")
            .attr("name", "username")
            .attr("value", "taken")
            .append_to(root)
            .expect("username");
    })
}

#[test]
fn later_started_run_wins_over_earlier_slower_run() {
    init_logger();
    let (document, root) = username_form();
    let senders = Arc::new(Mutex::new(Vec::new()));
    let wrapper = ValidatorWrapper::builder(document, root)
        .options(WrapperOptions {
            validate_on_mount: false,
            ..WrapperOptions::default()
        })
        .validator(deferred_validator(senders.clone()))
        .model(map(&[("username", "taken")]))
        .validating(true)
        .build();

    let mount = wrapper.mount().expect("mount");
    assert!(mount.is_pending());
    answer(&senders, ValidatorResult::new());
    block_on(mount.settle()).expect("settle mount");

    let first = wrapper.input("username").expect("first input");
    let second = wrapper.input("username").expect("second input");
    let ValidationRun::Pending(first) = first else {
        panic!("deferred validator leaves the run pending");
    };
    assert!(first.is_superseded().expect("tickets"));

    let mut senders = senders.lock().expect("senders").drain(..).collect::<Vec<_>>();
    assert_eq!(senders.len(), 2);
    let slow = senders.remove(0);
    let fast = senders.remove(0);

    fast.send(ValidatorResult::new()).expect("fast answer");
    block_on(second.settle()).expect("settle second");
    assert_eq!(
        wrapper.field_state("username").expect("state").map(|s| s.status),
        Some(FieldStatus::Valid)
    );

    slow.send(ValidatorResult::new().with_error("username", "TAKEN"))
        .expect("slow answer");
    block_on(first.settle()).expect("settle first");
    assert_eq!(
        wrapper.field_state("username").expect("state").map(|s| s.status),
        Some(FieldStatus::Valid),
        "superseded result is discarded"
    );
    assert!(wrapper.error_message().expect("errors").is_empty());
}

#[test]
fn pending_run_keeps_last_committed_message() {
    init_logger();
    let (document, root) = username_form();
    let senders = Arc::new(Mutex::new(Vec::new()));
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .validator(deferred_validator(senders.clone()))
        .model(map(&[("username", "taken")]))
        .validating(true)
        .build();

    let mount = wrapper.mount().expect("mount");
    answer(&senders, ValidatorResult::new().with_error("username", "TAKEN"));
    block_on(mount.settle()).expect("settle mount");
    assert_eq!(
        wrapper.field_error("username").expect("error").as_deref(),
        Some("TAKEN")
    );

    let run = wrapper.input("username").expect("input");
    assert!(run.is_pending());
    let state = wrapper
        .field_state("username")
        .expect("state")
        .expect("tracked");
    assert_eq!(state.status, FieldStatus::Pending);
    assert_eq!(state.message.as_deref(), Some("TAKEN"));
    assert_eq!(
        wrapper.field_error("username").expect("error").as_deref(),
        Some("TAKEN")
    );
    assert!(invalid_indicator(&state));

    answer(&senders, ValidatorResult::new());
    block_on(run.settle()).expect("settle input");
    assert!(wrapper.error_message().expect("errors").is_empty());
}

#[test]
fn debounced_run_skips_validators_once_superseded() {
    init_logger();
    let (document, root) = username_form();
    let senders = Arc::new(Mutex::new(Vec::new()));
    let wrapper = ValidatorWrapper::builder(document, root)
        .options(WrapperOptions {
            validate_on_mount: false,
            async_debounce: Duration::from_millis(5),
            ..WrapperOptions::default()
        })
        .validator(deferred_validator(senders.clone()))
        .model(map(&[("username", "taken")]))
        .build();
    let _ = wrapper.mount().expect("mount");

    let first = wrapper.input("username").expect("first");
    let second = wrapper.input("username").expect("second");
    block_on(first.settle()).expect("superseded run returns early");

    let stale = senders.lock().expect("senders").remove(0);
    drop(stale);
    answer(&senders, ValidatorResult::new());
    block_on(second.settle()).expect("settle second");
    assert_eq!(
        wrapper.field_state("username").expect("state").map(|s| s.status),
        Some(FieldStatus::Valid)
    );
}

#[test]
fn validator_fault_stays_with_undetermined_fields() {
    init_logger();
    let (document, root) = document_with(|document, root| {
        for name in ["email", "field2", "nickname"] {
            let builder = document.element("input").attr("name", name);
            let builder = if name == "nickname" {
                builder.flag("required")
            } else {
                builder.attr("value", "x")
            };
            builder.append_to(root).expect("input");
        }
    });
    let wrapper = ValidatorWrapper::builder(document, root)
        .validators(
            Validators::new()
                .with(|_model: &MapModel| ValidatorResult::new().with_error("field2", "FIELD2"))
                .with(|_model: &MapModel| Validation::fault("backend unavailable")),
        )
        .model(map(&[("email", "x"), ("field2", "x")]))
        .validating(true)
        .build();

    let run = wrapper.mount().expect("fault does not fail the pass");
    assert!(!run.is_pending());

    let status = |name: &str| {
        wrapper
            .field_state(name)
            .expect("state")
            .map(|state| state.status)
    };
    assert_eq!(status("email"), Some(FieldStatus::Pending));
    assert_eq!(status("field2"), Some(FieldStatus::Invalid));
    assert_eq!(status("nickname"), Some(FieldStatus::Invalid));

    let errors = wrapper.error_message().expect("errors");
    assert_eq!(errors.get("email"), None);
    assert_eq!(errors["field2"], "FIELD2");
    assert_eq!(errors["nickname"], "Please fill out this field.");
    assert!(!wrapper.is_valid().expect("validity"));
}

#[test]
fn covering_validator_fault_leaves_other_fields_determined() {
    init_logger();
    let (document, root) = document_with(|document, root| {
        for name in ["email", "field2"] {
            document
                .element("input")
                .attr("name", name)
                .attr("value", "x")
                .append_to(root)
                .expect("input");
        }
    });
    let wrapper = ValidatorWrapper::builder(document, root)
        .validators(Validators::new().with_covering(["field2"], |_model: &MapModel| {
            Validation::fault("backend unavailable")
        }))
        .model(map(&[("email", "x"), ("field2", "x")]))
        .validating(true)
        .build();

    let _ = wrapper.mount().expect("mount");
    let status = |name: &str| {
        wrapper
            .field_state(name)
            .expect("state")
            .map(|state| state.status)
    };
    assert_eq!(status("email"), Some(FieldStatus::Valid));
    assert_eq!(status("field2"), Some(FieldStatus::Pending));
}

#[test]
fn run_started_before_remount_cannot_overwrite_newer_result() {
    init_logger();
    let (document, root) = username_form();
    let senders = Arc::new(Mutex::new(Vec::new()));
    let wrapper = ValidatorWrapper::builder(document, root)
        .validator(deferred_validator(senders.clone()))
        .model(map(&[("username", "taken")]))
        .validating(true)
        .build();

    let before = wrapper.mount().expect("first mount");
    wrapper.unmount().expect("unmount");
    let after = wrapper.mount().expect("second mount");
    assert!(before.is_pending() && after.is_pending());

    let mut senders = senders.lock().expect("senders").drain(..).collect::<Vec<_>>();
    let newer = senders.remove(1);
    let older = senders.remove(0);

    newer.send(ValidatorResult::new()).expect("newer answer");
    block_on(after.settle()).expect("settle newer");
    older
        .send(ValidatorResult::new().with_error("username", "STALE"))
        .expect("older answer");
    block_on(before.settle()).expect("settle older");

    assert_eq!(
        wrapper.field_state("username").expect("state").map(|s| s.status),
        Some(FieldStatus::Valid)
    );
    assert!(wrapper.error_message().expect("errors").is_empty());
}

#[test]
fn run_started_before_field_readd_cannot_overwrite_newer_result() {
    init_logger();
    let mut input = None;
    let (document, root) = document_with(|document, root| {
        input = Some(
            document
                .element("input")
                .attr("name", "username")
                .attr("value", "taken")
                .append_to(root)
                .expect("username"),
        );
    });
    let senders = Arc::new(Mutex::new(Vec::new()));
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .options(WrapperOptions {
            validate_on_mount: false,
            ..WrapperOptions::default()
        })
        .validator(deferred_validator(senders.clone()))
        .model(map(&[("username", "taken")]))
        .validating(false)
        .build();
    let _ = wrapper.mount().expect("mount");

    let before = wrapper.input("username").expect("input");
    document
        .write()
        .expect("document lock")
        .remove(input.expect("username"))
        .expect("remove");
    let emptied = wrapper.refresh().expect("field removed");
    assert!(!emptied.is_pending());
    assert!(wrapper.field_keys().expect("keys").is_empty());

    document
        .write()
        .expect("document lock")
        .element("input")
        .attr("name", "username")
        .attr("value", "taken")
        .append_to(root)
        .expect("username again");
    let after = wrapper.refresh().expect("field re-added");

    let mut senders = senders.lock().expect("senders").drain(..).collect::<Vec<_>>();
    let newer = senders.pop().expect("newer sender");
    let older = senders.remove(0);

    newer.send(ValidatorResult::new()).expect("newer answer");
    block_on(after.settle()).expect("settle newer");
    older
        .send(ValidatorResult::new().with_error("username", "STALE"))
        .expect("older answer");
    block_on(before.settle()).expect("settle older");

    assert_eq!(
        wrapper.field_state("username").expect("state").map(|s| s.status),
        Some(FieldStatus::Valid)
    );
}

#[test]
fn model_replaced_while_edit_is_in_flight() {
    init_logger();
    let (document, root) = username_form();
    let senders = Arc::new(Mutex::new(Vec::new()));
    let wrapper = ValidatorWrapper::builder(document, root)
        .options(WrapperOptions {
            validate_on_mount: false,
            ..WrapperOptions::default()
        })
        .validator(deferred_validator(senders.clone()))
        .model(map(&[("username", "taken")]))
        .validating(true)
        .build();
    let mount = wrapper.mount().expect("mount");
    answer(&senders, ValidatorResult::new());
    block_on(mount.settle()).expect("settle mount");

    let edit = wrapper
        .input_with_model("username", map(&[("username", "taken2")]))
        .expect("edit");
    let external = wrapper
        .replace_model(map(&[("username", "free")]))
        .expect("external change");
    let ValidationRun::Pending(edit) = edit else {
        panic!("deferred validator leaves the edit pending");
    };
    assert!(edit.is_superseded().expect("tickets"));

    answer(&senders, ValidatorResult::new().with_error("username", "TAKEN"));
    block_on(edit.settle()).expect("settle edit");
    assert_eq!(
        wrapper.field_state("username").expect("state").map(|s| s.status),
        Some(FieldStatus::Pending),
        "the older edit does not commit"
    );

    answer(&senders, ValidatorResult::new());
    block_on(external.settle()).expect("settle external change");
    assert_eq!(
        wrapper.field_state("username").expect("state").map(|s| s.status),
        Some(FieldStatus::Valid)
    );
    assert!(wrapper.error_message().expect("errors").is_empty());
}

#[test]
fn lazy_mount_marks_pristine_fields_not_invalid() {
    init_logger();
    let (document, root, input) = email_form();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .options(WrapperOptions {
            validate_on_mount: false,
            ..WrapperOptions::default()
        })
        .validator(move |_model: &MapModel| {
            counter.fetch_add(1, Ordering::SeqCst);
            ValidatorResult::new()
        })
        .model(map(&[("email", "")]))
        .build();

    let _ = wrapper.mount().expect("mount");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        wrapper.field_state("email").expect("state").map(|s| s.status),
        Some(FieldStatus::Pristine)
    );
    assert_eq!(attr(&document, input, "aria-invalid").as_deref(), Some("false"));
}

#[test]
fn repeated_passes_without_changes_are_idempotent() {
    init_logger();
    let (document, root, input) = email_form();
    fill(&document, input, "123@linkedin.com");
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .validator(not_linkedin_email)
        .model(map(&[("email", "123@linkedin.com")]))
        .validating(true)
        .build();
    let _ = wrapper.mount().expect("mount");

    let before = wrapper.snapshot().expect("snapshot");
    let _ = wrapper.input("email").expect("input");
    let _ = wrapper.input("email").expect("input");
    let after = wrapper.snapshot().expect("snapshot");
    assert_eq!(before.fields, after.fields);
    assert_eq!(before.error_message, after.error_message);
    assert_eq!(attr(&document, input, "aria-invalid").as_deref(), Some("true"));
}

#[test]
fn validating_flag_gates_errors_without_recomputing() {
    init_logger();
    let (document, root, input) = email_form();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .validator(move |_model: &MapModel| {
            counter.fetch_add(1, Ordering::SeqCst);
            ValidatorResult::new()
        })
        .model(map(&[("email", "")]))
        .build();

    let _ = wrapper.mount().expect("mount");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(wrapper.error_message().expect("errors").is_empty());

    let _ = wrapper.set_validating(true).expect("on");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "nothing changed since mount");
    assert_eq!(wrapper.error_message().expect("errors").len(), 1);

    let _ = wrapper.set_validating(false).expect("off");
    assert!(wrapper.error_message().expect("errors").is_empty());
    assert_eq!(
        wrapper
            .field_state("email")
            .expect("state")
            .map(|state| state.status),
        Some(FieldStatus::Invalid),
        "computed state survives while hidden"
    );
    assert_eq!(attr(&document, input, "aria-invalid").as_deref(), Some("true"));

    let _ = wrapper.set_validating(true).expect("on again");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let _ = wrapper.set_validating(false).expect("off");
    fill(&document, input, "a@b.com");
    let _ = wrapper.input("email").expect("input");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let _ = wrapper.set_validating(true).expect("on after edit");
    assert_eq!(calls.load(Ordering::SeqCst), 3, "edits since the last whole pass");
    assert!(wrapper.error_message().expect("errors").is_empty());
}

#[test]
fn missing_model_means_no_known_fields() {
    init_logger();
    let (document, root, _) = email_form();
    let wrapper = ValidatorWrapper::<MapModel>::builder(document, root)
        .validating(true)
        .build();

    let _ = wrapper.mount().expect("mount");
    assert!(wrapper.field_keys().expect("keys").is_empty());
    assert!(wrapper.error_message().expect("errors").is_empty());

    let _ = wrapper
        .set_model(Some(map(&[("email", "")])))
        .expect("model arrives");
    assert_eq!(
        wrapper.field_keys().expect("keys"),
        vec![FieldKey::from("email")]
    );
    assert_eq!(wrapper.error_message().expect("errors").len(), 1);

    let _ = wrapper.set_model(None).expect("model removed");
    assert!(wrapper.field_keys().expect("keys").is_empty());
}

#[test]
fn refresh_tracks_mounted_and_removed_fields() {
    init_logger();
    let (document, root, _) = email_form();
    let wrapper = ValidatorWrapper::builder(document.clone(), root)
        .model(map(&[("email", "")]))
        .validating(true)
        .build();

    assert_eq!(wrapper.input("email").err(), Some(FormError::NotMounted));
    let _ = wrapper.mount().expect("mount");
    assert_eq!(
        wrapper.input("unknown").err(),
        Some(FormError::UnknownField("unknown".to_string()))
    );

    let extra = document
        .write()
        .expect("document lock")
        .element("textarea")
        .attr("name", "bio")
        .flag("required")
        .append_to(root)
        .expect("textarea");
    let _ = wrapper.refresh().expect("refresh");
    assert_eq!(
        wrapper.field_keys().expect("keys"),
        vec![FieldKey::from("bio"), FieldKey::from("email")]
    );
    assert_eq!(wrapper.error_message().expect("errors").len(), 2);

    document
        .write()
        .expect("document lock")
        .remove(extra)
        .expect("remove");
    let _ = wrapper.refresh().expect("refresh");
    assert_eq!(
        wrapper.field_keys().expect("keys"),
        vec![FieldKey::from("email")]
    );

    wrapper.unmount().expect("unmount");
    assert!(!wrapper.is_mounted().expect("mounted"));
    assert_eq!(wrapper.refresh().err(), Some(FormError::NotMounted));
}

#[test]
fn derived_model_exposes_named_fields() {
    let model = SignupForm {
        email: "a@b.com".into(),
        field2: "foo".into(),
    };
    assert_eq!(model.field_value("email").as_deref(), Some("a@b.com"));
    assert_eq!(model.field_value("field2").as_deref(), Some("foo"));
    assert_eq!(model.field_value("missing"), None);
}
