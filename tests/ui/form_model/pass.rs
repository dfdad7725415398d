use validator_wrapper::form::FormModel;

#[derive(Clone, validator_wrapper::form::FormModel)]
struct SignupForm {
    email: String,
    #[form(name = "user-age")]
    age: u32,
    #[form(skip)]
    #[allow(dead_code)]
    token: String,
}

fn main() {
    let model = SignupForm {
        email: "a@b.c".to_string(),
        age: 42,
        token: "secret".to_string(),
    };
    assert_eq!(model.field_value("email").as_deref(), Some("a@b.c"));
    assert_eq!(model.field_value("user-age").as_deref(), Some("42"));
    assert_eq!(model.field_value("age"), None);
    assert_eq!(model.field_value("token"), None);
}
