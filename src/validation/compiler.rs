//! Compiles a [`Dto`] into a closure-based validator.
//!
//! Each rule becomes one boxed check closure that already knows its field name,
//! bounds, regex or nested validator. Per field, the checks run in declaration order
//! behind the required/optional gate; fields run in declaration order too. Nothing
//! short-circuits: every violation is reported.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::formats;
use super::rule::{Dto, Rule};
use super::ValidationError;

/// Why a DTO could not be turned into a validator.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid `matches` pattern on {dto}.{field}: {source}")]
    InvalidPattern {
        dto: String,
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("DTO `{0}` reaches itself through arrayItem")]
    RecursiveDto(String),
}

type Check = Box<dyn Fn(&Value, &mut Vec<ValidationError>) + Send + Sync>;
type ValidateFn = dyn Fn(&Value) -> Vec<ValidationError> + Send + Sync;

/// A reusable validator for one DTO.
///
/// Cloning is cheap; all compiled state sits behind an [`Arc`] and is read-only.
#[derive(Clone)]
pub struct CompiledValidator {
    dto: Arc<str>,
    validate: Arc<ValidateFn>,
}

impl CompiledValidator {
    /// Checks `input` and returns every violation, in field-declaration order.
    ///
    /// A non-object input reads every field as missing.
    pub fn validate(&self, input: &Value) -> Vec<ValidationError> {
        (self.validate)(input)
    }

    /// Name of the DTO this validator was compiled from.
    pub fn dto_name(&self) -> &str {
        &self.dto
    }
}

impl fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledValidator")
            .field("dto", &self.dto)
            .finish_non_exhaustive()
    }
}

/// Compiles `dto`, including every DTO reachable through `arrayItem`.
///
/// # Errors
///
/// - [`CompileError::InvalidPattern`] — a `matches` rule holds a bad regex.
/// - [`CompileError::RecursiveDto`] — an `arrayItem` chain leads back to a thunk that
///   is still being compiled. DTOs are told apart by the thunk that produced them, so
///   unrelated DTOs may share a name.
pub fn compile(dto: &Dto) -> Result<CompiledValidator, CompileError> {
    compile_nested(dto, &mut Vec::new())
}

fn compile_nested(dto: &Dto, in_progress: &mut Vec<TypeId>) -> Result<CompiledValidator, CompileError> {
    let mut fields = Vec::with_capacity(dto.fields().len());
    for field in dto.fields().iter().filter(|f| !f.rules.is_empty()) {
        fields.push(compile_field(dto.name(), &field.name, &field.rules, in_progress)?);
    }

    let validate = move |input: &Value| {
        let mut errors = Vec::new();
        for field in &fields {
            field(input, &mut errors);
        }
        errors
    };

    Ok(CompiledValidator {
        dto: Arc::from(dto.name()),
        validate: Arc::new(validate),
    })
}

fn compile_field(
    dto: &str,
    field: &str,
    rules: &[Rule],
    in_progress: &mut Vec<TypeId>,
) -> Result<Check, CompileError> {
    let required = rules.iter().any(|r| matches!(r, Rule::IsRequired));
    let optional = !required && rules.iter().any(|r| matches!(r, Rule::IsOptional));

    let mut checks: Vec<Check> = Vec::with_capacity(rules.len());
    for rule in rules {
        if let Some(check) = compile_rule(dto, field, rule, in_progress)? {
            checks.push(check);
        }
    }

    let field = field.to_owned();
    Ok(Box::new(move |input: &Value, errors: &mut Vec<ValidationError>| {
        let value = input.get(&field).unwrap_or(&Value::Null);
        if value.is_null() {
            if required {
                errors.push(ValidationError::new(
                    field.as_str(),
                    "isRequired",
                    Value::Null,
                    format!("{field} is required"),
                ));
            }
            if optional {
                return;
            }
        }
        for check in &checks {
            check(value, errors);
        }
    }))
}

fn finite_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        _ => false,
    }
}

/// Builds a check that fails whenever `ok` rejects the value.
fn predicate<P>(field: &str, constraint: &'static str, message: String, ok: P) -> Check
where
    P: Fn(&Value) -> bool + Send + Sync + 'static,
{
    let field = field.to_owned();
    Box::new(move |value: &Value, errors: &mut Vec<ValidationError>| {
        if !ok(value) {
            errors.push(ValidationError::new(
                field.as_str(),
                constraint,
                value.clone(),
                message.as_str(),
            ));
        }
    })
}

fn string_matches(regex: &'static Regex) -> impl Fn(&Value) -> bool + Send + Sync + 'static {
    move |value| value.as_str().is_some_and(|s| regex.is_match(s))
}

fn compile_rule(
    dto: &str,
    field: &str,
    rule: &Rule,
    in_progress: &mut Vec<TypeId>,
) -> Result<Option<Check>, CompileError> {
    let name = rule.name();
    let check: Check = match rule {
        Rule::IsRequired | Rule::IsOptional => return Ok(None),
        Rule::IsString => predicate(field, name, format!("{field} must be a string"), Value::is_string),
        Rule::IsNumber => predicate(field, name, format!("{field} must be a number"), |v| {
            finite_number(v).is_some()
        }),
        Rule::IsBoolean => {
            predicate(field, name, format!("{field} must be a boolean"), Value::is_boolean)
        }
        Rule::IsInt => predicate(field, name, format!("{field} must be an integer"), is_integer),
        Rule::IsDate => predicate(
            field,
            name,
            format!("{field} must be a valid date"),
            string_matches(&formats::ISO_DATE),
        ),
        Rule::IsEmail => predicate(
            field,
            name,
            format!("{field} must be a valid email"),
            string_matches(&formats::EMAIL),
        ),
        Rule::IsUrl => predicate(
            field,
            name,
            format!("{field} must be a valid URL"),
            string_matches(&formats::URL),
        ),
        Rule::IsUuid => predicate(
            field,
            name,
            format!("{field} must be a valid UUID"),
            string_matches(&formats::UUID),
        ),
        // Numeric bounds only apply to numbers; type rules catch everything else.
        Rule::Min(min) => {
            let min = *min;
            predicate(field, name, format!("{field} must be at least {min}"), move |v| {
                finite_number(v).is_none_or(|n| n >= min)
            })
        }
        Rule::Max(max) => {
            let max = *max;
            predicate(field, name, format!("{field} must be at most {max}"), move |v| {
                finite_number(v).is_none_or(|n| n <= max)
            })
        }
        Rule::IsPositive => predicate(
            field,
            name,
            format!("{field} must be a positive number"),
            |v| finite_number(v).is_none_or(|n| n > 0.0),
        ),
        Rule::IsNegative => predicate(
            field,
            name,
            format!("{field} must be a negative number"),
            |v| finite_number(v).is_none_or(|n| n < 0.0),
        ),
        Rule::MinLength(min) => {
            let min = *min;
            predicate(
                field,
                name,
                format!("{field} must be at least {min} characters"),
                move |v| v.as_str().is_none_or(|s| s.chars().count() >= min),
            )
        }
        Rule::MaxLength(max) => {
            let max = *max;
            predicate(
                field,
                name,
                format!("{field} must be at most {max} characters"),
                move |v| v.as_str().is_none_or(|s| s.chars().count() <= max),
            )
        }
        Rule::Matches(pattern) => {
            let regex = Regex::new(pattern).map_err(|source| CompileError::InvalidPattern {
                dto: dto.to_owned(),
                field: field.to_owned(),
                source,
            })?;
            predicate(
                field,
                name,
                format!("{field} must match {pattern}"),
                move |v| v.as_str().is_some_and(|s| regex.is_match(s)),
            )
        }
        Rule::IsArray => predicate(field, name, format!("{field} must be an array"), Value::is_array),
        Rule::ArrayMinSize(min) => {
            let min = *min;
            predicate(
                field,
                name,
                format!("{field} must contain at least {min} items"),
                move |v| v.as_array().is_none_or(|items| items.len() >= min),
            )
        }
        Rule::ArrayMaxSize(max) => {
            let max = *max;
            predicate(
                field,
                name,
                format!("{field} must contain at most {max} items"),
                move |v| v.as_array().is_none_or(|items| items.len() <= max),
            )
        }
        Rule::ArrayItem(thunk) => {
            let inner = thunk.resolve();
            if in_progress.contains(&thunk.source()) {
                return Err(CompileError::RecursiveDto(inner.name().to_owned()));
            }
            in_progress.push(thunk.source());
            let nested = compile_nested(&inner, in_progress);
            in_progress.pop();
            let nested = nested?;
            let field = field.to_owned();
            Box::new(move |value: &Value, errors: &mut Vec<ValidationError>| {
                let Some(items) = value.as_array() else {
                    return;
                };
                for (index, item) in items.iter().enumerate() {
                    for mut error in nested.validate(item) {
                        error.field = format!("{field}[{index}].{}", error.field);
                        errors.push(error);
                    }
                }
            })
        }
        Rule::IsEnum(allowed) => {
            let listed = allowed
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let allowed = allowed.clone();
            predicate(
                field,
                name,
                format!("{field} must be one of: {listed}"),
                move |v| allowed.contains(v),
            )
        }
    };
    Ok(Some(check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::DtoType;
    use serde_json::json;

    fn constraints(errors: &[ValidationError]) -> Vec<(&str, &str)> {
        errors
            .iter()
            .map(|e| (e.field.as_str(), e.constraint.as_str()))
            .collect()
    }

    fn validator(dto: Dto) -> CompiledValidator {
        compile(&dto).unwrap()
    }

    #[test]
    fn min_length_rejects_short_and_accepts_long() {
        let v = validator(Dto::new("Name").field("name", [Rule::MinLength(3)]));

        let errors = v.validate(&json!({ "name": "ab" }));
        assert_eq!(constraints(&errors), [("name", "minLength")]);
        assert_eq!(errors[0].value, json!("ab"));
        assert_eq!(errors[0].message, "name must be at least 3 characters");

        assert!(v.validate(&json!({ "name": "abcd" })).is_empty());
    }

    #[test]
    fn required_reports_missing_and_null() {
        let v = validator(Dto::new("User").field("id", [Rule::IsRequired]));
        assert_eq!(constraints(&v.validate(&json!({}))), [("id", "isRequired")]);
        assert_eq!(constraints(&v.validate(&json!({ "id": null }))), [("id", "isRequired")]);
        assert!(v.validate(&json!({ "id": 0 })).is_empty());
    }

    #[test]
    fn required_does_not_suppress_other_rules() {
        let v = validator(Dto::new("User").field("name", [Rule::IsRequired, Rule::IsString]));
        assert_eq!(
            constraints(&v.validate(&json!({}))),
            [("name", "isRequired"), ("name", "isString")]
        );
    }

    #[test]
    fn optional_skips_remaining_rules_when_absent() {
        let v = validator(
            Dto::new("Filter").field("limit", [Rule::IsOptional, Rule::IsInt, Rule::Max(100.0)]),
        );
        assert!(v.validate(&json!({})).is_empty());
        assert!(v.validate(&json!({ "limit": null })).is_empty());
        assert_eq!(
            constraints(&v.validate(&json!({ "limit": 101.5 }))),
            [("limit", "isInt"), ("limit", "max")]
        );
    }

    #[test]
    fn required_wins_over_optional() {
        let v = validator(Dto::new("X").field("a", [Rule::IsOptional, Rule::IsRequired]));
        assert_eq!(constraints(&v.validate(&json!({}))), [("a", "isRequired")]);
    }

    #[test]
    fn type_checks() {
        let v = validator(
            Dto::new("Types")
                .field("s", [Rule::IsString])
                .field("n", [Rule::IsNumber])
                .field("b", [Rule::IsBoolean])
                .field("i", [Rule::IsInt])
                .field("d", [Rule::IsDate]),
        );
        assert!(v
            .validate(&json!({ "s": "x", "n": 1.5, "b": false, "i": 3, "d": "2024-01-31" }))
            .is_empty());
        assert_eq!(
            constraints(&v.validate(&json!({ "s": 1, "n": "1", "b": "true", "i": 3.5, "d": "soon" }))),
            [("s", "isString"), ("n", "isNumber"), ("b", "isBoolean"), ("i", "isInt"), ("d", "isDate")]
        );
    }

    #[test]
    fn int_accepts_whole_floats() {
        let v = validator(Dto::new("X").field("i", [Rule::IsInt]));
        assert!(v.validate(&json!({ "i": 4.0 })).is_empty());
        assert!(v.validate(&json!({ "i": -7 })).is_empty());
    }

    #[test]
    fn numeric_bounds_skip_non_numbers() {
        let v = validator(
            Dto::new("Bounds")
                .field("min", [Rule::Min(1.0)])
                .field("max", [Rule::Max(10.0)])
                .field("pos", [Rule::IsPositive])
                .field("neg", [Rule::IsNegative]),
        );
        assert!(v
            .validate(&json!({ "min": "0", "max": "11", "pos": "-1", "neg": "1" }))
            .is_empty());
        assert_eq!(
            constraints(&v.validate(&json!({ "min": 0, "max": 11, "pos": 0, "neg": 0 }))),
            [("min", "min"), ("max", "max"), ("pos", "isPositive"), ("neg", "isNegative")]
        );
    }

    #[test]
    fn string_bounds_count_characters_and_skip_non_strings() {
        let v = validator(Dto::new("S").field("s", [Rule::MinLength(2), Rule::MaxLength(3)]));
        assert!(v.validate(&json!({ "s": "été" })).is_empty());
        assert!(v.validate(&json!({ "s": 12345 })).is_empty());
        assert_eq!(constraints(&v.validate(&json!({ "s": "four" }))), [("s", "maxLength")]);
    }

    #[test]
    fn format_rules() {
        let v = validator(
            Dto::new("Contact")
                .field("email", [Rule::IsEmail])
                .field("site", [Rule::IsUrl])
                .field("id", [Rule::IsUuid]),
        );
        assert!(v
            .validate(&json!({
                "email": "ada@example.com",
                "site": "https://example.com",
                "id": "123e4567-e89b-12d3-a456-426614174000"
            }))
            .is_empty());
        assert_eq!(
            constraints(&v.validate(&json!({ "email": "nope", "site": 42, "id": "123" }))),
            [("email", "isEmail"), ("site", "isUrl"), ("id", "isUUID")]
        );
    }

    #[test]
    fn matches_uses_custom_pattern() {
        let v = validator(Dto::new("Code").field("code", [Rule::matches(r"^[A-Z]{3}-\d+$")]));
        assert!(v.validate(&json!({ "code": "ABC-12" })).is_empty());
        assert_eq!(constraints(&v.validate(&json!({ "code": "abc-12" }))), [("code", "matches")]);
    }

    #[test]
    fn invalid_pattern_fails_compilation() {
        let err = compile(&Dto::new("Bad").field("x", [Rule::matches("(unclosed")])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidPattern { ref field, .. } if field == "x"));
    }

    #[test]
    fn array_rules() {
        let v = validator(
            Dto::new("List").field("ids", [Rule::IsArray, Rule::ArrayMinSize(1), Rule::ArrayMaxSize(2)]),
        );
        assert!(v.validate(&json!({ "ids": [1] })).is_empty());
        assert_eq!(constraints(&v.validate(&json!({ "ids": [] }))), [("ids", "arrayMinSize")]);
        assert_eq!(constraints(&v.validate(&json!({ "ids": [1, 2, 3] }))), [("ids", "arrayMaxSize")]);
        assert_eq!(constraints(&v.validate(&json!({ "ids": "1" }))), [("ids", "isArray")]);
    }

    #[test]
    fn enum_membership() {
        let v = validator(Dto::new("Role").field("role", [Rule::is_enum(["admin", "user"])]));
        assert!(v.validate(&json!({ "role": "admin" })).is_empty());
        let errors = v.validate(&json!({ "role": "root" }));
        assert_eq!(constraints(&errors), [("role", "isEnum")]);
        assert_eq!(errors[0].message, "role must be one of: admin, user");
    }

    struct Tag;

    impl DtoType for Tag {
        fn dto() -> Dto {
            Dto::new("Tag").field("name", [Rule::IsString])
        }
    }

    #[test]
    fn array_item_errors_are_prefixed_with_index() {
        let v = validator(Dto::new("Post").field("tags", [Rule::IsArray, Rule::array_item::<Tag>()]));

        let errors = v.validate(&json!({ "tags": [{ "name": "rust" }, { "name": 7 }] }));
        assert_eq!(constraints(&errors), [("tags[1].name", "isString")]);
        assert_eq!(errors[0].value, json!(7));
    }

    #[test]
    fn nested_array_items_compose_paths() {
        let v = validator(Dto::new("Board").field(
            "columns",
            [Rule::array_item_with(|| {
                Dto::new("Column").field("cards", [Rule::array_item_with(|| {
                    Dto::new("Card").field("title", [Rule::IsRequired])
                })])
            })],
        ));
        let errors = v.validate(&json!({ "columns": [{ "cards": [] }, { "cards": [{}, { "title": "x" }] }] }));
        assert_eq!(constraints(&errors), [("columns[1].cards[0].title", "isRequired")]);
    }

    #[test]
    fn self_referencing_dto_is_a_compile_error() {
        fn node() -> Dto {
            Dto::new("Node").field("children", [Rule::array_item_with(node)])
        }
        let err = compile(&node()).unwrap_err();
        assert!(matches!(err, CompileError::RecursiveDto(ref name) if name == "Node"));
    }

    #[test]
    fn distinct_dtos_may_share_a_name() {
        let v = validator(Dto::new("Item").field(
            "parts",
            [Rule::array_item_with(|| Dto::new("Item").field("sku", [Rule::IsRequired, Rule::IsString]))],
        ));
        assert!(v.validate(&json!({ "parts": [{ "sku": "A-1" }] })).is_empty());
        assert_eq!(
            constraints(&v.validate(&json!({ "parts": [{ "sku": 3 }] }))),
            [("parts[0].sku", "isString")]
        );
    }

    #[test]
    fn recursion_through_an_intermediate_dto_is_detected() {
        fn folder() -> Dto {
            Dto::new("Folder").field("entries", [Rule::array_item_with(entry)])
        }
        fn entry() -> Dto {
            Dto::new("Entry").field("children", [Rule::array_item_with(folder)])
        }
        let err = compile(&folder()).unwrap_err();
        assert!(matches!(err, CompileError::RecursiveDto(ref name) if name == "Entry"));
    }

    #[test]
    fn sibling_fields_may_share_a_nested_dto() {
        let v = validator(
            Dto::new("Pair")
                .field("left", [Rule::array_item::<Tag>()])
                .field("right", [Rule::array_item::<Tag>()]),
        );
        assert_eq!(v.dto_name(), "Pair");
        assert!(v.validate(&json!({ "left": [{ "name": "a" }], "right": [] })).is_empty());
    }

    #[test]
    fn collects_every_violation_across_fields() {
        let v = validator(
            Dto::new("User")
                .field("name", [Rule::IsString, Rule::MinLength(3)])
                .field("untouched", [])
                .field("age", [Rule::IsInt, Rule::IsPositive]),
        );
        assert_eq!(
            constraints(&v.validate(&json!({ "name": "a", "age": -2.5, "untouched": {} }))),
            [("name", "minLength"), ("age", "isInt"), ("age", "isPositive")]
        );
    }

    #[test]
    fn non_object_input_reads_fields_as_missing() {
        let v = validator(Dto::new("X").field("a", [Rule::IsRequired]));
        assert_eq!(constraints(&v.validate(&json!("scalar"))), [("a", "isRequired")]);
    }
}
