use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A single constraint attached to a field.
#[derive(Debug, Clone)]
pub enum Rule {
    IsRequired,
    /// Skip every other rule of the field when the value is missing or `null`.
    IsOptional,
    IsString,
    IsNumber,
    IsBoolean,
    /// ISO-8601 date or date-time string.
    IsDate,
    IsInt,
    IsEmail,
    IsUrl,
    IsUuid,
    Min(f64),
    Max(f64),
    IsPositive,
    IsNegative,
    MinLength(usize),
    MaxLength(usize),
    /// Regex source; compiled once together with the rest of the DTO.
    Matches(String),
    IsArray,
    ArrayMinSize(usize),
    ArrayMaxSize(usize),
    /// Validate every element of an array against a nested DTO.
    ArrayItem(DtoThunk),
    IsEnum(Vec<Value>),
}

impl Rule {
    /// The constraint name reported in [`ValidationError`](super::ValidationError).
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsRequired => "isRequired",
            Self::IsOptional => "isOptional",
            Self::IsString => "isString",
            Self::IsNumber => "isNumber",
            Self::IsBoolean => "isBoolean",
            Self::IsDate => "isDate",
            Self::IsInt => "isInt",
            Self::IsEmail => "isEmail",
            Self::IsUrl => "isUrl",
            Self::IsUuid => "isUUID",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::IsPositive => "isPositive",
            Self::IsNegative => "isNegative",
            Self::MinLength(_) => "minLength",
            Self::MaxLength(_) => "maxLength",
            Self::Matches(_) => "matches",
            Self::IsArray => "isArray",
            Self::ArrayMinSize(_) => "arrayMinSize",
            Self::ArrayMaxSize(_) => "arrayMaxSize",
            Self::ArrayItem(_) => "arrayItem",
            Self::IsEnum(_) => "isEnum",
        }
    }

    pub fn matches(pattern: impl Into<String>) -> Self {
        Self::Matches(pattern.into())
    }

    /// Array items must satisfy the rules of `T`.
    pub fn array_item<T: DtoType + 'static>() -> Self {
        Self::ArrayItem(DtoThunk::new(T::dto))
    }

    /// Array items must satisfy the DTO produced by `thunk`. The thunk is called once,
    /// when the outer DTO is compiled.
    pub fn array_item_with<F>(thunk: F) -> Self
    where
        F: Fn() -> Dto + Send + Sync + 'static,
    {
        Self::ArrayItem(DtoThunk::new(thunk))
    }

    /// The value must equal one of `values`.
    pub fn is_enum<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::IsEnum(values.into_iter().map(Into::into).collect())
    }
}

/// Deferred reference to a nested DTO, so DTOs can name types declared later.
///
/// Thunks built from the same function or closure share a [`DtoThunk::source`], which
/// is how the compiler recognizes a DTO that reaches itself.
#[derive(Clone)]
pub struct DtoThunk {
    thunk: Arc<dyn Fn() -> Dto + Send + Sync>,
    source: TypeId,
}

impl DtoThunk {
    pub fn new<F>(thunk: F) -> Self
    where
        F: Fn() -> Dto + Send + Sync + 'static,
    {
        Self {
            thunk: Arc::new(thunk),
            source: TypeId::of::<F>(),
        }
    }

    pub fn resolve(&self) -> Dto {
        (self.thunk)()
    }

    /// Identity of the function or closure behind this thunk.
    pub fn source(&self) -> TypeId {
        self.source
    }
}

impl fmt::Debug for DtoThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DtoThunk").field(&self.source).finish()
    }
}

/// Rules declared on one field, in declaration order.
#[derive(Debug, Clone)]
pub struct FieldRules {
    pub name: String,
    pub rules: Vec<Rule>,
}

/// A field-rule descriptor for one data-transfer type.
///
/// Fields keep their declaration order, and so do the rules on each field; declaring
/// the same field twice appends to its rule list.
#[derive(Debug, Clone)]
pub struct Dto {
    name: String,
    fields: Vec<FieldRules>,
}

impl Dto {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field<I>(mut self, name: impl Into<String>, rules: I) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        let name = name.into();
        let rules = rules.into_iter();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.rules.extend(rules),
            None => self.fields.push(FieldRules {
                name,
                rules: rules.collect(),
            }),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldRules] {
        &self.fields
    }
}

/// A type that describes its own validation rules.
///
/// ```rust
/// use muzu::validation::{Dto, DtoType, Rule};
///
/// struct Tag;
///
/// impl DtoType for Tag {
///     fn dto() -> Dto {
///         Dto::new("Tag").field("name", [Rule::IsString])
///     }
/// }
///
/// let post = Dto::new("Post").field("tags", [Rule::IsArray, Rule::array_item::<Tag>()]);
/// assert_eq!(post.fields()[0].rules.len(), 2);
/// ```
pub trait DtoType {
    fn dto() -> Dto;
}
