//! Type descriptors.
//!
//! A [`TypeRef`] is a closed recursive structure: a qualified name, a list of
//! variance-labelled type arguments and a nullability flag. The same structure
//! describes types inside a symbol snapshot and types read back from the
//! manifest, so both sides share the canonical text form:
//!
//! ```text
//! kotlin.collections.Map<kotlin.String, out com.example.Item?>
//! com.example.Outer$Inner
//! kotlin.collections.List<*>
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KirokError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variance {
    #[default]
    Invariant,
    In,
    Out,
    Star,
}

impl Variance {
    pub fn label(&self) -> &'static str {
        match self {
            Variance::Invariant => "",
            Variance::In => "in",
            Variance::Out => "out",
            Variance::Star => "*",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeArgument {
    #[serde(default)]
    pub variance: Variance,
    /// `None` for a star projection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeRef>,
}

impl TypeArgument {
    pub fn invariant(ty: TypeRef) -> Self {
        Self {
            variance: Variance::Invariant,
            ty: Some(ty),
        }
    }

    pub fn star() -> Self {
        Self {
            variance: Variance::Star,
            ty: None,
        }
    }

    pub fn is_star(&self) -> bool {
        self.variance == Variance::Star || self.ty.is_none()
    }
}

/// A resolved type reference.
///
/// In snapshot JSON a type may be written either as the full object or as its
/// canonical string (`"kotlin.collections.List<kotlin.Int>"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TypeRefRepr")]
pub struct TypeRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<TypeArgument>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TypeRefRepr {
    Text(String),
    Full {
        name: String,
        #[serde(default)]
        arguments: Vec<TypeArgument>,
        #[serde(default)]
        nullable: bool,
    },
}

impl TryFrom<TypeRefRepr> for TypeRef {
    type Error = KirokError;

    fn try_from(repr: TypeRefRepr) -> Result<Self> {
        match repr {
            TypeRefRepr::Text(text) => TypeRef::parse(&text),
            TypeRefRepr::Full {
                name,
                arguments,
                nullable,
            } => Ok(TypeRef {
                name,
                arguments,
                nullable,
            }),
        }
    }
}

impl TypeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            nullable: false,
        }
    }

    pub fn with_args(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        Self {
            name: name.into(),
            arguments: args.into_iter().map(TypeArgument::invariant).collect(),
            nullable: false,
        }
    }

    /// `name<*, *, ...>` with `arity` star projections.
    pub fn star_projected(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arguments: (0..arity).map(|_| TypeArgument::star()).collect(),
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Simple (last dotted segment) name.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Type of the argument at `index`, if present and not a star projection.
    pub fn argument(&self, index: usize) -> Option<&TypeRef> {
        self.arguments.get(index).and_then(|a| a.ty.as_ref())
    }

    /// Renders the canonical string, mapping each qualified name through
    /// `qualifier` first.
    pub fn render_with(&self, qualifier: &dyn Fn(&str) -> String) -> String {
        let mut out = qualifier(&self.name);

        if !self.arguments.is_empty() {
            let args: Vec<String> = self
                .arguments
                .iter()
                .map(|arg| match &arg.ty {
                    None => "*".to_string(),
                    Some(ty) => format!("{} {}", arg.variance.label(), ty.render_with(qualifier))
                        .trim()
                        .to_string(),
                })
                .collect();
            out.push('<');
            out.push_str(&args.join(", "));
            out.push('>');
        }

        if self.nullable {
            out.push('?');
        }

        out
    }

    /// Parses the canonical string form.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = TypeParser {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos < parser.chars.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_with(&|name| name.to_string()))
    }
}

impl FromStr for TypeRef {
    type Err = KirokError;

    fn from_str(s: &str) -> Result<Self> {
        TypeRef::parse(s)
    }
}

struct TypeParser<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl TypeParser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> KirokError {
        KirokError::TypeParse(format!(
            "{} at position {} in '{}'",
            message, self.pos, self.input
        ))
    }

    fn parse_name(&mut self) -> Result<String> {
        self.skip_ws();
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '$' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error("expected a type name"));
        }
        Ok(name)
    }

    fn parse_type(&mut self) -> Result<TypeRef> {
        let name = self.parse_name()?;
        let mut ty = TypeRef::new(name);

        self.skip_ws();
        if self.peek() == Some('<') {
            self.pos += 1;
            self.skip_ws();
            // `Foo<>` is accepted as "no arguments"
            if self.peek() == Some('>') {
                self.pos += 1;
            } else {
                loop {
                    ty.arguments.push(self.parse_argument()?);
                    self.skip_ws();
                    match self.peek() {
                        Some(',') => self.pos += 1,
                        Some('>') => {
                            self.pos += 1;
                            break;
                        }
                        _ => return Err(self.error("expected ',' or '>'")),
                    }
                }
            }
        }

        self.skip_ws();
        if self.peek() == Some('?') {
            self.pos += 1;
            ty.nullable = true;
        }

        Ok(ty)
    }

    fn parse_argument(&mut self) -> Result<TypeArgument> {
        self.skip_ws();
        if self.peek() == Some('*') {
            self.pos += 1;
            return Ok(TypeArgument::star());
        }

        let start = self.pos;
        let word = self.parse_name()?;
        let variance = match word.as_str() {
            "in" => Variance::In,
            "out" => Variance::Out,
            _ => Variance::Invariant,
        };

        if variance == Variance::Invariant {
            self.pos = start;
        } else {
            self.skip_ws();
            // `in` / `out` used as a plain type name
            if matches!(self.peek(), None | Some(',') | Some('>') | Some('<') | Some('?')) {
                self.pos = start;
                return Ok(TypeArgument::invariant(self.parse_type()?));
            }
        }

        Ok(TypeArgument {
            variance,
            ty: Some(self.parse_type()?),
        })
    }
}
