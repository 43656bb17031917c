//! In-memory interface-description model and its persistence.
//!
//! The validation engine only ever reads a [`SpecificationModel`]; documents are parsed once on
//! upload and the resulting model is stored next to the raw text.

use serde::{Deserialize, Serialize};

use crate::domain::HttpMethod;

pub mod parse;
pub mod store;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecificationModel {
    /// Path entries in declaration order; resolution depends on this order.
    pub paths: Vec<PathEntry>,
}

impl SpecificationModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, entry: PathEntry) -> Self {
        self.paths.push(entry);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathEntry {
    pub pattern: String,
    pub operations: PathOperations,
}

impl PathEntry {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            operations: PathOperations::default(),
        }
    }

    pub fn with_operation(mut self, method: HttpMethod, operation: Operation) -> Self {
        self.operations.set(method, operation);
        self
    }
}

/// One optional slot per method, so lookup is a total match over [`HttpMethod`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathOperations {
    pub get: Option<Operation>,
    pub post: Option<Operation>,
    pub put: Option<Operation>,
    pub delete: Option<Operation>,
    pub patch: Option<Operation>,
    pub head: Option<Operation>,
    pub options: Option<Operation>,
}

impl PathOperations {
    fn slot_mut(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Head => &mut self.head,
            HttpMethod::Options => &mut self.options,
        }
    }

    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
        }
    }

    pub fn set(&mut self, method: HttpMethod, operation: Operation) {
        *self.slot_mut(method) = Some(operation);
    }

    /// Declared methods in fixed precedence order (GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS).
    pub fn allowed_methods(&self) -> Vec<HttpMethod> {
        HttpMethod::ALL
            .into_iter()
            .filter(|m| self.operation(*m).is_some())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Operation {
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
}

impl Operation {
    pub fn with_parameter(mut self, name: impl Into<String>, required: bool) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            required,
        });
        self
    }

    pub fn with_request_body(mut self, body: RequestBody) -> Self {
        self.request_body = Some(body);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub required: bool,
}

/// A declared request body. `schema` is `None` when the body has no JSON schema attached.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestBody {
    pub schema: Option<BodySchema>,
}

impl RequestBody {
    pub fn with_schema(schema: BodySchema) -> Self {
        Self {
            schema: Some(schema),
        }
    }
}

/// Top-level shape only: required field names and the declared JSON type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BodySchema {
    pub required: Vec<String>,
    pub schema_type: Option<String>,
}

impl BodySchema {
    pub fn requiring<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: fields.into_iter().map(Into::into).collect(),
            schema_type: None,
        }
    }

    pub fn with_type(mut self, schema_type: impl Into<String>) -> Self {
        self.schema_type = Some(schema_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_methods_follow_fixed_precedence() {
        let entry = PathEntry::new("/items")
            .with_operation(HttpMethod::Options, Operation::default())
            .with_operation(HttpMethod::Delete, Operation::default())
            .with_operation(HttpMethod::Get, Operation::default());
        assert_eq!(
            entry.operations.allowed_methods(),
            vec![HttpMethod::Get, HttpMethod::Delete, HttpMethod::Options]
        );
        assert!(entry.operations.operation(HttpMethod::Post).is_none());
    }
}
