use serde_json::{Map, Value};

use super::{BodySchema, Operation, Parameter, PathEntry, RequestBody, SpecificationModel};
use crate::domain::HttpMethod;
use crate::error::AppError;

/// Bounds `$ref` chains so a self-referencing document cannot loop forever.
const MAX_REF_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpecification {
    pub model: SpecificationModel,
    /// `info.version`, or `"unknown"` when the document does not declare one.
    pub version: String,
    pub openapi_version: String,
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new("SPEC_INVALID", message)
}

fn yaml_to_json(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                // Response codes and similar keys are often bare integers in YAML.
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => serde_yaml::to_string(&other)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default(),
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn decode_document(raw: &str) -> Result<Value, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::new(
            "SPEC_EMPTY",
            "Specification content cannot be empty",
        ));
    }
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).map_err(AppError::wrap(
            "SPEC_PARSE_FAILED",
            "Failed to parse JSON specification",
        ));
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(trimmed).map_err(AppError::wrap(
        "SPEC_PARSE_FAILED",
        "Failed to parse YAML specification",
    ))?;
    Ok(yaml_to_json(yaml))
}

/// Follows local `$ref` pointers (`#/...`) until a concrete node is reached.
fn resolve<'a>(root: &'a Value, node: &'a Value) -> Result<&'a Value, AppError> {
    let mut current = node;
    for _ in 0..MAX_REF_DEPTH {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            return Ok(current);
        };
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| invalid("Only local $ref pointers are supported").with_details(reference))?;
        current = root
            .pointer(pointer)
            .ok_or_else(|| invalid("Unresolvable $ref").with_details(reference))?;
    }
    Err(invalid("$ref chain too deep").with_details(format!("max_depth={MAX_REF_DEPTH}")))
}

fn parse_parameters(root: &Value, op: &Value, at: &str) -> Result<Vec<Parameter>, AppError> {
    let Some(params) = op.get("parameters") else {
        return Ok(Vec::new());
    };
    let params = params
        .as_array()
        .ok_or_else(|| invalid("parameters must be an array").with_details(at.to_string()))?;

    let mut out = Vec::with_capacity(params.len());
    for p in params {
        let p = resolve(root, p)?;
        let name = p
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| invalid("Parameter without a name").with_details(at.to_string()))?;
        out.push(Parameter {
            name: name.to_string(),
            required: p.get("required").and_then(Value::as_bool).unwrap_or(false),
        });
    }
    Ok(out)
}

fn parse_body_schema(root: &Value, schema: &Value) -> Result<BodySchema, AppError> {
    let schema = resolve(root, schema)?;
    let required = match schema.get("required") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(_) => return Err(invalid("schema.required must be an array of field names")),
    };
    Ok(BodySchema {
        required,
        schema_type: schema
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn parse_request_body(root: &Value, op: &Value) -> Result<Option<RequestBody>, AppError> {
    let Some(body) = op.get("requestBody") else {
        return Ok(None);
    };
    let body = resolve(root, body)?;
    let schema = match body
        .get("content")
        .and_then(|c| c.get("application/json"))
        .and_then(|m| m.get("schema"))
    {
        Some(schema) => Some(parse_body_schema(root, schema)?),
        None => None,
    };
    Ok(Some(RequestBody { schema }))
}

fn parse_operation(root: &Value, op: &Value, at: &str) -> Result<Operation, AppError> {
    if !op.is_object() {
        return Err(invalid("Operation must be an object").with_details(at.to_string()));
    }
    Ok(Operation {
        parameters: parse_parameters(root, op, at)?,
        request_body: parse_request_body(root, op)?,
    })
}

/// Parse a JSON or YAML interface-description document into a [`SpecificationModel`].
///
/// Path declaration order is preserved; for each path the seven HTTP methods are read from
/// their lower-case keys. Anything else in the document (responses, servers, ...) is ignored.
pub fn parse_specification(raw: &str) -> Result<ParsedSpecification, AppError> {
    let root = decode_document(raw)?;
    if !root.is_object() {
        return Err(invalid("Specification document must be an object"));
    }

    let openapi_version = root
        .get("openapi")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("Missing `openapi` version field"))?
        .to_string();

    let version = root
        .get("info")
        .and_then(|i| i.get("version"))
        .and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "unknown".to_string());

    let paths = root
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("Missing `paths` object"))?;

    let mut model = SpecificationModel::new();
    for (pattern, item) in paths {
        if !pattern.starts_with('/') {
            return Err(invalid("Path patterns must start with '/'").with_details(pattern.clone()));
        }
        let item = resolve(&root, item)?;
        if !item.is_object() {
            return Err(invalid("Path item must be an object").with_details(pattern.clone()));
        }

        let mut entry = PathEntry::new(pattern.clone());
        for method in HttpMethod::ALL {
            if let Some(op) = item.get(method.document_key()) {
                let at = format!("{} {}", method.as_str(), pattern);
                entry.operations.set(method, parse_operation(&root, op, &at)?);
            }
        }
        model.paths.push(entry);
    }

    Ok(ParsedSpecification {
        model,
        version,
        openapi_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PETS_YAML: &str = r#"
openapi: 3.0.3
info:
  title: Pets
  version: 2.1.0
paths:
  /pets/{id}:
    get:
      parameters:
        - $ref: '#/components/parameters/PetId'
      responses:
        200:
          description: ok
  /pets:
    post:
      requestBody:
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/NewPet'
    get: {}
components:
  parameters:
    PetId:
      name: id
      in: path
      required: true
  schemas:
    NewPet:
      type: object
      required: [name, species]
"#;

    #[test]
    fn yaml_documents_preserve_path_order_and_resolve_refs() {
        let parsed = parse_specification(PETS_YAML).expect("parse");
        assert_eq!(parsed.version, "2.1.0");
        assert_eq!(parsed.openapi_version, "3.0.3");

        let patterns: Vec<&str> = parsed.model.paths.iter().map(|p| p.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["/pets/{id}", "/pets"]);

        let get = parsed.model.paths[0]
            .operations
            .operation(HttpMethod::Get)
            .expect("get");
        assert_eq!(
            get.parameters,
            vec![Parameter {
                name: "id".to_string(),
                required: true
            }]
        );

        let post = parsed.model.paths[1]
            .operations
            .operation(HttpMethod::Post)
            .expect("post");
        assert_eq!(
            post.request_body,
            Some(RequestBody::with_schema(
                BodySchema::requiring(["name", "species"]).with_type("object")
            ))
        );
    }

    #[test]
    fn json_body_without_schema_is_still_a_declared_body() {
        let doc = r#"{"openapi":"3.0.0","paths":{"/upload":{"put":{"requestBody":{"content":{"text/plain":{}}}}}}}"#;
        let parsed = parse_specification(doc).expect("parse");
        assert_eq!(parsed.version, "unknown");
        let put = parsed.model.paths[0]
            .operations
            .operation(HttpMethod::Put)
            .expect("put");
        assert_eq!(put.request_body, Some(RequestBody { schema: None }));
    }

    #[test]
    fn rejects_documents_that_are_not_interface_descriptions() {
        assert_eq!(parse_specification("  ").unwrap_err().code, "SPEC_EMPTY");
        assert_eq!(
            parse_specification("{ not json").unwrap_err().code,
            "SPEC_PARSE_FAILED"
        );
        assert_eq!(
            parse_specification(r#"{"paths":{}}"#).unwrap_err().code,
            "SPEC_INVALID"
        );
        assert_eq!(
            parse_specification(r#"{"openapi":"3.0.0"}"#).unwrap_err().code,
            "SPEC_INVALID"
        );
        assert_eq!(
            parse_specification("- just\n- a list\n").unwrap_err().code,
            "SPEC_INVALID"
        );
    }

    #[test]
    fn unresolvable_and_cyclic_refs_are_invalid() {
        let missing = r##"{"openapi":"3.0.0","paths":{"/a":{"$ref":"#/components/pathItems/A"}}}"##;
        assert_eq!(parse_specification(missing).unwrap_err().code, "SPEC_INVALID");

        let cyclic = r##"{"openapi":"3.0.0","paths":{"/a":{"$ref":"#/x"}},"x":{"$ref":"#/x"}}"##;
        let err = parse_specification(cyclic).unwrap_err();
        assert_eq!(err.code, "SPEC_INVALID");
        assert!(err.message.contains("too deep"));
    }
}
