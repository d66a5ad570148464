// Action table
// Each row pairs the parameters an action needs with the call it makes

use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::http_client::UpstreamCall;

pub type Parameters = Map<String, Value>;

const PAGINATION_KEYS: &[&str] = &["next_cursor", "has_more"];

/// Which part of the upstream body is returned to the caller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultShape {
    /// The `results` array of a list response
    Results,
    /// The whole response object
    Whole,
}

/// A dispatchable action
pub struct ActionSpec {
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub result_key: &'static str,
    pub shape: ResultShape,
    pub build: fn(&Parameters) -> Result<UpstreamCall, ApiError>,
}

impl ActionSpec {
    /// Names of required parameters that are absent, null, or empty strings
    pub fn missing_parameters(&self, params: &Parameters) -> Vec<&'static str> {
        self.required
            .iter()
            .copied()
            .filter(|key| is_missing(params.get(*key)))
            .collect()
    }

    /// Wrap an upstream body in this action's result envelope
    ///
    /// List responses keep their pagination cursor next to the results.
    pub fn shape_result(&self, body: Value) -> Value {
        let mut result = Map::new();

        match (self.shape, body) {
            (ResultShape::Results, Value::Object(mut obj)) => {
                let results = obj.remove("results").unwrap_or(Value::Null);
                result.insert(self.result_key.to_string(), results);
                for key in PAGINATION_KEYS {
                    if let Some(value) = obj.remove(*key) {
                        result.insert(key.to_string(), value);
                    }
                }
            }
            (_, body) => {
                result.insert(self.result_key.to_string(), body);
            }
        }

        Value::Object(result)
    }
}

pub static ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "list_databases",
        required: &[],
        result_key: "databases",
        shape: ResultShape::Results,
        build: list_databases,
    },
    ActionSpec {
        name: "query_database",
        required: &["database_id"],
        result_key: "results",
        shape: ResultShape::Results,
        build: query_database,
    },
    ActionSpec {
        name: "create_page",
        required: &["parent", "properties"],
        result_key: "page",
        shape: ResultShape::Whole,
        build: create_page,
    },
    ActionSpec {
        name: "update_page",
        required: &["page_id", "properties"],
        result_key: "page",
        shape: ResultShape::Whole,
        build: update_page,
    },
    ActionSpec {
        name: "create_blocks",
        required: &["block_id", "children"],
        result_key: "blocks",
        shape: ResultShape::Results,
        build: create_blocks,
    },
    ActionSpec {
        name: "create_database",
        required: &["parent", "title", "properties"],
        result_key: "database",
        shape: ResultShape::Whole,
        build: create_database,
    },
];

/// Find an action by name
pub fn lookup(name: &str) -> Option<&'static ActionSpec> {
    ACTIONS.iter().find(|spec| spec.name == name)
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Identifier parameter that ends up in the URL path
fn id_param<'a>(params: &'a Parameters, key: &str) -> Result<&'a str, ApiError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::InvalidRequest(format!("{} must be a string", key)))
}

/// Copy the listed keys that are present into a new request body
fn pick(params: &Parameters, keys: &[&str]) -> Value {
    let body: Map<String, Value> = keys
        .iter()
        .filter_map(|key| {
            params
                .get(*key)
                .filter(|v| !v.is_null())
                .map(|v| (key.to_string(), v.clone()))
        })
        .collect();
    Value::Object(body)
}

fn list_databases(_params: &Parameters) -> Result<UpstreamCall, ApiError> {
    Ok(UpstreamCall::new(
        Method::POST,
        &["search"],
        json!({ "filter": { "property": "object", "value": "database" } }),
    ))
}

fn query_database(params: &Parameters) -> Result<UpstreamCall, ApiError> {
    let database_id = id_param(params, "database_id")?;
    Ok(UpstreamCall::new(
        Method::POST,
        &["databases", database_id, "query"],
        pick(params, &["filter", "sorts", "start_cursor", "page_size"]),
    ))
}

fn create_page(params: &Parameters) -> Result<UpstreamCall, ApiError> {
    Ok(UpstreamCall::new(
        Method::POST,
        &["pages"],
        pick(params, &["parent", "properties", "children"]),
    ))
}

fn update_page(params: &Parameters) -> Result<UpstreamCall, ApiError> {
    let page_id = id_param(params, "page_id")?;
    Ok(UpstreamCall::new(
        Method::PATCH,
        &["pages", page_id],
        pick(params, &["properties"]),
    ))
}

fn create_blocks(params: &Parameters) -> Result<UpstreamCall, ApiError> {
    let block_id = id_param(params, "block_id")?;
    Ok(UpstreamCall::new(
        Method::PATCH,
        &["blocks", block_id, "children"],
        pick(params, &["children"]),
    ))
}

fn create_database(params: &Parameters) -> Result<UpstreamCall, ApiError> {
    Ok(UpstreamCall::new(
        Method::POST,
        &["databases"],
        pick(params, &["parent", "title", "properties"]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn test_action_names_are_unique() {
        let mut names: Vec<_> = ACTIONS.iter().map(|a| a.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ACTIONS.len());
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("create_page").map(|a| a.name), Some("create_page"));
        assert!(lookup("frobnicate").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_missing_parameters_per_action() {
        let cases: &[(&str, &[&str])] = &[
            ("list_databases", &[]),
            ("query_database", &["database_id"]),
            ("create_page", &["parent", "properties"]),
            ("update_page", &["page_id", "properties"]),
            ("create_blocks", &["block_id", "children"]),
            ("create_database", &["parent", "title", "properties"]),
        ];

        for (name, expected) in cases {
            let spec = lookup(name).unwrap();
            assert_eq!(
                spec.missing_parameters(&Parameters::new()),
                expected.to_vec(),
                "action {}",
                name
            );
        }
    }

    #[test]
    fn test_null_and_empty_count_as_missing() {
        let spec = lookup("update_page").unwrap();
        let p = params(json!({ "page_id": "", "properties": null }));
        assert_eq!(spec.missing_parameters(&p), vec!["page_id", "properties"]);

        let p = params(json!({ "page_id": "p1", "properties": {} }));
        assert!(spec.missing_parameters(&p).is_empty());
    }

    #[test]
    fn test_query_database_passes_filter_and_sorts_verbatim() {
        let filter = json!({ "property": "Status", "select": { "equals": "Done" } });
        let sorts = json!([{ "property": "Due", "direction": "ascending" }]);
        let p = params(json!({
            "database_id": "db1",
            "filter": filter,
            "sorts": sorts,
            "unrelated": true
        }));

        let call = (lookup("query_database").unwrap().build)(&p).unwrap();
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.path, vec!["databases", "db1", "query"]);
        assert_eq!(call.body, json!({ "filter": filter, "sorts": sorts }));
    }

    #[test]
    fn test_query_database_without_filter_sends_empty_body() {
        let p = params(json!({ "database_id": "db1" }));
        let call = (lookup("query_database").unwrap().build)(&p).unwrap();
        assert_eq!(call.body, json!({}));
    }

    #[test]
    fn test_non_string_id_is_rejected() {
        let p = params(json!({ "page_id": 42, "properties": {} }));
        let err = (lookup("update_page").unwrap().build)(&p).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(msg) if msg.contains("page_id")));
    }

    #[test]
    fn test_call_shapes() {
        let p = params(json!({
            "page_id": "p1",
            "block_id": "b1",
            "parent": { "page_id": "root" },
            "title": [{ "text": { "content": "Tasks" } }],
            "properties": { "Name": { "title": {} } },
            "children": [{ "object": "block", "type": "paragraph" }]
        }));

        let call = (lookup("list_databases").unwrap().build)(&p).unwrap();
        assert_eq!(call.path, vec!["search"]);
        assert_eq!(call.body["filter"]["value"], "database");

        let call = (lookup("create_page").unwrap().build)(&p).unwrap();
        assert_eq!((call.method, call.path), (Method::POST, vec!["pages".to_string()]));
        assert_eq!(call.body["parent"], p["parent"]);

        let call = (lookup("update_page").unwrap().build)(&p).unwrap();
        assert_eq!(call.method, Method::PATCH);
        assert_eq!(call.path, vec!["pages", "p1"]);
        assert_eq!(call.body, json!({ "properties": p["properties"] }));

        let call = (lookup("create_blocks").unwrap().build)(&p).unwrap();
        assert_eq!(call.method, Method::PATCH);
        assert_eq!(call.path, vec!["blocks", "b1", "children"]);
        assert_eq!(call.body, json!({ "children": p["children"] }));

        let call = (lookup("create_database").unwrap().build)(&p).unwrap();
        assert_eq!(call.path, vec!["databases"]);
        assert_eq!(
            call.body,
            json!({ "parent": p["parent"], "title": p["title"], "properties": p["properties"] })
        );
    }

    #[test]
    fn test_shape_result() {
        let body = json!({ "results": [{ "id": "1" }] });
        let spec = lookup("query_database").unwrap();
        assert_eq!(spec.shape_result(body.clone()), body);

        let body = json!({
            "object": "list",
            "results": [{ "id": "1" }],
            "next_cursor": "cursor-2",
            "has_more": true
        });
        assert_eq!(
            spec.shape_result(body.clone()),
            json!({ "results": [{ "id": "1" }], "next_cursor": "cursor-2", "has_more": true })
        );

        let spec = lookup("list_databases").unwrap();
        assert_eq!(
            spec.shape_result(json!({ "results": [], "next_cursor": null, "has_more": false })),
            json!({ "databases": [], "next_cursor": null, "has_more": false })
        );

        let spec = lookup("create_page").unwrap();
        assert_eq!(spec.shape_result(body.clone()), json!({ "page": body }));
    }
}
