//! Translates `GET /scans` query parameters into an index search request.
//! Grounded on `query/elastic_handler.go`'s `buildESQuery`.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::queryparse::{parse_numeric_range, parse_shodan_like_query, PortRange};

const ALLOWED_SORT_FIELDS: &[&str] = &["timestamp", "ip", "port", "protocol", "http.headers.server.keyword"];
const DEFAULT_AGGS: &[&str] = &["top_ports", "top_http_servers", "by_country", "top_orgs"];
const SIMPLE_QUERY_FIELDS: &[&str] = &["banner^3", "http.body_preview", "raw_tcp", "ssh.banner^2"];

/// Parsed-and-validated `GET /scans` parameters. Construction rejects any
/// parameter outside the closed set (except `http_header.*`).
#[derive(Debug, Default)]
pub struct QueryParams {
    pub size: u32,
    pub from: u32,
    pub sort_field: String,
    pub sort_order: String,
    pub ip: Option<String>,
    pub port: Option<String>,
    pub scan_id: Option<String>,
    pub protocol: Option<String>,
    pub service: Option<String>,
    pub country: Option<String>,
    pub banner: Option<String>,
    pub banner_type: Option<String>,
    pub q: Option<String>,
    pub http_headers: HashMap<String, Vec<String>>,
    pub aggs: Option<String>,
    pub fields: Option<Vec<String>>,
}

/// Parses `raw_pairs` (as decoded from the query string, duplicates
/// preserved) into a [`QueryParams`]. Returns `Err(reason)` on the first
/// unrecognized parameter, matching the "unknown query param: X" 400 body.
pub fn parse_query_params(raw_pairs: &[(String, String)]) -> Result<QueryParams, String> {
    let mut params = QueryParams {
        size: 20,
        from: 0,
        sort_field: "timestamp".to_string(),
        sort_order: "desc".to_string(),
        ..Default::default()
    };

    for (key, value) in raw_pairs {
        match key.as_str() {
            "size" => {
                let parsed: u32 = value.parse().map_err(|_| "invalid size".to_string())?;
                params.size = parsed.clamp(1, 1000);
            }
            "from" => {
                params.from = value.parse().map_err(|_| "invalid from".to_string())?;
            }
            "sort" => {
                let (field, order) = if let Some(rest) = value.strip_prefix('-') {
                    (rest.to_string(), "desc".to_string())
                } else if let Some((f, o)) = value.split_once(':') {
                    (f.to_string(), o.to_string())
                } else {
                    (value.clone(), "asc".to_string())
                };
                if !ALLOWED_SORT_FIELDS.contains(&field.as_str()) {
                    return Err(format!("unsupported sort field: {field}"));
                }
                params.sort_field = field;
                params.sort_order = order;
            }
            "ip" => params.ip = Some(value.clone()),
            "port" => params.port = Some(value.clone()),
            "scan_id" => params.scan_id = Some(value.clone()),
            "protocol" => params.protocol = Some(value.clone()),
            "service" => params.service = Some(value.clone()),
            "country" => params.country = Some(value.clone()),
            "banner" => params.banner = Some(value.clone()),
            "banner_type" => params.banner_type = Some(value.clone()),
            "q" => params.q = Some(value.clone()),
            "aggs" => params.aggs = Some(value.clone()),
            "fields" => params.fields = Some(value.split(',').map(str::trim).map(String::from).collect()),
            other if other.starts_with("http_header.") => {
                let name = other.trim_start_matches("http_header.").to_string();
                params.http_headers.entry(name).or_default().push(value.clone());
            }
            other => return Err(format!("unknown query param: {other}")),
        }
    }

    Ok(params)
}

/// Builds the full ES-style search request body: `query`, `sort`, `size`,
/// `from`, `highlight`, `aggs`, and `_source.includes`.
pub fn build_search_request(params: &QueryParams) -> Value {
    let mut filter = Vec::new();
    let mut must = Vec::new();
    let mut must_not = Vec::new();

    if let Some(ip) = &params.ip {
        filter.push(json!({ "term": { "ip.keyword": ip } }));
    }
    if let Some(port) = &params.port {
        if let Ok(port) = port.parse::<u16>() {
            filter.push(json!({ "term": { "port": port } }));
        }
    }
    if let Some(scan_id) = &params.scan_id {
        filter.push(json!({ "term": { "scan_id.keyword": scan_id } }));
    }
    if let Some(protocol) = &params.protocol {
        must.push(json!({ "match": { "protocol": protocol } }));
    }
    if let Some(service) = &params.service {
        must.push(json!({ "match": { "service": service } }));
    }
    if let Some(country) = &params.country {
        must.push(json!({ "match": { "meta.geo.country": country } }));
    }

    if let Some(banner) = &params.banner {
        let clause = match params.banner_type.as_deref() {
            Some("phrase") => json!({ "match_phrase": { "banner": banner } }),
            Some("prefix") => json!({ "match_phrase_prefix": { "banner": banner } }),
            Some("wildcard") => json!({ "wildcard": { "banner": format!("*{banner}*") } }),
            _ => json!({ "match": { "banner": { "query": banner, "operator": "and" } } }),
        };
        must.push(clause);
    }

    if let Some(q) = &params.q {
        apply_shodan_dsl(q, &mut filter, &mut must, &mut must_not);
    }

    for (name, values) in &params.http_headers {
        let field = format!("http.headers.{}", name.to_lowercase().replace('-', "_"));
        let clauses: Vec<Value> = values
            .iter()
            .map(|v| {
                if v.contains('*') {
                    single_key_object("wildcard", &field, json!(v))
                } else {
                    single_key_object("term", &format!("{field}.keyword"), json!(v))
                }
            })
            .collect();
        if clauses.len() == 1 {
            must.push(clauses.into_iter().next().unwrap());
        } else {
            must.push(json!({ "bool": { "should": clauses, "minimum_should_match": 1 } }));
        }
    }

    let mut bool_query = serde_json::Map::new();
    if !filter.is_empty() {
        bool_query.insert("filter".to_string(), json!(filter));
    }
    if !must.is_empty() {
        bool_query.insert("must".to_string(), json!(must));
    }
    if !must_not.is_empty() {
        bool_query.insert("must_not".to_string(), json!(must_not));
    }
    let query = if bool_query.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": bool_query })
    };

    let sort_clause = single_key_object_value(&params.sort_field, json!({ "order": params.sort_order }));
    let mut body = json!({
        "query": query,
        "sort": [sort_clause],
        "size": params.size,
        "from": params.from,
        "highlight": { "fields": { "banner": {} } },
    });

    if let Some(aggs) = build_aggs(params.aggs.as_deref()) {
        body["aggs"] = aggs;
    }
    if let Some(fields) = &params.fields {
        body["_source"] = json!({ "includes": fields });
    }

    body
}

fn apply_shodan_dsl(q: &str, filter: &mut Vec<Value>, must: &mut Vec<Value>, must_not: &mut Vec<Value>) {
    let parsed = parse_shodan_like_query(q);

    for (field, values) in &parsed.field_terms {
        push_field_clauses(field, values, filter, must);
    }
    for (field, values) in &parsed.not_field_terms {
        if field == "_free" {
            for term in values {
                must_not.push(json!({ "simple_query_string": { "query": term, "fields": SIMPLE_QUERY_FIELDS } }));
            }
        } else {
            let mut negated_filter = Vec::new();
            let mut negated_must = Vec::new();
            push_field_clauses(field, values, &mut negated_filter, &mut negated_must);
            must_not.extend(negated_filter);
            must_not.extend(negated_must);
        }
    }
    if !parsed.free_terms.is_empty() {
        let query = parsed.free_terms.join(" ");
        must.push(json!({
            "simple_query_string": {
                "query": query,
                "fields": SIMPLE_QUERY_FIELDS,
                "default_operator": "AND",
            }
        }));
    }
}

fn push_field_clauses(field: &str, values: &[String], filter: &mut Vec<Value>, must: &mut Vec<Value>) {
    match field {
        "ip" => {
            for v in values {
                filter.push(json!({ "term": { "ip.keyword": v } }));
            }
        }
        "country" => {
            for v in values {
                filter.push(json!({ "term": { "meta.geo.country.keyword": v } }));
            }
        }
        "port" => {
            for v in values {
                match parse_numeric_range(v) {
                    Some(PortRange::Single(p)) => filter.push(json!({ "term": { "port": p } })),
                    Some(PortRange::Range(lo, hi)) => filter.push(json!({ "range": { "port": { "gte": lo, "lte": hi } } })),
                    None => {}
                }
            }
        }
        other => {
            for v in values {
                must.push(single_key_object("term", &format!("{other}.keyword"), json!(v)));
            }
        }
    }
}

/// `json!` requires a literal key; this builds `{ outer: { field: value } }`
/// for the many clauses here whose field name is computed at runtime.
fn single_key_object(outer: &str, field: &str, value: Value) -> Value {
    let mut inner = serde_json::Map::new();
    inner.insert(field.to_string(), value);
    let mut object = serde_json::Map::new();
    object.insert(outer.to_string(), Value::Object(inner));
    Value::Object(object)
}

fn single_key_object_value(field: &str, value: Value) -> Value {
    let mut object = serde_json::Map::new();
    object.insert(field.to_string(), value);
    Value::Object(object)
}

fn build_aggs(spec: Option<&str>) -> Option<Value> {
    let names: Vec<&str> = match spec {
        None | Some("") => DEFAULT_AGGS.to_vec(),
        Some("none") => return None,
        Some(list) => list.split(',').map(str::trim).collect(),
    };

    let mut aggs = serde_json::Map::new();
    for name in names {
        let agg = match name {
            "top_ports" => json!({ "terms": { "field": "port", "size": 10 } }),
            "top_http_servers" => json!({ "terms": { "field": "http.headers.server.keyword", "size": 10 } }),
            "by_country" => json!({ "terms": { "field": "meta.geo.country.keyword", "size": 10 } }),
            "top_orgs" => json!({ "terms": { "field": "meta.asn.org.keyword", "size": 10 } }),
            _ => continue,
        };
        aggs.insert(name.to_string(), agg);
    }
    Some(json!(aggs))
}
