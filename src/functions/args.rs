//! The function dispatcher's tiny argument grammar (spec §4.7): `--where k=v
//! [and k=v ...]`, `--limit N`, `--fields a,b,c`, plus bare positional tokens
//! (record ids).

use serde_json::Value;

#[derive(Debug, Default, Clone)]
pub struct ParsedArgs {
    pub positional: Vec<String>,
    pub where_clause: Option<Value>,
    /// The raw `k=v` tokens behind `where_clause`, kept around for rendering
    /// `!count`'s "(where ...)" suffix without re-serializing JSON.
    pub where_tokens: Vec<String>,
    pub limit: Option<u32>,
    pub fields: Option<Vec<String>>,
}

/// Coerce a bare value token to bool/number/string, per spec §4.7: values
/// auto-coerce to boolean/number, else string with surrounding quotes stripped.
fn coerce_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    let trimmed = raw.trim_matches('"').trim_matches('\'');
    Value::String(trimmed.to_string())
}

impl ParsedArgs {
    pub fn parse(args: &[&str]) -> Self {
        let mut parsed = ParsedArgs::default();
        let mut i = 0;
        while i < args.len() {
            match args[i] {
                "--where" => {
                    i += 1;
                    let mut map = serde_json::Map::new();
                    while i < args.len() && !args[i].starts_with("--") {
                        let tok = args[i];
                        if !tok.eq_ignore_ascii_case("and") {
                            if let Some((k, v)) = tok.split_once('=') {
                                map.insert(k.to_string(), coerce_value(v));
                                parsed.where_tokens.push(tok.to_string());
                            }
                        }
                        i += 1;
                    }
                    if !map.is_empty() {
                        parsed.where_clause = Some(Value::Object(map));
                    }
                }
                "--limit" => {
                    i += 1;
                    if i < args.len() {
                        parsed.limit = args[i].parse().ok();
                        i += 1;
                    }
                }
                "--fields" => {
                    i += 1;
                    if i < args.len() {
                        parsed.fields = Some(args[i].split(',').map(str::to_string).collect());
                        i += 1;
                    }
                }
                other => {
                    parsed.positional.push(other.to_string());
                    i += 1;
                }
            }
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_where_and_limit() {
        let parsed = ParsedArgs::parse(&["--where", "status=open", "--limit", "5"]);
        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.where_tokens, vec!["status=open".to_string()]);
        assert_eq!(
            parsed.where_clause,
            Some(serde_json::json!({ "status": "open" }))
        );
    }

    #[test]
    fn parses_multiple_where_conditions() {
        let parsed = ParsedArgs::parse(&["--where", "status=open", "and", "owner=alice"]);
        assert_eq!(
            parsed.where_clause,
            Some(serde_json::json!({ "status": "open", "owner": "alice" }))
        );
        assert_eq!(
            parsed.where_tokens,
            vec!["status=open".to_string(), "owner=alice".to_string()]
        );
    }

    #[test]
    fn coerces_value_types() {
        assert_eq!(coerce_value("true"), Value::Bool(true));
        assert_eq!(coerce_value("42"), Value::from(42i64));
        assert_eq!(coerce_value("3.5"), Value::from(3.5));
        assert_eq!(coerce_value("\"quoted\""), Value::String("quoted".into()));
        assert_eq!(coerce_value("plain"), Value::String("plain".into()));
    }

    #[test]
    fn parses_fields_and_positional() {
        let parsed = ParsedArgs::parse(&["42", "--fields", "a,b,c"]);
        assert_eq!(parsed.positional, vec!["42".to_string()]);
        assert_eq!(parsed.fields, Some(vec!["a".into(), "b".into(), "c".into()]));
    }
}
