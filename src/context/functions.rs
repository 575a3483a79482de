use std::collections::BTreeMap;

use crate::model::Value;

/// Built-in functions the evaluator understands. `None` means the function
/// is not modelled or the arguments do not fit.
pub(super) fn call(name: &str, args: Vec<Value>) -> Option<Value> {
    match (name, args.as_slice()) {
        ("lower", [Value::String(s)]) => Some(Value::String(s.to_lowercase())),
        ("upper", [Value::String(s)]) => Some(Value::String(s.to_uppercase())),
        ("trimspace", [Value::String(s)]) => Some(Value::String(s.trim().to_string())),
        ("tostring", [v]) => v.interpolate().map(Value::String),
        ("tonumber", [Value::Number(n)]) => Some(Value::Number(*n)),
        ("tonumber", [Value::String(s)]) => s.trim().parse().ok().map(Value::Number),
        ("tobool", [Value::Bool(b)]) => Some(Value::Bool(*b)),
        ("tobool", [Value::String(s)]) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ("tolist", [Value::List(items)]) => Some(Value::List(items.clone())),
        ("toset", [Value::List(items)]) => {
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.contains(item) {
                    unique.push(item.clone());
                }
            }
            Some(Value::List(unique))
        }
        ("concat", lists) => {
            let mut out = Vec::new();
            for list in lists {
                out.extend_from_slice(list.as_list()?);
            }
            Some(Value::List(out))
        }
        ("merge", maps) => {
            let mut out = BTreeMap::new();
            for map in maps {
                for (k, v) in map.as_map()? {
                    out.insert(k.clone(), v.clone());
                }
            }
            Some(Value::Map(out))
        }
        ("length", [Value::List(items)]) => Some(Value::Number(items.len() as f64)),
        ("length", [Value::Map(map)]) => Some(Value::Number(map.len() as f64)),
        ("length", [Value::String(s)]) => Some(Value::Number(s.chars().count() as f64)),
        ("coalesce", values) => values
            .iter()
            .find(|v| !v.is_null() && v.as_str() != Some(""))
            .cloned(),
        ("join", [Value::String(sep), Value::List(items)]) => {
            let parts: Option<Vec<String>> = items.iter().map(Value::interpolate).collect();
            Some(Value::String(parts?.join(sep)))
        }
        ("lookup", [Value::Map(map), Value::String(key)]) => map.get(key).cloned(),
        ("lookup", [Value::Map(map), Value::String(key), default]) => {
            Some(map.get(key).cloned().unwrap_or_else(|| default.clone()))
        }
        _ => None,
    }
}
