use serde_json::Value;

pub type JsonMap = serde_json::Map<String, Value>;

/// 取第一个非空字段并转成字符串；服务端有时给数字、有时给字符串。
pub fn pick_string(map: &JsonMap, keys: &[&str]) -> Option<String> {
    for key in keys {
        let Some(val) = map.get(*key) else {
            continue;
        };
        if let Some(s) = val.as_str() {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        } else if let Some(n) = val.as_i64() {
            return Some(n.to_string());
        } else if let Some(n) = val.as_u64() {
            return Some(n.to_string());
        } else if let Some(n) = val.as_f64()
            && n.is_finite()
        {
            return Some(n.to_string());
        }
    }
    None
}

/// 非空数组才返回；其它形态（对象、null、空数组）一律视为没有数据。
pub fn non_empty_array(value: &Value) -> Option<&Vec<Value>> {
    value.as_array().filter(|arr| !arr.is_empty())
}
