use crate::hashing::to_canonical_json;
use serde_json::Value;

pub fn hash_str(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

pub fn hash_value(v: &Value) -> String {
    hash_str(&to_canonical_json(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_does_not_change_the_hash() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(hash_value(&a), hash_value(&b));
    }
}
