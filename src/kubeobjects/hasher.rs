//! # Hashing
//!
//! Deterministic 32-bit FNV-1 hashes over JSON serializations, rendered as
//! decimal strings. Used for the template hash on owned objects and for the
//! configuration hash on pod templates.

use kube::{Resource, ResourceExt};
use serde::Serialize;

use crate::constants::ANNOTATION_TEMPLATE_HASH;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1 (multiply, then xor)
pub fn fnv32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV_PRIME) ^ u32::from(*byte)
    })
}

/// Hash the JSON form of `value`
pub fn generate_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(fnv32(&bytes).to_string())
}

/// Replace the template-hash annotation with a hash of the object without it
pub fn add_template_hash<K>(obj: &mut K) -> Result<String, serde_json::Error>
where
    K: Resource + Serialize,
{
    obj.annotations_mut().remove(ANNOTATION_TEMPLATE_HASH);
    let hash = generate_hash(obj)?;
    obj.annotations_mut()
        .insert(ANNOTATION_TEMPLATE_HASH.to_string(), hash.clone());
    Ok(hash)
}

pub fn template_hash<K: Resource>(obj: &K) -> Option<&str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(ANNOTATION_TEMPLATE_HASH))
        .map(String::as_str)
}

/// Equality by template-hash annotation. Objects without one never compare equal.
pub fn template_hashes_equal<K: Resource>(current: &K, desired: &K) -> bool {
    match (template_hash(current), template_hash(desired)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    #[test]
    fn test_fnv32_known_vectors() {
        assert_eq!(fnv32(b""), 0x811c_9dc5);
        assert_eq!(fnv32(b"a"), 0x050c_5d7e);
        assert_eq!(fnv32(b"foobar"), 0x31f0_b262);
    }

    #[test]
    fn test_generate_hash_is_decimal_and_stable() {
        let value = BTreeMap::from([("b", 2), ("a", 1)]);
        let first = generate_hash(&value).unwrap();
        let second = generate_hash(&value).unwrap();
        assert_eq!(first, second);
        assert!(first.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_add_template_hash_ignores_previous_hash() {
        let mut cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("cm".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
            ..ConfigMap::default()
        };
        let first = add_template_hash(&mut cm).unwrap();
        let second = add_template_hash(&mut cm).unwrap();
        assert_eq!(first, second);
        assert_eq!(template_hash(&cm), Some(first.as_str()));
    }

    #[test]
    fn test_template_hashes_equal_requires_both() {
        let mut a = ConfigMap::default();
        let b = ConfigMap::default();
        assert!(!template_hashes_equal(&a, &b));
        add_template_hash(&mut a).unwrap();
        let mut c = a.clone();
        assert!(template_hashes_equal(&a, &c));
        c.data = Some(BTreeMap::from([("x".to_string(), "y".to_string())]));
        add_template_hash(&mut c).unwrap();
        assert!(!template_hashes_equal(&a, &c));
    }
}
