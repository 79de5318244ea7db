use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Pod-template annotation carrying the config fingerprint.
pub const CONFIG_HASH_ANNOTATION: &str = "checksum/config-files";

/// SHA-256 over `key=value\n` lines in key order, as lowercase hex.
///
/// Values are not escaped: `{"A": "1\nB=2"}` hashes like `{"A": "1", "B": "2"}`.
/// Changing this encoding rolls every managed workload once.
pub fn hash_config(data: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn known_vectors() {
        assert_eq!(
            hash_config(&BTreeMap::new()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_config(&data(&[("A", "1")])),
            "91d6a3d55e9fea7911c537afae6607c77fa8bc0f3a76c375e104ac5a8cfa84db"
        );
        assert_eq!(
            hash_config(&data(&[("B", "two"), ("A", "1")])),
            "28157a931cc9b13330e0af19684af988feab9bc118553beedb136b5452341887"
        );
    }

    #[test]
    fn single_value_change_changes_hash() {
        let a = hash_config(&data(&[("A", "1"), ("B", "two")]));
        let b = hash_config(&data(&[("A", "2"), ("B", "two")]));
        assert_ne!(a, b);
        assert_eq!(
            b,
            "5840863302b5bef6b0851d513453fe486c548f1874cefed6975ab63a9cb3b3eb"
        );
    }

    #[test]
    fn embedded_newline_reads_as_another_entry() {
        assert_eq!(
            hash_config(&data(&[("A", "1\nB=2")])),
            hash_config(&data(&[("A", "1"), ("B", "2")]))
        );
    }

    #[test]
    fn delimiter_separates_key_from_value() {
        assert_ne!(
            hash_config(&data(&[("ab", "c")])),
            hash_config(&data(&[("a", "bc")]))
        );
    }
}
