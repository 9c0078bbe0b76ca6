//! Property-based tests for content-addressed cache keys

use conduit::cache::cache_key;
use proptest::prelude::*;
use serde_json::{Map, Value};

fn params() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-z_]{1,12}", any::<i64>()), 0..8)
}

fn to_map(pairs: &[(String, i64)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(*v)))
        .collect()
}

proptest! {
    /// Keys never depend on the order parameters were supplied in.
    #[test]
    fn key_is_independent_of_parameter_order(prompt in ".*", model in "[a-z0-9.-]{1,20}", pairs in params()) {
        let forward = to_map(&pairs);
        let mut reversed_pairs = pairs.clone();
        reversed_pairs.reverse();
        let reversed = to_map(&reversed_pairs);
        prop_assume!(forward == reversed);
        prop_assert_eq!(cache_key(&prompt, &model, &forward), cache_key(&prompt, &model, &reversed));
    }

    /// Keys are 64 lowercase hex characters, usable as file names.
    #[test]
    fn key_is_a_hex_digest(prompt in ".*", model in ".*", pairs in params()) {
        let key = cache_key(&prompt, &model, &to_map(&pairs));
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    /// Changing the prompt or the model changes the key.
    #[test]
    fn key_separates_prompt_and_model(prompt in ".{0,40}", other in ".{0,40}", model in "[a-z]{1,10}") {
        prop_assume!(prompt != other);
        let params = Map::new();
        prop_assert_ne!(cache_key(&prompt, &model, &params), cache_key(&other, &model, &params));
        prop_assert_ne!(
            cache_key(&prompt, &model, &params),
            cache_key(&prompt, &format!("{}-x", model), &params)
        );
    }
}
