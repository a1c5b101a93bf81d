//! Version merging.
//!
//! A read may return several concurrent versions of a record. The logical
//! value is their union. Union is associative, commutative and idempotent,
//! so the order and multiplicity of versions never matter.

use bytes::Bytes;
use kgcheck_types::{CodecError, ItemSet};

/// Merges versions into their union. No versions merge to the empty set.
pub fn merge_versions<'a, I>(versions: I) -> ItemSet
where
    I: IntoIterator<Item = &'a ItemSet>,
{
    versions
        .into_iter()
        .fold(ItemSet::new(), |mut acc, version| {
            acc.extend_from(version);
            acc
        })
}

/// Decodes raw payloads and merges them.
pub fn decode_and_merge(payloads: &[Bytes]) -> Result<ItemSet, CodecError> {
    let mut merged = ItemSet::new();
    for payload in payloads {
        merged.extend_from(&ItemSet::decode(payload)?);
    }
    Ok(merged)
}

/// Returns true if every item of `required` is visible in `view`.
pub fn reflects(view: &ItemSet, required: &ItemSet) -> bool {
    required.is_subset(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> ItemSet {
        items.iter().copied().collect()
    }

    #[test]
    fn test_merge_nothing_is_empty() {
        assert!(merge_versions(std::iter::empty()).is_empty());
        assert!(decode_and_merge(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_merge_single_version_is_identity() {
        let v = set(&["a", "b"]);
        assert_eq!(merge_versions([&v]), v);
    }

    #[test]
    fn test_decode_and_merge_divergent_versions() {
        let payloads = [set(&["a"]).encode(), set(&["b"]).encode()];
        assert_eq!(decode_and_merge(&payloads).unwrap(), set(&["a", "b"]));
    }

    #[test]
    fn test_decode_and_merge_rejects_garbage() {
        let payloads = [set(&["a"]).encode(), Bytes::from_static(b"{oops")];
        assert!(decode_and_merge(&payloads).is_err());
    }

    #[test]
    fn test_reflects() {
        let view = set(&["a", "b"]);
        assert!(reflects(&view, &set(&["a"])));
        assert!(reflects(&view, &ItemSet::new()));
        assert!(!reflects(&view, &set(&["c"])));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn item_sets() -> impl Strategy<Value = Vec<ItemSet>> {
            prop::collection::vec(
                prop::collection::btree_set("[a-e][0-9]", 0..6)
                    .prop_map(|items| items.into_iter().collect::<ItemSet>()),
                0..6,
            )
        }

        proptest! {
            #[test]
            fn merge_is_exact_union(versions in item_sets()) {
                let merged = merge_versions(&versions);
                for v in &versions {
                    prop_assert!(v.is_subset(&merged));
                }
                for item in &merged {
                    prop_assert!(versions.iter().any(|v| v.contains(item)));
                }
            }

            #[test]
            fn merge_ignores_order(versions in item_sets()) {
                let mut reversed = versions.clone();
                reversed.reverse();
                prop_assert_eq!(merge_versions(&versions), merge_versions(&reversed));
            }

            #[test]
            fn merge_ignores_duplicates(versions in item_sets()) {
                let doubled: Vec<ItemSet> = versions.iter().chain(versions.iter()).cloned().collect();
                prop_assert_eq!(merge_versions(&versions), merge_versions(&doubled));
            }

            #[test]
            fn merge_is_associative(a in item_sets(), b in item_sets()) {
                let left = merge_versions([&merge_versions(&a), &merge_versions(&b)]);
                let all: Vec<ItemSet> = a.into_iter().chain(b).collect();
                prop_assert_eq!(left, merge_versions(&all));
            }
        }
    }
}
