//! Placeholder substitution over arbitrary strings.

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use solution_deployer::templating::{ResolvePolicy, SubstitutionDictionary, contains_placeholder};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: text without braces comes back unchanged under any policy.
    #[test]
    fn property_plain_text_unchanged(text in "[^{}]*") {
        let dictionary = SubstitutionDictionary::new();
        let resolved = dictionary.resolve_str(&text, &ResolvePolicy::strict()).unwrap();
        prop_assert_eq!(resolved, Value::String(text));
    }

    /// PROPERTY: a whole-string placeholder keeps the value's JSON type.
    #[test]
    fn property_whole_token_keeps_type(number in any::<i64>(), flag in any::<bool>()) {
        let mut seed = Map::new();
        seed.insert("n".into(), json!(number));
        seed.insert("f".into(), json!(flag));
        let dictionary = SubstitutionDictionary::from_seed(seed);
        let policy = ResolvePolicy::strict();

        prop_assert_eq!(dictionary.resolve_str("{{n}}", &policy).unwrap(), json!(number));
        prop_assert_eq!(dictionary.resolve_str("{{f}}", &policy).unwrap(), json!(flag));
        prop_assert_eq!(
            dictionary.resolve_str("n={{n}}", &policy).unwrap(),
            json!(format!("n={number}"))
        );
    }

    /// PROPERTY: lenient resolution leaves unknown tokens exactly as written.
    #[test]
    fn property_lenient_keeps_unknown(prefix in "[a-z ]{0,8}", root in "[a-z]{1,8}") {
        let text = format!("{prefix}{{{{{root}.itemId}}}}");
        let dictionary = SubstitutionDictionary::new();
        let resolved = dictionary.resolve_str(&text, &ResolvePolicy::lenient()).unwrap();
        prop_assert!(contains_placeholder(resolved.as_str().unwrap()));
        prop_assert_eq!(resolved, Value::String(text));
    }
}
