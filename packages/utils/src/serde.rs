use std::{fmt, marker::PhantomData, str::FromStr};

use serde::{de, Deserialize, Deserializer};

/// Accepts either a sequence of strings or a single comma-separated string
/// env vars can only carry the latter, config files usually carry the former
pub fn deserialize_vec_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_vec_parsed(deserializer)
}

/// Like `deserialize_vec_string`, but each entry is parsed into `T`
/// e.g. `"1, 2,3"` or `[1, 2, 3]` for a `Vec<u32>`
pub fn deserialize_vec_parsed<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: fmt::Display,
{
    struct CommaSeparated<T>(PhantomData<T>);

    impl<'de, T> de::Visitor<'de> for CommaSeparated<T>
    where
        T: FromStr + Deserialize<'de>,
        T::Err: fmt::Display,
    {
        type Value = Vec<T>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a comma-separated string or a sequence")
        }

        fn visit_str<E>(self, value: &str) -> Result<Vec<T>, E>
        where
            E: de::Error,
        {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<T>().map_err(E::custom))
                .collect()
        }

        // a single number from an env var, e.g. OPERATOR_TASK_INDEX_FILTER=5
        fn visit_u64<E>(self, value: u64) -> Result<Vec<T>, E>
        where
            E: de::Error,
        {
            self.visit_str(&value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Vec<T>, E>
        where
            E: de::Error,
        {
            self.visit_str(&value.to_string())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Vec<T>, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(elem) = seq.next_element()? {
                vec.push(elem);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(CommaSeparated(PhantomData))
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Deserialize)]
    struct Levels {
        #[serde(deserialize_with = "deserialize_vec_string")]
        levels: Vec<String>,
    }

    #[derive(Deserialize)]
    struct Indices {
        #[serde(deserialize_with = "deserialize_vec_parsed")]
        indices: Vec<u32>,
    }

    #[test]
    fn strings_from_comma_list_or_array() {
        let from_str: Levels = serde_json::from_str(r#"{"levels": "info, operator=debug"}"#).unwrap();
        assert_eq!(from_str.levels, vec!["info", "operator=debug"]);

        let from_seq: Levels = serde_json::from_str(r#"{"levels": ["warn"]}"#).unwrap();
        assert_eq!(from_seq.levels, vec!["warn"]);
    }

    #[test]
    fn numbers_from_comma_list_array_or_scalar() {
        let from_str: Indices = serde_json::from_str(r#"{"indices": "1, 2,,3"}"#).unwrap();
        assert_eq!(from_str.indices, vec![1, 2, 3]);

        let from_seq: Indices = serde_json::from_str(r#"{"indices": [4, 5]}"#).unwrap();
        assert_eq!(from_seq.indices, vec![4, 5]);

        let from_scalar: Indices = serde_json::from_str(r#"{"indices": 7}"#).unwrap();
        assert_eq!(from_scalar.indices, vec![7]);

        assert!(serde_json::from_str::<Indices>(r#"{"indices": "one"}"#).is_err());
    }
}
