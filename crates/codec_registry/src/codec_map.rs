use crate::error::{CodecError, CodecResult};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Location scheme for decoders compiled into this crate
pub const BUILTIN_SCHEME: &str = "builtin:";

/// One configured mapping from a device-name key to a codec location.
///
/// The key is always tried as an exact match first; `pattern` holds the
/// compiled form used for the regex pass, anchored at the start of the
/// device name. Keys that fail to compile keep `pattern` as `None` and
/// only ever match exactly.
#[derive(Debug)]
pub struct CodecMapEntry {
    pub key: String,
    pub location: String,
    pattern: Option<Regex>,
}

/// Ordered device-name to codec-location map.
///
/// Entries keep the order of the source JSON object, which decides
/// which pattern wins when several match the same device.
#[derive(Debug, Default)]
pub struct CodecMap {
    entries: Vec<CodecMapEntry>,
}

impl CodecMap {
    /// Build a map from configuration.
    ///
    /// `source` is either a literal JSON object or a path to a file
    /// containing one. Values must be strings; other value types are
    /// skipped with a warning rather than failing the whole map.
    pub fn load(source: &str) -> CodecResult<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let text = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            std::fs::read_to_string(trimmed)
                .map_err(|e| CodecError::InvalidMap(format!("failed to read {trimmed}: {e}")))?
        };

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| CodecError::InvalidMap(format!("invalid JSON: {e}")))?;
        let object = match parsed {
            Value::Object(object) => object,
            _ => return Err(CodecError::InvalidMap("expected a JSON object".to_string())),
        };

        let mut entries = Vec::with_capacity(object.len());
        for (key, value) in object {
            let Some(location) = value.as_str() else {
                warn!(key = %key, "codec map value is not a string, skipping entry");
                continue;
            };

            // Patterns match from the start of the device name
            let pattern = match Regex::new(&format!("^(?:{key})")) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(key = %key, error = %e, "codec map key is not a valid pattern, exact match only");
                    None
                }
            };

            entries.push(CodecMapEntry {
                key,
                location: location.to_string(),
                pattern,
            });
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a device name to its codec location.
    ///
    /// Exact key matches always win; otherwise the first entry whose
    /// pattern matches, in map order, is used.
    pub fn resolve(&self, device_name: &str) -> Option<&str> {
        if let Some(entry) = self.entries.iter().find(|e| e.key == device_name) {
            return Some(&entry.location);
        }

        self.entries
            .iter()
            .find(|e| {
                e.pattern
                    .as_ref()
                    .is_some_and(|pattern| pattern.is_match(device_name))
            })
            .map(|e| e.location.as_str())
    }

    /// Every distinct location in the map, in first-seen order
    pub fn distinct_locations(&self) -> Vec<&str> {
        let mut locations: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !locations.contains(&entry.location.as_str()) {
                locations.push(&entry.location);
            }
        }
        locations
    }
}

/// Split a codec location into a fetchable base and an optional
/// subdirectory inside it.
///
/// A location containing `.git` splits after that marker; everything
/// following the next `/` is the subpath. Locations without `.git` are
/// used whole.
pub fn split_location(location: &str) -> (&str, Option<&str>) {
    let Some(index) = location.find(".git") else {
        return (location, None);
    };

    let base_end = index + ".git".len();
    let base = &location[..base_end];
    let rest = location[base_end..].trim_start_matches('/');
    if rest.is_empty() {
        (base, None)
    } else {
        (base, Some(rest))
    }
}

/// Whether the location base needs a repository fetch
pub fn is_remote(base: &str) -> bool {
    base.starts_with("http://") || base.starts_with("https://") || base.starts_with("git@")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_inline_json() {
        let map = CodecMap::load(r#"{"sensor-1": "/opt/codecs/one"}"#).unwrap();

        assert!(!map.is_empty());
        assert_eq!(map.resolve("sensor-1"), Some("/opt/codecs/one"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sensor-1": "/opt/codecs/one"}}"#).unwrap();

        let map = CodecMap::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(map.resolve("sensor-1"), Some("/opt/codecs/one"));
    }

    #[test]
    fn test_load_empty_source_gives_empty_map() {
        let map = CodecMap::load("   ").unwrap();

        assert!(map.is_empty());
        assert_eq!(map.resolve("anything"), None);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let result = CodecMap::load("{not json");

        assert!(matches!(result, Err(CodecError::InvalidMap(_))));
    }

    #[test]
    fn test_load_rejects_non_object() {
        let result = CodecMap::load(r#"["a", "b"]"#);

        assert!(matches!(result, Err(CodecError::InvalidMap(_))));
    }

    #[test]
    fn test_load_skips_non_string_values() {
        let map = CodecMap::load(r#"{"bad": 42, "good": "/opt/codecs/one"}"#).unwrap();

        assert_eq!(map.resolve("bad"), None);
        assert_eq!(map.resolve("good"), Some("/opt/codecs/one"));
    }

    #[test]
    fn test_exact_match_beats_earlier_pattern() {
        let map = CodecMap::load(
            r#"{"sensor-.*": "/opt/codecs/pattern", "sensor-7": "/opt/codecs/exact"}"#,
        )
        .unwrap();

        assert_eq!(map.resolve("sensor-7"), Some("/opt/codecs/exact"));
        assert_eq!(map.resolve("sensor-9"), Some("/opt/codecs/pattern"));
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let map = CodecMap::load(
            r#"{"env-.*": "/opt/codecs/first", "env-indoor-.*": "/opt/codecs/second"}"#,
        )
        .unwrap();

        assert_eq!(map.resolve("env-indoor-3"), Some("/opt/codecs/first"));
    }

    #[test]
    fn test_pattern_is_anchored_at_start() {
        let map = CodecMap::load(r#"{"indoor": "/opt/codecs/one"}"#).unwrap();

        assert_eq!(map.resolve("indoor-3"), Some("/opt/codecs/one"));
        assert_eq!(map.resolve("env-indoor"), None);
    }

    #[test]
    fn test_malformed_pattern_still_matches_exactly() {
        let map = CodecMap::load(r#"{"sensor[": "/opt/codecs/one", "other-.*": "/opt/codecs/two"}"#)
            .unwrap();

        assert_eq!(map.resolve("sensor["), Some("/opt/codecs/one"));
        assert_eq!(map.resolve("sensor[x"), None);
        assert_eq!(map.resolve("other-1"), Some("/opt/codecs/two"));
    }

    #[test]
    fn test_distinct_locations_deduplicates_in_order() {
        let map = CodecMap::load(
            r#"{"a": "/opt/one", "b": "/opt/two", "c": "/opt/one"}"#,
        )
        .unwrap();

        assert_eq!(map.distinct_locations(), vec!["/opt/one", "/opt/two"]);
    }

    #[test]
    fn test_split_location_without_git_marker() {
        assert_eq!(split_location("/opt/codecs/one"), ("/opt/codecs/one", None));
    }

    #[test]
    fn test_split_location_with_git_repo_root() {
        assert_eq!(
            split_location("https://github.com/acme/codecs.git"),
            ("https://github.com/acme/codecs.git", None)
        );
    }

    #[test]
    fn test_split_location_with_subpath() {
        assert_eq!(
            split_location("https://github.com/acme/codecs.git/vendor/model-a"),
            ("https://github.com/acme/codecs.git", Some("vendor/model-a"))
        );
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://github.com/acme/codecs.git"));
        assert!(is_remote("git@github.com:acme/codecs.git"));
        assert!(!is_remote("/opt/codecs/one"));
    }
}
