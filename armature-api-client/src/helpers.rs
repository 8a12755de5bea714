//! String helpers for URIs and paths.

use once_cell::sync::Lazy;
use regex::Regex;

static DUPLICATE_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[^:])//+").unwrap());

/// Collapse runs of slashes into one, except the `//` following a scheme's `:`.
pub fn reduce_duplicate_slashes(value: &str) -> String {
    DUPLICATE_SLASHES.replace_all(value, "${1}/").into_owned()
}

/// Substitute `{name}` placeholders in a path template.
///
/// Values are inserted verbatim; unknown placeholders are left in place.
///
/// ```
/// use armature_api_client::build_path;
///
/// let path = build_path("/pokemon/{id}/encounters", &[("id", "25")]);
/// assert_eq!(path, "/pokemon/25/encounters");
/// ```
pub fn build_path<K, V>(template: &str, parameters: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    parameters
        .iter()
        .fold(template.to_string(), |path, (name, value)| {
            path.replace(&format!("{{{}}}", name.as_ref()), value.as_ref())
        })
}

/// Insert or replace a name/value pair, keeping first-insertion order.
pub(crate) fn upsert(params: &mut Vec<(String, String)>, name: String, value: String) {
    match params.iter_mut().find(|(k, _)| *k == name) {
        Some((_, existing)) => *existing = value,
        None => params.push((name, value)),
    }
}

/// Merge request values over defaults; request values win on collision.
pub(crate) fn merge_params(
    defaults: &[(String, String)],
    overrides: Vec<(String, String)>,
) -> Vec<(String, String)> {
    let mut merged = defaults.to_vec();
    for (name, value) in overrides {
        upsert(&mut merged, name, value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_duplicate_slashes() {
        assert_eq!(
            reduce_duplicate_slashes("https://pokeapi.co/api/v2//pokemon"),
            "https://pokeapi.co/api/v2/pokemon"
        );
        assert_eq!(
            reduce_duplicate_slashes("https://pokeapi.co///api////v2/"),
            "https://pokeapi.co/api/v2/"
        );
        assert_eq!(reduce_duplicate_slashes("//path//x"), "/path/x");
        assert_eq!(
            reduce_duplicate_slashes("http://example.com"),
            "http://example.com"
        );
    }

    #[test]
    fn test_build_path() {
        assert_eq!(
            build_path("/path/{a}/x/{b}", &[("a", "1"), ("b", "2")]),
            "/path/1/x/2"
        );
        assert_eq!(build_path("/path/{a}/{a}", &[("a", "1")]), "/path/1/1");
        assert_eq!(
            build_path::<&str, &str>("/path/{missing}", &[]),
            "/path/{missing}"
        );
    }

    #[test]
    fn test_merge_params_request_wins() {
        let defaults = vec![
            ("lang".to_string(), "en".to_string()),
            ("units".to_string(), "metric".to_string()),
        ];
        let merged = merge_params(
            &defaults,
            vec![
                ("units".to_string(), "imperial".to_string()),
                ("q".to_string(), "Lisbon".to_string()),
            ],
        );

        assert_eq!(
            merged,
            vec![
                ("lang".to_string(), "en".to_string()),
                ("units".to_string(), "imperial".to_string()),
                ("q".to_string(), "Lisbon".to_string()),
            ]
        );
    }
}
