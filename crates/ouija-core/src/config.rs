use std::path::Path;

use crate::error::Error;
use crate::filter::FilterConfig;

/// Deserialize a [`FilterConfig`] from a JSON file.
///
/// This is deliberately thin plumbing, not a config-parsing subsystem: no
/// bespoke validation or partial-parse recovery, just `serde_json` on the
/// data-model types. Parsing *semantics* for this game's native config format
/// are out of scope for this repository (see the purpose statement); this
/// exists only so the CLI has a working `--config <path>` end to end.
pub fn load_filter_config(path: &Path) -> Result<FilterConfig, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| Error::ConfigParse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_minimal_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"needs":[],"wants":[{{"value":5,"joker_edition":0,"desire_by_ante":2}}],
                "max_search_ante":8,"deck":0,"stake":0,"filter_name":"foo",
                "score_natural_negatives":false,"score_desired_negatives":false}}"#,
        )
        .unwrap();
        let cfg = load_filter_config(file.path()).unwrap();
        assert_eq!(cfg.filter_name, "foo");
        assert_eq!(cfg.wants.len(), 1);
    }

    #[test]
    fn missing_file_is_a_config_read_error() {
        let err = load_filter_config(Path::new("/nonexistent/ouija.json")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn malformed_json_is_a_config_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_filter_config(file.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }
}
