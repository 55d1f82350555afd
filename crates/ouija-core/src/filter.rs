use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Sentinel value meaning "no edition" / "any edition" for [`Desire::joker_edition`].
pub const EDITION_ANY: u32 = 0;

const MAX_DESIRES: usize = 32;

/// A single desired item occurrence.
///
/// `value` is the primary item id; `joker_edition` is a secondary item id whose
/// meaning ("any"/"no edition") is conveyed by the sentinel [`EDITION_ANY`];
/// `desire_by_ante` bounds the in-game progression depth by which the item must
/// appear.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Desire {
    pub value: u32,
    #[serde(default)]
    pub joker_edition: u32,
    #[serde(default)]
    pub desire_by_ante: u8,
}

/// A fully-populated filter configuration, consumed (not parsed) by the search
/// engine. How it was produced — file, network, hardcoded default — is outside
/// this crate's concern; see [`crate::load_filter_config`] for the one ambient
/// loading path this repository provides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    pub needs: Vec<Desire>,
    pub wants: Vec<Desire>,
    pub max_search_ante: u8,
    pub deck: u32,
    pub stake: u32,
    pub filter_name: String,
    #[serde(default)]
    pub score_natural_negatives: bool,
    #[serde(default)]
    pub score_desired_negatives: bool,
}

impl FilterConfig {
    /// A minimal but valid config, used when no `--config` source is given.
    pub fn default_template() -> Self {
        FilterConfig {
            needs: Vec::new(),
            wants: Vec::new(),
            max_search_ante: 8,
            deck: 0,
            stake: 0,
            filter_name: "ouija_template".to_string(),
            score_natural_negatives: false,
            score_desired_negatives: false,
        }
    }

    /// Validate the invariants from the data model: cardinality bounds, ante
    /// range, and no duplicate `(value, joker_edition)` pair within `wants`.
    /// `max_search_ante` values above 8 are clamped in place with a warning
    /// rather than rejected.
    pub fn validate(&mut self) -> Result<(), Error> {
        if self.needs.len() > MAX_DESIRES {
            return Err(Error::TooManyNeeds(self.needs.len()));
        }
        if self.wants.len() > MAX_DESIRES {
            return Err(Error::TooManyWants(self.wants.len()));
        }
        if self.filter_name.len() > 63 {
            return Err(Error::FilterNameTooLong(self.filter_name.len()));
        }
        if self.max_search_ante == 0 || self.max_search_ante > 8 {
            log::warn!(
                "max_search_ante {} out of range [1,8], clamping to 8",
                self.max_search_ante
            );
            self.max_search_ante = self.max_search_ante.clamp(1, 8);
        }

        let mut seen = std::collections::HashSet::with_capacity(self.wants.len());
        for want in &self.wants {
            if !seen.insert((want.value, want.joker_edition)) {
                return Err(Error::DuplicateWant {
                    value: want.value,
                    joker_edition: want.joker_edition,
                });
            }
        }
        Ok(())
    }

    /// Build the CSV header row (without the leading `+` protocol prefix; see
    /// `ouija_gpu::progress` for the stdout line framing).
    ///
    /// `Seed,Score[,Natural Negative Jokers][,Desired Negative Jokers],<want1>,...`
    pub fn csv_header(&self, item_name: impl Fn(u32) -> String) -> String {
        let mut columns = vec!["Seed".to_string(), "Score".to_string()];
        if self.score_natural_negatives {
            columns.push("Natural Negative Jokers".to_string());
        }
        if self.score_desired_negatives {
            columns.push("Desired Negative Jokers".to_string());
        }
        for want in &self.wants {
            columns.push(want_column_name(want, &item_name));
        }
        columns.join(",")
    }
}

fn want_column_name(want: &Desire, item_name: &impl Fn(u32) -> String) -> String {
    if want.joker_edition != EDITION_ANY {
        format!("{}_{}", item_name(want.joker_edition), item_name(want.value))
    } else {
        item_name(want.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(id: u32) -> String {
        format!("item{id}")
    }

    #[test]
    fn header_has_base_columns_only_for_minimal_config() {
        let cfg = FilterConfig::default_template();
        assert_eq!(cfg.csv_header(name), "Seed,Score");
    }

    #[test]
    fn header_includes_optional_negative_columns_in_order() {
        let mut cfg = FilterConfig::default_template();
        cfg.score_natural_negatives = true;
        cfg.score_desired_negatives = true;
        assert_eq!(
            cfg.csv_header(name),
            "Seed,Score,Natural Negative Jokers,Desired Negative Jokers"
        );
    }

    #[test]
    fn header_renders_want_with_edition_prefix() {
        let mut cfg = FilterConfig::default_template();
        cfg.wants.push(Desire {
            value: 5,
            joker_edition: 2,
            desire_by_ante: 1,
        });
        cfg.wants.push(Desire {
            value: 6,
            joker_edition: EDITION_ANY,
            desire_by_ante: 1,
        });
        assert_eq!(cfg.csv_header(name), "Seed,Score,item2_item5,item6");
    }

    #[test]
    fn validate_rejects_duplicate_wants() {
        let mut cfg = FilterConfig::default_template();
        cfg.wants.push(Desire {
            value: 1,
            joker_edition: 0,
            desire_by_ante: 1,
        });
        cfg.wants.push(Desire {
            value: 1,
            joker_edition: 0,
            desire_by_ante: 2,
        });
        assert!(matches!(
            cfg.validate(),
            Err(Error::DuplicateWant { value: 1, joker_edition: 0 })
        ));
    }

    #[test]
    fn validate_clamps_out_of_range_ante() {
        let mut cfg = FilterConfig::default_template();
        cfg.max_search_ante = 20;
        cfg.validate().unwrap();
        assert_eq!(cfg.max_search_ante, 8);
    }

    #[test]
    fn validate_rejects_too_many_needs() {
        let mut cfg = FilterConfig::default_template();
        cfg.needs = vec![Desire::default(); 33];
        assert!(matches!(cfg.validate(), Err(Error::TooManyNeeds(33))));
    }
}
