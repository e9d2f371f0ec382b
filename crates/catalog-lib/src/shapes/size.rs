//! Shape name parsing
//!
//! Shape names encode their size components:
//! `Standard_<family><subfamily><vcpus>[-<constrained>]<features>[_<accelerator>][_<version>][_Promo]`,
//! e.g. `Standard_NC24ads_A100_v4` or `Standard_M128-64ms`.

use crate::error::{CatalogError, CatalogResult};
use regex::Regex;
use std::sync::OnceLock;

static SIZE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn size_pattern() -> &'static Regex {
    SIZE_PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:Standard_|Basic_)?(?P<family>[A-Z]+)(?P<subfamily>[a-z]*)(?P<cpus>\d+)(?:-(?P<constrained>\d+))?(?P<features>[a-z]*)(?:_(?P<accelerator>[A-Z][A-Za-z0-9]*))?(?:_(?P<version>[a-z]\d+))?(?P<promo>_Promo)?$",
        )
        .expect("shape size pattern is valid")
    })
}

/// Size components parsed from a shape name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeSize {
    pub family: String,
    pub subfamily: Option<String>,
    pub cpus: u32,
    /// Active cores of a constrained-core shape
    pub cpus_constrained: Option<u32>,
    /// Single-letter additive features, e.g. `a`, `d`, `s`
    pub additive_features: Vec<char>,
    pub accelerator: Option<String>,
    /// Raw version component, e.g. `v3`
    pub version: Option<String>,
    pub promo: bool,
}

impl ShapeSize {
    pub fn parse(name: &str) -> CatalogResult<Self> {
        let caps = size_pattern()
            .captures(name)
            .ok_or_else(|| CatalogError::invalid_shape(name, "name does not match size pattern"))?;

        let cpus = caps["cpus"]
            .parse()
            .map_err(|_| CatalogError::invalid_shape(name, "vCPU component out of range"))?;
        let cpus_constrained = match caps.name("constrained") {
            Some(m) => Some(m.as_str().parse().map_err(|_| {
                CatalogError::invalid_shape(name, "constrained vCPU component out of range")
            })?),
            None => None,
        };

        Ok(Self {
            family: caps["family"].to_string(),
            subfamily: caps
                .name("subfamily")
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty()),
            cpus,
            cpus_constrained,
            additive_features: caps["features"].chars().collect(),
            accelerator: caps.name("accelerator").map(|m| m.as_str().to_string()),
            version: caps.name("version").map(|m| m.as_str().to_string()),
            promo: caps.name("promo").is_some(),
        })
    }

    pub fn is_constrained(&self) -> bool {
        self.cpus_constrained.is_some()
    }

    pub fn has_feature(&self, feature: char) -> bool {
        self.additive_features.contains(&feature)
    }

    /// Family plus subfamily, e.g. `D` or `Eb`
    pub fn family_name(&self) -> String {
        format!("{}{}", self.family, self.subfamily.as_deref().unwrap_or(""))
    }

    /// Size series without the core count, e.g. `Dsv3` for `Standard_D4s_v3`
    pub fn series(&self) -> String {
        let features: String = self.additive_features.iter().collect();
        format!(
            "{}{}{}{}",
            self.family_name(),
            features,
            self.accelerator.as_deref().unwrap_or(""),
            self.version.as_deref().unwrap_or("")
        )
    }

    /// Numeric version label value
    ///
    /// Unversioned shapes are version 1. A version component without the
    /// `v` prefix yields `None` and the version is left unset.
    pub fn version_number(&self) -> Option<String> {
        match self.version.as_deref() {
            None => Some("1".to_string()),
            Some(v) => v.strip_prefix('v').map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_general_purpose() {
        let size = ShapeSize::parse("Standard_D4s_v3").unwrap();
        assert_eq!(size.family, "D");
        assert_eq!(size.subfamily, None);
        assert_eq!(size.cpus, 4);
        assert_eq!(size.additive_features, vec!['s']);
        assert_eq!(size.accelerator, None);
        assert_eq!(size.version.as_deref(), Some("v3"));
        assert_eq!(size.series(), "Dsv3");
        assert_eq!(size.version_number().as_deref(), Some("3"));
        assert!(!size.is_constrained());
        assert!(!size.promo);
    }

    #[test]
    fn test_parse_accelerated() {
        let size = ShapeSize::parse("Standard_NC24ads_A100_v4").unwrap();
        assert_eq!(size.family, "NC");
        assert_eq!(size.cpus, 24);
        assert_eq!(size.additive_features, vec!['a', 'd', 's']);
        assert_eq!(size.accelerator.as_deref(), Some("A100"));
        assert_eq!(size.series(), "NCadsA100v4");
    }

    #[test]
    fn test_parse_constrained_and_subfamily() {
        let constrained = ShapeSize::parse("Standard_M128-64ms").unwrap();
        assert_eq!(constrained.cpus, 128);
        assert_eq!(constrained.cpus_constrained, Some(64));
        assert!(constrained.is_constrained());
        assert_eq!(constrained.version_number().as_deref(), Some("1"));

        let sub = ShapeSize::parse("Standard_Eb8as_v5").unwrap();
        assert_eq!(sub.family, "E");
        assert_eq!(sub.subfamily.as_deref(), Some("b"));
        assert_eq!(sub.family_name(), "Eb");
    }

    #[test]
    fn test_parse_promo() {
        let size = ShapeSize::parse("Standard_DS2_v2_Promo").unwrap();
        assert_eq!(size.family, "DS");
        assert!(size.promo);
        assert_eq!(size.series(), "DSv2");
    }

    #[test]
    fn test_malformed_version_prefix_has_no_version_number() {
        let size = ShapeSize::parse("Standard_D2s_x3").unwrap();
        assert_eq!(size.version.as_deref(), Some("x3"));
        assert_eq!(size.version_number(), None);
    }

    #[test]
    fn test_unparseable_names() {
        for name in ["", "Standard_", "standard_d2s_v3", "Standard_D_v3", "Standard_D2s v3"] {
            let err = ShapeSize::parse(name).unwrap_err();
            assert!(matches!(err, CatalogError::InvalidShape { .. }), "{}", name);
        }
    }
}
