//! Scheduling requirements derived from a shape
//!
//! Every instance type carries one requirement per well-known label. Keys
//! that do not apply to a shape are still present with the
//! [`Operator::DoesNotExist`] sentinel, so a selector on any well-known
//! label can always be evaluated against any instance type.

use crate::models::{Offerings, Shape};
use crate::shapes::{EphemeralDisk, GpuModel, ShapeSize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_OS: &str = "kubernetes.io/os";
pub const LABEL_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_REGION: &str = "topology.kubernetes.io/region";
pub const LABEL_CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";

pub const LABEL_SKU_NAME: &str = "karpenter.azure.com/sku-name";
pub const LABEL_SKU_FAMILY: &str = "karpenter.azure.com/sku-family";
pub const LABEL_SKU_SERIES: &str = "karpenter.azure.com/sku-series";
pub const LABEL_SKU_VERSION: &str = "karpenter.azure.com/sku-version";
pub const LABEL_SKU_CPU: &str = "karpenter.azure.com/sku-cpu";
pub const LABEL_SKU_MEMORY: &str = "karpenter.azure.com/sku-memory";
pub const LABEL_SKU_GPU_COUNT: &str = "karpenter.azure.com/sku-gpu-count";
pub const LABEL_SKU_GPU_NAME: &str = "karpenter.azure.com/sku-gpu-name";
pub const LABEL_SKU_GPU_MANUFACTURER: &str = "karpenter.azure.com/sku-gpu-manufacturer";
pub const LABEL_SKU_ACCELERATOR: &str = "karpenter.azure.com/sku-accelerator";
pub const LABEL_SKU_PREMIUM_STORAGE: &str = "karpenter.azure.com/sku-storage-premium-capable";
pub const LABEL_SKU_ACCELERATED_NETWORKING: &str = "karpenter.azure.com/sku-networking-accelerated";
pub const LABEL_SKU_HYPERV_GENERATION: &str = "karpenter.azure.com/sku-hyperv-generation";
pub const LABEL_SKU_EPHEMERAL_OS_MAX_SIZE: &str =
    "karpenter.azure.com/sku-storage-ephemeralos-maxsize";

/// Labels every instance type carries
pub const WELL_KNOWN_LABELS: &[&str] = &[
    LABEL_INSTANCE_TYPE,
    LABEL_ARCH,
    LABEL_OS,
    LABEL_ZONE,
    LABEL_REGION,
    LABEL_CAPACITY_TYPE,
    LABEL_SKU_NAME,
    LABEL_SKU_FAMILY,
    LABEL_SKU_SERIES,
    LABEL_SKU_VERSION,
    LABEL_SKU_CPU,
    LABEL_SKU_MEMORY,
    LABEL_SKU_GPU_COUNT,
    LABEL_SKU_GPU_NAME,
    LABEL_SKU_GPU_MANUFACTURER,
    LABEL_SKU_ACCELERATOR,
    LABEL_SKU_PREMIUM_STORAGE,
    LABEL_SKU_ACCELERATED_NETWORKING,
    LABEL_SKU_HYPERV_GENERATION,
    LABEL_SKU_EPHEMERAL_OS_MAX_SIZE,
];

/// Additive-feature letters in shape names and the labels they set
pub const FEATURE_FLAGS: &[(char, &str)] = &[
    ('a', "karpenter.azure.com/sku-feature-amd"),
    ('b', "karpenter.azure.com/sku-feature-block-storage"),
    ('d', "karpenter.azure.com/sku-feature-local-disk"),
    ('i', "karpenter.azure.com/sku-feature-isolated"),
    ('l', "karpenter.azure.com/sku-feature-low-memory"),
    ('m', "karpenter.azure.com/sku-feature-memory-intensive"),
    ('p', "karpenter.azure.com/sku-feature-arm"),
    ('r', "karpenter.azure.com/sku-feature-rdma"),
    ('t', "karpenter.azure.com/sku-feature-tiny-memory"),
];

const OS_LINUX: &str = "linux";

/// Constraint on the values a label may take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operator", content = "values")]
pub enum Operator {
    In(BTreeSet<String>),
    Exists,
    DoesNotExist,
}

impl Operator {
    pub fn in_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Operator::In(values.into_iter().map(Into::into).collect())
    }

    pub fn single(value: impl Into<String>) -> Self {
        Operator::In(BTreeSet::from([value.into()]))
    }

    pub fn boolean(value: bool) -> Self {
        Self::single(value.to_string())
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::In(values) => {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                write!(f, "In [{}]", values.join(", "))
            }
            Operator::Exists => f.write_str("Exists"),
            Operator::DoesNotExist => f.write_str("DoesNotExist"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
}

impl Requirement {
    pub fn new(key: impl Into<String>, operator: Operator) -> Self {
        Self {
            key: key.into(),
            operator,
        }
    }

    /// Whether a label value (or its absence) satisfies this requirement
    pub fn matches(&self, value: Option<&str>) -> bool {
        match &self.operator {
            Operator::In(values) => value.is_some_and(|v| values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// Requirement set with unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Requirements(BTreeMap<String, Operator>);

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requirement for a key, replacing any previous one
    pub fn add(&mut self, requirement: Requirement) {
        self.0.insert(requirement.key, requirement.operator);
    }

    pub fn set(&mut self, key: &str, operator: Operator) {
        self.0.insert(key.to_string(), operator);
    }

    pub fn get(&self, key: &str) -> Option<Requirement> {
        self.0
            .get(key)
            .map(|operator| Requirement::new(key, operator.clone()))
    }

    pub fn operator(&self, key: &str) -> Option<&Operator> {
        self.0.get(key)
    }

    /// Allowed values for a key; empty for existence operators
    pub fn values(&self, key: &str) -> Vec<&str> {
        match self.0.get(key) {
            Some(Operator::In(values)) => values.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// The value of a key constrained to exactly one value
    pub fn single_value(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(Operator::In(values)) if values.len() == 1 => {
                values.iter().next().map(String::as_str)
            }
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = Requirement> + '_ {
        self.0
            .iter()
            .map(|(key, operator)| Requirement::new(key.clone(), operator.clone()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a node with `labels` satisfies every requirement on the
    /// keys it names
    ///
    /// Labels on keys this set does not describe are left alone.
    pub fn compatible(&self, labels: &BTreeMap<String, String>) -> bool {
        labels.iter().all(|(key, value)| match self.0.get(key) {
            Some(operator) => Requirement::new(key.clone(), operator.clone()).matches(Some(value)),
            None => true,
        })
    }
}

/// Every well-known and feature-flag key, set to the absence sentinel
fn preregistered() -> Requirements {
    let mut requirements = Requirements::new();
    for key in WELL_KNOWN_LABELS {
        requirements.set(key, Operator::DoesNotExist);
    }
    for (_, key) in FEATURE_FLAGS {
        requirements.set(key, Operator::DoesNotExist);
    }
    requirements
}

/// Derive the scheduling requirements of one retained shape
///
/// Zone and capacity-type values come from the available `offerings`, so
/// the offerings must be generated first.
pub fn compute(
    shape: &Shape,
    size: &ShapeSize,
    region: &str,
    offerings: &Offerings,
    gpu: Option<&GpuModel>,
    ephemeral: EphemeralDisk,
) -> Requirements {
    let mut requirements = preregistered();

    requirements.set(LABEL_INSTANCE_TYPE, Operator::single(&shape.name));
    requirements.set(LABEL_ARCH, Operator::single(shape.normalized_architecture()));
    requirements.set(LABEL_OS, Operator::single(OS_LINUX));
    requirements.set(
        LABEL_ZONE,
        Operator::in_values(offerings.available().map(|o| o.zone.clone())),
    );
    requirements.set(
        LABEL_CAPACITY_TYPE,
        Operator::in_values(offerings.available().map(|o| o.capacity_type.as_str())),
    );
    requirements.set(LABEL_REGION, Operator::single(region));

    requirements.set(LABEL_SKU_CPU, Operator::single(shape.vcpus().to_string()));
    requirements.set(LABEL_SKU_MEMORY, Operator::single(shape.memory_mib().to_string()));
    requirements.set(
        LABEL_SKU_GPU_COUNT,
        Operator::single(shape.gpu_count().to_string()),
    );

    requirements.set(LABEL_SKU_NAME, Operator::single(&shape.name));
    requirements.set(LABEL_SKU_FAMILY, Operator::single(size.family_name()));
    requirements.set(LABEL_SKU_SERIES, Operator::single(size.series()));
    if let Some(version) = size.version_number() {
        requirements.set(LABEL_SKU_VERSION, Operator::single(version));
    }
    if let Some(accelerator) = &size.accelerator {
        requirements.set(LABEL_SKU_ACCELERATOR, Operator::single(accelerator));
    }
    if let Some(model) = gpu.filter(|_| shape.has_gpu()) {
        requirements.set(LABEL_SKU_GPU_NAME, Operator::single(&model.name));
        requirements.set(
            LABEL_SKU_GPU_MANUFACTURER,
            Operator::single(&model.manufacturer),
        );
    }

    requirements.set(
        LABEL_SKU_PREMIUM_STORAGE,
        Operator::boolean(shape.supports_premium_storage()),
    );
    requirements.set(
        LABEL_SKU_ACCELERATED_NETWORKING,
        Operator::boolean(shape.supports_accelerated_networking()),
    );
    let generations = shape.hyperv_generations();
    if !generations.is_empty() {
        requirements.set(
            LABEL_SKU_HYPERV_GENERATION,
            Operator::in_values(generations.iter().map(|g| g.as_str())),
        );
    }
    if ephemeral.max_size_gb > 0 {
        requirements.set(
            LABEL_SKU_EPHEMERAL_OS_MAX_SIZE,
            Operator::single(ephemeral.max_size_gb.to_string()),
        );
    }

    for (flag, key) in FEATURE_FLAGS {
        if size.has_feature(*flag) {
            requirements.set(key, Operator::single("true"));
        }
    }

    requirements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ShapeBuilder, REGION};
    use crate::models::{CapacityType, Offering};
    use crate::shapes::{ephemeral_disk, keys, EphemeralPlacement, GpuAllowList};

    #[test]
    fn test_operator_display() {
        assert_eq!(
            Operator::in_values(["westus2-2", "westus2-1"]).to_string(),
            "In [westus2-1, westus2-2]"
        );
        assert_eq!(Operator::DoesNotExist.to_string(), "DoesNotExist");
    }

    fn offerings(zones: &[&str]) -> Offerings {
        let mut all = Vec::new();
        for zone in zones {
            for capacity_type in CapacityType::ALL {
                all.push(Offering {
                    zone: zone.to_string(),
                    capacity_type,
                    price: 0.1,
                    available: true,
                });
            }
        }
        Offerings(all)
    }

    fn requirements_for(shape: &Shape, offerings: &Offerings) -> Requirements {
        let size = ShapeSize::parse(&shape.name).unwrap();
        let allow_list = GpuAllowList::default();
        compute(
            shape,
            &size,
            REGION,
            offerings,
            allow_list.lookup(&shape.name),
            ephemeral_disk(shape),
        )
    }

    fn assert_complete(requirements: &Requirements) {
        for key in WELL_KNOWN_LABELS {
            assert!(requirements.contains_key(key), "missing {}", key);
        }
        for (_, key) in FEATURE_FLAGS {
            assert!(requirements.contains_key(key), "missing {}", key);
        }
    }

    #[test]
    fn test_general_purpose_requirements() {
        let shape = ShapeBuilder::general("Standard_D4s_v3", 4, 16.0).build();
        let offerings = offerings(&["westus2-1", "westus2-2"]);
        let requirements = requirements_for(&shape, &offerings);

        assert_complete(&requirements);
        assert_eq!(requirements.single_value(LABEL_INSTANCE_TYPE), Some("Standard_D4s_v3"));
        assert_eq!(requirements.single_value(LABEL_ARCH), Some("amd64"));
        assert_eq!(requirements.single_value(LABEL_OS), Some("linux"));
        assert_eq!(requirements.single_value(LABEL_REGION), Some(REGION));
        assert_eq!(requirements.values(LABEL_ZONE), vec!["westus2-1", "westus2-2"]);
        assert_eq!(requirements.values(LABEL_CAPACITY_TYPE), vec!["on-demand", "spot"]);
        assert_eq!(requirements.single_value(LABEL_SKU_CPU), Some("4"));
        assert_eq!(requirements.single_value(LABEL_SKU_MEMORY), Some("16384"));
        assert_eq!(requirements.single_value(LABEL_SKU_GPU_COUNT), Some("0"));
        assert_eq!(requirements.single_value(LABEL_SKU_FAMILY), Some("D"));
        assert_eq!(requirements.single_value(LABEL_SKU_SERIES), Some("Dsv3"));
        assert_eq!(requirements.single_value(LABEL_SKU_VERSION), Some("3"));
        assert_eq!(requirements.single_value(LABEL_SKU_PREMIUM_STORAGE), Some("true"));
        assert_eq!(
            requirements.values(LABEL_SKU_HYPERV_GENERATION),
            vec!["V1", "V2"]
        );
        assert_eq!(
            requirements.operator(LABEL_SKU_GPU_NAME),
            Some(&Operator::DoesNotExist)
        );
        assert_eq!(
            requirements.operator(LABEL_SKU_ACCELERATOR),
            Some(&Operator::DoesNotExist)
        );
        assert_eq!(
            requirements.operator(LABEL_SKU_EPHEMERAL_OS_MAX_SIZE),
            Some(&Operator::DoesNotExist)
        );
    }

    #[test]
    fn test_booleans_are_explicit() {
        let shape = ShapeBuilder::general("Standard_D4_v3", 4, 16.0)
            .without_capability(keys::PREMIUM_IO)
            .capability(keys::ACCELERATED_NETWORKING, "False")
            .build();
        let requirements = requirements_for(&shape, &offerings(&["westus2-1"]));

        assert_eq!(requirements.single_value(LABEL_SKU_PREMIUM_STORAGE), Some("false"));
        assert_eq!(
            requirements.single_value(LABEL_SKU_ACCELERATED_NETWORKING),
            Some("false")
        );
    }

    #[test]
    fn test_gpu_and_accelerator() {
        let shape = ShapeBuilder::general("Standard_NC24ads_A100_v4", 24, 220.0)
            .capability(keys::GPUS, "1")
            .build();
        let requirements = requirements_for(&shape, &offerings(&["westus2-1"]));

        assert_complete(&requirements);
        assert_eq!(requirements.single_value(LABEL_SKU_GPU_COUNT), Some("1"));
        assert_eq!(requirements.single_value(LABEL_SKU_GPU_NAME), Some("A100"));
        assert_eq!(
            requirements.single_value(LABEL_SKU_GPU_MANUFACTURER),
            Some("nvidia")
        );
        assert_eq!(requirements.single_value(LABEL_SKU_ACCELERATOR), Some("A100"));
        assert_eq!(requirements.single_value(LABEL_SKU_SERIES), Some("NCadsA100v4"));
    }

    #[test]
    fn test_feature_flags_flip_to_true() {
        let shape = ShapeBuilder::general("Standard_D4ads_v5", 4, 16.0).build();
        let requirements = requirements_for(&shape, &offerings(&["westus2-1"]));

        assert_eq!(
            requirements.single_value("karpenter.azure.com/sku-feature-amd"),
            Some("true")
        );
        assert_eq!(
            requirements.single_value("karpenter.azure.com/sku-feature-local-disk"),
            Some("true")
        );
        assert_eq!(
            requirements.operator("karpenter.azure.com/sku-feature-rdma"),
            Some(&Operator::DoesNotExist)
        );
    }

    #[test]
    fn test_malformed_version_prefix_is_omitted() {
        let shape = ShapeBuilder::general("Standard_D2s_x3", 2, 8.0).build();
        let requirements = requirements_for(&shape, &offerings(&["westus2-1"]));

        assert_complete(&requirements);
        assert_eq!(
            requirements.operator(LABEL_SKU_VERSION),
            Some(&Operator::DoesNotExist)
        );

        let unversioned = ShapeBuilder::general("Standard_A4", 8, 14.0).build();
        let requirements = requirements_for(&unversioned, &offerings(&["westus2-1"]));
        assert_eq!(requirements.single_value(LABEL_SKU_VERSION), Some("1"));
    }

    #[test]
    fn test_ephemeral_max_size_and_zones_from_available_offerings() {
        let shape = ShapeBuilder::general("Standard_D4ds_v5", 4, 16.0)
            .capability(keys::EPHEMERAL_OS_DISK, "True")
            .capability(keys::MAX_RESOURCE_VOLUME_MB, &(150 * 1024).to_string())
            .build();
        assert_eq!(ephemeral_disk(&shape).placement, EphemeralPlacement::ResourceDisk);

        let mut offerings = offerings(&["westus2-1", "westus2-2"]);
        for offering in offerings.0.iter_mut() {
            if offering.zone == "westus2-2" {
                offering.available = false;
            }
        }
        let requirements = requirements_for(&shape, &offerings);

        assert_eq!(
            requirements.single_value(LABEL_SKU_EPHEMERAL_OS_MAX_SIZE),
            Some("150")
        );
        assert_eq!(requirements.values(LABEL_ZONE), vec!["westus2-1"]);
    }

    #[test]
    fn test_requirement_matching() {
        let zone = Requirement::new(LABEL_ZONE, Operator::in_values(["a", "b"]));
        assert!(zone.matches(Some("a")));
        assert!(!zone.matches(Some("c")));
        assert!(!zone.matches(None));

        assert!(Requirement::new("k", Operator::Exists).matches(Some("x")));
        assert!(!Requirement::new("k", Operator::Exists).matches(None));
        assert!(Requirement::new("k", Operator::DoesNotExist).matches(None));
        assert!(!Requirement::new("k", Operator::DoesNotExist).matches(Some("x")));
    }

    #[test]
    fn test_compatible_with_labels() {
        let shape = ShapeBuilder::general("Standard_D4s_v3", 4, 16.0).build();
        let requirements = requirements_for(&shape, &offerings(&["westus2-1"]));

        let labels = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };

        assert!(requirements.compatible(&labels(&[
            (LABEL_ARCH, "amd64"),
            (LABEL_SKU_CPU, "4"),
            ("team", "payments"),
        ])));
        assert!(!requirements.compatible(&labels(&[(LABEL_ARCH, "arm64")])));
        // Absent GPU name rejects any GPU selector
        assert!(!requirements.compatible(&labels(&[(LABEL_SKU_GPU_NAME, "A100")])));
    }

    #[test]
    fn test_requirements_serialize_by_key() {
        let mut requirements = Requirements::new();
        requirements.add(Requirement::new(LABEL_OS, Operator::single("linux")));
        requirements.add(Requirement::new(LABEL_SKU_GPU_NAME, Operator::DoesNotExist));

        let json = serde_json::to_value(&requirements).unwrap();
        assert_eq!(json[LABEL_OS]["operator"], "In");
        assert_eq!(json[LABEL_OS]["values"][0], "linux");
        assert_eq!(json[LABEL_SKU_GPU_NAME]["operator"], "DoesNotExist");

        let back: Requirements = serde_json::from_value(json).unwrap();
        assert_eq!(back, requirements);
    }
}
