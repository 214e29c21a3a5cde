//! Gridline Policy - Design-system policy document and run settings
//!
//! The policy document (`gridline.toml`) declares the typography scale,
//! spacing grid, color-role budget, approved component namespace and
//! accessibility minimums. The same document may carry `[scan]` and `[fix]`
//! tables, which are resolved into [`RunSettings`] with global and
//! environment layers applied.

mod policy;
mod settings;

pub use policy::{
    AttributeRequirement, ColorRole, DesignSystemConfig, RuleOverride, Severity,
    DEFAULT_COMPONENT_NAMESPACE, SIZE_SCALE_LEN, STARTER_POLICY, WEIGHT_SCALE_LEN,
};
pub use settings::{discover_policy, FixSettings, RunSettings, ScanSettings, POLICY_FILE_NAMES};
