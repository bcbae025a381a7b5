//! Creation Script Options
//!
//! The capability set controlling which auxiliary schema objects (indexes,
//! constraints, triggers, ...) are scripted along with an article when a
//! subscriber first synchronizes. Each flag maps to one bit of the server's
//! `@schema_option` bitmask.
//!
//! On the wire the bundle is a tagged JSON object:
//! ```json
//! { "type": "CreationScriptOptions", "options": ["PrimaryObject", "ClusteredIndexes"] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single schema-scripting flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScriptOption {
    PrimaryObject,
    CustomProcedures,
    Identity,
    KeepTimestamp,
    ClusteredIndexes,
    NonClusteredIndexes,
    DriPrimaryKey,
    UserTriggers,
    DriForeignKeys,
    DriChecks,
    DriDefaults,
    Collation,
    ExtendedProperties,
    DriUniqueKeys,
    MarkReplicatedCheckConstraintsAsNotForReplication,
    MarkReplicatedForeignKeyConstraintsAsNotForReplication,
    Statistics,
    Schema,
    Permissions,
}

impl ScriptOption {
    /// Every flag, in bit order
    pub const ALL: [Self; 19] = [
        Self::PrimaryObject,
        Self::CustomProcedures,
        Self::Identity,
        Self::KeepTimestamp,
        Self::ClusteredIndexes,
        Self::NonClusteredIndexes,
        Self::DriPrimaryKey,
        Self::UserTriggers,
        Self::DriForeignKeys,
        Self::DriChecks,
        Self::DriDefaults,
        Self::Collation,
        Self::ExtendedProperties,
        Self::DriUniqueKeys,
        Self::MarkReplicatedCheckConstraintsAsNotForReplication,
        Self::MarkReplicatedForeignKeyConstraintsAsNotForReplication,
        Self::Statistics,
        Self::Schema,
        Self::Permissions,
    ];

    /// Bit in the server's `@schema_option` mask
    #[must_use]
    pub const fn bit(self) -> u64 {
        match self {
            Self::PrimaryObject => 0x01,
            Self::CustomProcedures => 0x02,
            Self::Identity => 0x04,
            Self::KeepTimestamp => 0x08,
            Self::ClusteredIndexes => 0x10,
            Self::NonClusteredIndexes => 0x40,
            Self::DriPrimaryKey => 0x80,
            Self::UserTriggers => 0x100,
            Self::DriForeignKeys => 0x200,
            Self::DriChecks => 0x400,
            Self::DriDefaults => 0x800,
            Self::Collation => 0x1000,
            Self::ExtendedProperties => 0x2000,
            Self::DriUniqueKeys => 0x4000,
            Self::MarkReplicatedCheckConstraintsAsNotForReplication => 0x1_0000,
            Self::MarkReplicatedForeignKeyConstraintsAsNotForReplication => 0x2_0000,
            Self::Statistics => 0x10_0000,
            Self::Schema => 0x800_0000,
            Self::Permissions => 0x4000_0000,
        }
    }

    /// Flags that only make sense for log-based (transactional) articles
    #[must_use]
    pub const fn is_log_based_only(self) -> bool {
        matches!(self, Self::CustomProcedures | Self::KeepTimestamp)
    }
}

/// The recognized creation-options capability set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationScriptOptions {
    /// Enabled flags
    #[serde(default)]
    pub options: BTreeSet<ScriptOption>,
}

impl CreationScriptOptions {
    /// Type tag accepted at the input boundary
    pub const TYPE_TAG: &'static str = "CreationScriptOptions";

    /// Create a bundle from a list of flags
    pub fn new(options: impl IntoIterator<Item = ScriptOption>) -> Self {
        Self { options: options.into_iter().collect() }
    }

    /// Options commonly used when adding a table to a publication
    #[must_use]
    pub fn recommended() -> Self {
        Self::new([
            ScriptOption::PrimaryObject,
            ScriptOption::CustomProcedures,
            ScriptOption::Identity,
            ScriptOption::KeepTimestamp,
            ScriptOption::ClusteredIndexes,
            ScriptOption::DriPrimaryKey,
            ScriptOption::Collation,
            ScriptOption::DriUniqueKeys,
            ScriptOption::MarkReplicatedCheckConstraintsAsNotForReplication,
            ScriptOption::MarkReplicatedForeignKeyConstraintsAsNotForReplication,
            ScriptOption::Schema,
        ])
    }

    /// Decode a server `@schema_option` mask; unknown bits are dropped
    #[must_use]
    pub fn from_schema_option(mask: u64) -> Self {
        Self::new(ScriptOption::ALL.into_iter().filter(|opt| mask & opt.bit() != 0))
    }

    /// Encode as the server `@schema_option` mask
    #[must_use]
    pub fn schema_option(&self) -> u64 {
        self.options.iter().fold(0, |mask, opt| mask | opt.bit())
    }

    /// Render the mask as the `binary(8)` literal the stored procedures expect
    #[must_use]
    pub fn schema_option_literal(&self) -> String {
        format!("0x{:016X}", self.schema_option())
    }

    /// Tagged JSON form accepted by the parameter validator
    #[must_use]
    pub fn to_tagged_value(&self) -> serde_json::Value {
        serde_json::json!({ "type": Self::TYPE_TAG, "options": self.options })
    }

    #[must_use]
    pub fn contains(&self, option: ScriptOption) -> bool {
        self.options.contains(&option)
    }
}
