//! Tier / Service / Template registries and spec expansion, §4.9. The
//! three tables here are the "registries" §4.1 step 5 expands a
//! declarative config against; [`expand::expand_spec`] is that
//! expansion function.

pub mod expand;
pub mod services;
pub mod templates;
pub mod tiers;

pub use expand::{ExpansionInputs, expand_spec};
