//! Settings storage.
//!
//! [`SettingStore`] owns the four partitions (real, latent and their saved
//! copies). The trigger engine reads it through the [`SettingView`] trait.

mod partition;
mod store;
mod traits;

pub use partition::{Partition, SectionMap, VariableMap};
pub use store::SettingStore;
pub use traits::SettingView;
