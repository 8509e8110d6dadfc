// ── Device and property storage ──

mod collection;
mod property_store;

pub use collection::DeviceCollection;
pub use property_store::PropertyStore;
