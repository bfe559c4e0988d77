//! Encrypted local document store.

mod store;

pub use store::LocalStore;
