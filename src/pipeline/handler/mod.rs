//! Handler adapters

pub mod legacy;

pub use legacy::LegacyHandlerAdapter;
