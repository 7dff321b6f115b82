//! VM module tests

mod custom_types;
