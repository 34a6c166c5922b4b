pub mod assemble;
pub mod deserializer;
pub mod model;
pub mod name;
pub mod tree_builder;
pub mod value_variant;
