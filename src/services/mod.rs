pub mod cache;
pub mod engine;
pub mod features;
pub mod mapping;
pub mod matrix;
pub mod model;
pub mod registry;
pub mod training;
