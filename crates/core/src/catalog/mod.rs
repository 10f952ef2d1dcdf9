mod catalog_model;
mod catalog_service;
mod catalog_traits;

pub use catalog_model::*;
pub use catalog_service::*;
pub use catalog_traits::*;
