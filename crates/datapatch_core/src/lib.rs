pub mod backup;
pub mod batch;
pub mod category_cache;
pub mod dataset;
pub mod delta;
pub mod layout;
pub mod patch_api;
pub mod scanner;
pub mod store;
pub mod value;
