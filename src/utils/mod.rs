pub mod errors;
pub mod logger;
pub mod paths;
pub mod placeholders;
