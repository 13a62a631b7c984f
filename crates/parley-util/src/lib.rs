pub mod pagination;
pub mod profile;
pub mod snowflake;
pub mod validation;
