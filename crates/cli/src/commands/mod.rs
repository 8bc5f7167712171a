pub mod admin;
pub mod datasources;
pub mod predict;
pub mod predictors;
