pub mod project;
pub mod rbac;
pub mod user;
