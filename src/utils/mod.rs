pub mod jwt;
pub mod password;
pub mod schedule;
pub mod validation;
