pub mod email;
pub mod health;
pub mod meeting;
pub mod report;
