/**
 * Routes Module
 * API route handlers
 */

pub mod admin;
pub mod billing;
pub mod domains;
pub mod health;
pub mod limits;
pub mod messages;
pub mod newsletter;
pub mod profiles;
pub mod projects;
pub mod promo_codes;
pub mod quotes;
pub mod session;
