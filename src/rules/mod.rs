/*!
 * Business Rules
 * Pure checks and calculations shared by the route handlers
 */
pub mod domains;
pub mod messages;
pub mod plans;
pub mod promo;
pub mod quotes;
pub mod slug;
