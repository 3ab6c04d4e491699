pub mod jwt;

pub use jwt::{Authenticated, Claims, Requires, LOG_EVENTS, MANAGE_EVENTS, VIEW_EVENTS};
