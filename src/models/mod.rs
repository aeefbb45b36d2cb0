pub mod circuit_breaker;
pub mod delivery;
pub mod email;
pub mod health;
pub mod message;
pub mod notification;
pub mod preference;
pub mod retry;
pub mod status;
pub mod template;
pub mod topology;
pub mod validation;
