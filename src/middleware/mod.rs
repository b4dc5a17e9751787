pub mod auth;
pub mod security_headers;

pub use auth::{AuthMiddleware, RoleGuard};
pub use security_headers::SecurityHeaders;
