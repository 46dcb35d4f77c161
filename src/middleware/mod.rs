pub mod auth;
pub mod host;
pub mod response;
pub mod tenant;

pub use auth::{jwt_auth_middleware, require_super_admin, AuthUser};
pub use host::{host_tenant_middleware, SiteHost};
pub use response::{ApiResponse, ApiResult, ApiSuccess, IntoApiResponse};
pub use tenant::{tenant_context_middleware, TENANT_HEADER};
