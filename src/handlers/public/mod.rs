// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Security Level: None
// Route Prefix: /auth/*, /site/*, /sitemap.xml
// Middleware: site routes run host_tenant_middleware, which resolves the
// tenant from the Host header and answers 404 for unknown hosts.

pub mod auth; // Token acquisition
pub mod site; // Read-only published content
