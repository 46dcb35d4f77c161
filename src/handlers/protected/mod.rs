// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Security Level: JWT + tenant context
// Route Prefix: /api/*
// Middleware: jwt_auth_middleware → tenant_context_middleware
//
// Every handler receives `AuthUser` and `TenantContext` as extensions and
// declares its minimum role with `user.require(..)`:
//   reads            viewer
//   content writes   editor
//   users, domains, tenant settings, billing   admin

pub mod auth;       // whoami, password (token only, no tenant)
pub mod billing;    // Plan and usage
pub mod contact;    // Contact information
pub mod domains;    // Custom domains and verification
pub mod media;      // Uploads
pub mod menus;      // Menus and item trees
pub mod offerings;  // Services offered
pub mod pages;      // Pages
pub mod references; // Project references
pub mod seo;        // SEO entries
pub mod social;     // Social links
pub mod team;       // Team members
pub mod tenant;     // Own tenant settings
pub mod users;      // Tenant user management
