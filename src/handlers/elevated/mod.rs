// handlers/elevated/mod.rs - Elevated handlers (super_admin JWT required)
//
// Security Level: JWT with role super_admin
// Route Prefix: /api/root/*
// Middleware: jwt_auth_middleware → require_super_admin
//
// Operator surface: tenants, plans, backups, self-update and system status.

pub mod root;
