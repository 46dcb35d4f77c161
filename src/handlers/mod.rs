// handlers/mod.rs - 3-tier handler architecture
//
// Public (no auth) → Protected (JWT + tenant context) → Elevated (super_admin JWT)
//
// The public tier also hosts the site API, where the tenant comes from the
// Host header instead of a token.
pub mod public;    // Tier 1: /auth/*, /site/*, /sitemap.xml
pub mod protected; // Tier 2: /api/*
pub mod elevated;  // Tier 3: /api/root/*
