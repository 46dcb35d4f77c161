// handlers/elevated/root/mod.rs - /api/root/* handlers

pub mod backup;    // Backups and restores
pub mod operation; // Long-running operation status
pub mod plan;      // Billing plans
pub mod system;    // Version and running jobs
pub mod tenant;    // Tenant lifecycle
pub mod update;    // Self-update
