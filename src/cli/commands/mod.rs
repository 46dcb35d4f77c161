pub mod backup;
pub mod migrate;
pub mod serve;
pub mod tenant;
pub mod update;
pub mod user;
