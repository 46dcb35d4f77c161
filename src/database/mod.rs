pub mod manager;
pub mod pagination;
pub mod translations;

pub use manager::{map_sqlx_error, DatabaseError, DatabaseManager};
pub use pagination::{Paginated, Pagination};
pub use translations::{pick_translation, Translation, TranslationRepository, TranslationTable};
