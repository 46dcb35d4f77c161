use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgExecutor};
use std::collections::HashMap;
use uuid::Uuid;

use super::manager::DatabaseError;

/// Translation child tables. All share the `(parent_id, language, title,
/// summary, body)` layout; only the table name differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationTable {
    Page,
    MenuItem,
    Service,
    TeamMember,
    Reference,
}

impl TranslationTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            TranslationTable::Page => "page_translations",
            TranslationTable::MenuItem => "menu_item_translations",
            TranslationTable::Service => "service_translations",
            TranslationTable::TeamMember => "team_member_translations",
            TranslationTable::Reference => "project_reference_translations",
        }
    }
}

/// Per-language text of a parent record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub language: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, FromRow)]
struct TranslationRow {
    parent_id: Uuid,
    language: String,
    title: String,
    summary: Option<String>,
    body: Option<String>,
}

pub struct TranslationRepository;

impl TranslationRepository {
    /// Load translations for a set of parents, grouped by parent id and sorted
    /// by language.
    pub async fn load<'e, E: PgExecutor<'e>>(
        executor: E,
        table: TranslationTable,
        parent_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Translation>>, DatabaseError> {
        if parent_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT parent_id, language, title, summary, body FROM {} WHERE parent_id = ANY($1) ORDER BY language",
            table.table_name()
        );
        let rows: Vec<TranslationRow> = sqlx::query_as(&sql).bind(parent_ids).fetch_all(executor).await?;

        let mut grouped: HashMap<Uuid, Vec<Translation>> = HashMap::new();
        for row in rows {
            grouped.entry(row.parent_id).or_default().push(Translation {
                language: row.language,
                title: row.title,
                summary: row.summary,
                body: row.body,
            });
        }
        Ok(grouped)
    }

    pub async fn load_one<'e, E: PgExecutor<'e>>(
        executor: E,
        table: TranslationTable,
        parent_id: Uuid,
    ) -> Result<Vec<Translation>, DatabaseError> {
        let mut grouped = Self::load(executor, table, &[parent_id]).await?;
        Ok(grouped.remove(&parent_id).unwrap_or_default())
    }

    /// Replace the full translation set of one parent. Must run inside the
    /// caller's transaction.
    pub async fn replace(
        conn: &mut PgConnection,
        table: TranslationTable,
        parent_id: Uuid,
        translations: &[Translation],
    ) -> Result<(), DatabaseError> {
        let delete = format!("DELETE FROM {} WHERE parent_id = $1", table.table_name());
        sqlx::query(&delete).bind(parent_id).execute(&mut *conn).await?;

        let insert = format!(
            "INSERT INTO {} (parent_id, language, title, summary, body) VALUES ($1, $2, $3, $4, $5)",
            table.table_name()
        );
        for t in translations {
            sqlx::query(&insert)
                .bind(parent_id)
                .bind(&t.language)
                .bind(&t.title)
                .bind(&t.summary)
                .bind(&t.body)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

/// Choose the translation to show: the requested language, then the tenant
/// default, then whatever exists.
pub fn pick_translation<'a>(
    translations: &'a [Translation],
    requested: Option<&str>,
    default_language: &str,
) -> Option<&'a Translation> {
    requested
        .and_then(|lang| translations.iter().find(|t| t.language == lang))
        .or_else(|| translations.iter().find(|t| t.language == default_language))
        .or_else(|| translations.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(language: &str, title: &str) -> Translation {
        Translation {
            language: language.to_string(),
            title: title.to_string(),
            summary: None,
            body: None,
        }
    }

    #[test]
    fn picks_requested_then_default_then_any() {
        let all = vec![t("de", "Startseite"), t("en", "Home"), t("fr", "Accueil")];
        assert_eq!(pick_translation(&all, Some("fr"), "en").unwrap().title, "Accueil");
        assert_eq!(pick_translation(&all, Some("it"), "en").unwrap().title, "Home");
        assert_eq!(pick_translation(&all, None, "en").unwrap().title, "Home");

        let only_de = vec![t("de", "Startseite")];
        assert_eq!(pick_translation(&only_de, Some("en"), "en").unwrap().title, "Startseite");
        assert!(pick_translation(&[], Some("en"), "en").is_none());
    }

    #[test]
    fn table_names_are_fixed() {
        assert_eq!(TranslationTable::Reference.table_name(), "project_reference_translations");
        assert_eq!(TranslationTable::MenuItem.table_name(), "menu_item_translations");
    }
}
