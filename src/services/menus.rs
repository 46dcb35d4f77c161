use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{validate, ServiceError, ServiceResult};
use crate::database::{Translation, TranslationRepository, TranslationTable};
use crate::tenancy::TenantContext;

pub const MAX_MENU_DEPTH: usize = 3;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Menu {
    pub id: Uuid,
    pub location: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<MenuItem>,
}

const MENU_COLUMNS: &str = "id, location, name, created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub page_id: Option<Uuid>,
    /// Slug of the linked page, when the item points at one
    pub page_slug: Option<String>,
    pub url: Option<String>,
    pub target: String,
    pub sort_order: i32,
    pub translations: Vec<Translation>,
    pub children: Vec<MenuItem>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MenuItemRow {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub page_id: Option<Uuid>,
    pub page_slug: Option<String>,
    pub url: Option<String>,
    pub target: String,
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct MenuInput {
    pub location: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MenuItemInput {
    #[serde(default)]
    pub page_id: Option<Uuid>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_target")]
    pub target: String,
    pub translations: Vec<Translation>,
    #[serde(default)]
    pub children: Vec<MenuItemInput>,
}

fn default_target() -> String {
    "_self".to_string()
}

/// One item of a tree laid out for insertion, parents before children
#[derive(Debug)]
pub struct FlatItem<'a> {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
    pub input: &'a MenuItemInput,
}

pub struct MenuService {
    pool: PgPool,
}

impl MenuService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All menus with their item trees
    pub async fn list(&self, tenant: &TenantContext) -> ServiceResult<Vec<Menu>> {
        let sql = format!("SELECT {} FROM menus WHERE tenant_id = $1 ORDER BY location", MENU_COLUMNS);
        let mut menus: Vec<Menu> = sqlx::query_as(&sql).bind(tenant.id).fetch_all(&self.pool).await?;
        for menu in menus.iter_mut() {
            menu.items = self.load_items(menu.id).await?;
        }
        Ok(menus)
    }

    pub async fn get(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<Menu> {
        let sql = format!("SELECT {} FROM menus WHERE id = $1 AND tenant_id = $2", MENU_COLUMNS);
        let mut menu: Menu = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Menu"))?;
        menu.items = self.load_items(menu.id).await?;
        Ok(menu)
    }

    pub async fn get_by_location(&self, tenant: &TenantContext, location: &str) -> ServiceResult<Menu> {
        let sql = format!("SELECT {} FROM menus WHERE tenant_id = $1 AND location = $2", MENU_COLUMNS);
        let mut menu: Menu = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(location)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Menu"))?;
        menu.items = self.load_items(menu.id).await?;
        Ok(menu)
    }

    pub async fn create(&self, tenant: &TenantContext, input: MenuInput) -> ServiceResult<Menu> {
        validate::slug("location", &input.location)?;
        validate::not_blank("name", &input.name)?;
        let sql = format!(
            "INSERT INTO menus (tenant_id, location, name) VALUES ($1, $2, $3) RETURNING {}",
            MENU_COLUMNS
        );
        let menu: Menu = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(&input.location)
            .bind(input.name.trim())
            .fetch_one(&self.pool)
            .await?;
        Ok(menu)
    }

    pub async fn update(&self, tenant: &TenantContext, id: Uuid, input: MenuInput) -> ServiceResult<Menu> {
        validate::slug("location", &input.location)?;
        validate::not_blank("name", &input.name)?;
        let sql = format!(
            r#"
            UPDATE menus SET location = $3, name = $4, updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            MENU_COLUMNS
        );
        let mut menu: Menu = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(&input.location)
            .bind(input.name.trim())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Menu"))?;
        menu.items = self.load_items(id).await?;
        Ok(menu)
    }

    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM menus WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Menu"));
        }
        Ok(())
    }

    /// Replace the whole item tree of a menu in one transaction
    pub async fn replace_items(
        &self,
        tenant: &TenantContext,
        menu_id: Uuid,
        items: Vec<MenuItemInput>,
    ) -> ServiceResult<Menu> {
        validate_tree(tenant, &items)?;
        let page_ids = collect_page_ids(&items);
        if !page_ids.is_empty() {
            let found: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE tenant_id = $1 AND id = ANY($2)")
                    .bind(tenant.id)
                    .bind(&page_ids)
                    .fetch_one(&self.pool)
                    .await?;
            if found != page_ids.len() as i64 {
                return Err(ServiceError::validation("page_id", "linked page does not exist"));
            }
        }

        let mut tx = self.pool.begin().await?;
        let owned: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM menus WHERE id = $1 AND tenant_id = $2 FOR UPDATE")
                .bind(menu_id)
                .bind(tenant.id)
                .fetch_optional(&mut *tx)
                .await?;
        if owned.is_none() {
            return Err(ServiceError::NotFound("Menu"));
        }

        sqlx::query("DELETE FROM menu_items WHERE menu_id = $1")
            .bind(menu_id)
            .execute(&mut *tx)
            .await?;
        for item in flatten_tree(&items) {
            sqlx::query(
                r#"
                INSERT INTO menu_items (id, menu_id, parent_id, page_id, url, target, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id)
            .bind(menu_id)
            .bind(item.parent_id)
            .bind(item.input.page_id)
            .bind(&item.input.url)
            .bind(&item.input.target)
            .bind(item.sort_order)
            .execute(&mut *tx)
            .await?;
            TranslationRepository::replace(&mut tx, TranslationTable::MenuItem, item.id, &item.input.translations)
                .await?;
        }
        sqlx::query("UPDATE menus SET updated_at = now() WHERE id = $1")
            .bind(menu_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get(tenant, menu_id).await
    }

    async fn load_items(&self, menu_id: Uuid) -> ServiceResult<Vec<MenuItem>> {
        let rows: Vec<MenuItemRow> = sqlx::query_as(
            r#"
            SELECT mi.id, mi.parent_id, mi.page_id, p.slug AS page_slug, mi.url, mi.target, mi.sort_order
            FROM menu_items mi
            LEFT JOIN pages p ON p.id = mi.page_id
            WHERE mi.menu_id = $1
            ORDER BY mi.sort_order
            "#,
        )
        .bind(menu_id)
        .fetch_all(&self.pool)
        .await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let translations = TranslationRepository::load(&self.pool, TranslationTable::MenuItem, &ids).await?;
        Ok(build_tree(rows, translations))
    }
}

/// Check every item of a submitted tree
pub fn validate_tree(tenant: &TenantContext, items: &[MenuItemInput]) -> ServiceResult<()> {
    let mut stack: Vec<(&MenuItemInput, usize)> = items.iter().map(|i| (i, 1)).collect();
    while let Some((item, depth)) = stack.pop() {
        if depth > MAX_MENU_DEPTH {
            return Err(ServiceError::validation(
                "items",
                format!("menus can be nested at most {} levels deep", MAX_MENU_DEPTH),
            ));
        }
        match (&item.page_id, &item.url) {
            (Some(_), None) => {}
            (None, Some(url)) => {
                if !url.starts_with('/') || url.starts_with("//") {
                    validate::http_url("url", url)?;
                }
            }
            _ => {
                return Err(ServiceError::validation(
                    "items",
                    "each item needs either a page_id or a url",
                ))
            }
        }
        if !matches!(item.target.as_str(), "_self" | "_blank") {
            return Err(ServiceError::validation("target", "must be '_self' or '_blank'"));
        }
        validate::translations(tenant, &item.translations, true)?;
        stack.extend(item.children.iter().map(|c| (c, depth + 1)));
    }
    Ok(())
}

pub fn collect_page_ids(items: &[MenuItemInput]) -> Vec<Uuid> {
    let mut ids = HashSet::new();
    let mut stack: Vec<&MenuItemInput> = items.iter().collect();
    while let Some(item) = stack.pop() {
        if let Some(id) = item.page_id {
            ids.insert(id);
        }
        stack.extend(item.children.iter());
    }
    ids.into_iter().collect()
}

/// Assign ids and lay the tree out so that every parent precedes its children.
/// `sort_order` is the position among siblings.
pub fn flatten_tree(items: &[MenuItemInput]) -> Vec<FlatItem<'_>> {
    let mut flat = Vec::new();
    let mut queue: Vec<(Option<Uuid>, &[MenuItemInput])> = vec![(None, items)];
    while let Some((parent_id, siblings)) = queue.pop() {
        for (position, input) in siblings.iter().enumerate() {
            let id = Uuid::new_v4();
            flat.push(FlatItem {
                id,
                parent_id,
                sort_order: position as i32,
                input,
            });
            if !input.children.is_empty() {
                queue.push((Some(id), input.children.as_slice()));
            }
        }
    }
    flat
}

/// Rebuild the nested tree from flat rows ordered by `sort_order`
pub fn build_tree(rows: Vec<MenuItemRow>, mut translations: HashMap<Uuid, Vec<Translation>>) -> Vec<MenuItem> {
    let mut children: HashMap<Option<Uuid>, Vec<MenuItemRow>> = HashMap::new();
    for row in rows {
        children.entry(row.parent_id).or_default().push(row);
    }

    fn attach(
        parent: Option<Uuid>,
        children: &mut HashMap<Option<Uuid>, Vec<MenuItemRow>>,
        translations: &mut HashMap<Uuid, Vec<Translation>>,
    ) -> Vec<MenuItem> {
        let rows = children.remove(&parent).unwrap_or_default();
        rows.into_iter()
            .map(|row| MenuItem {
                children: attach(Some(row.id), children, translations),
                translations: translations.remove(&row.id).unwrap_or_default(),
                id: row.id,
                page_id: row.page_id,
                page_slug: row.page_slug,
                url: row.url,
                target: row.target,
                sort_order: row.sort_order,
            })
            .collect()
    }

    attach(None, &mut children, &mut translations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantContext {
        TenantContext {
            id: Uuid::new_v4(),
            slug: "acme".to_string(),
            name: "Acme".to_string(),
            default_language: "en".to_string(),
            languages: vec!["en".to_string()],
            plan_id: None,
        }
    }

    fn link(url: &str, children: Vec<MenuItemInput>) -> MenuItemInput {
        MenuItemInput {
            page_id: None,
            url: Some(url.to_string()),
            target: default_target(),
            translations: vec![Translation {
                language: "en".to_string(),
                title: url.to_string(),
                summary: None,
                body: None,
            }],
            children,
        }
    }

    #[test]
    fn depth_is_limited() {
        let tenant = tenant();
        let three = vec![link("/a", vec![link("/b", vec![link("/c", vec![])])])];
        assert!(validate_tree(&tenant, &three).is_ok());

        let four = vec![link("/a", vec![link("/b", vec![link("/c", vec![link("/d", vec![])])])])];
        assert!(validate_tree(&tenant, &four).is_err());
    }

    #[test]
    fn items_need_exactly_one_target() {
        let tenant = tenant();
        let mut both = link("/a", vec![]);
        both.page_id = Some(Uuid::new_v4());
        assert!(validate_tree(&tenant, &[both]).is_err());

        let mut neither = link("/a", vec![]);
        neither.url = None;
        assert!(validate_tree(&tenant, &[neither]).is_err());

        assert!(validate_tree(&tenant, &[link("https://example.com", vec![])]).is_ok());
        assert!(validate_tree(&tenant, &[link("javascript:alert(1)", vec![])]).is_err());
        assert!(validate_tree(&tenant, &[link("//evil.example", vec![])]).is_err());
    }

    #[test]
    fn flatten_then_build_keeps_shape() {
        let tree = vec![
            link("/a", vec![link("/a1", vec![]), link("/a2", vec![])]),
            link("/b", vec![]),
        ];
        let flat = flatten_tree(&tree);
        assert_eq!(flat.len(), 4);

        // Parents are laid out before their children
        let mut seen = HashSet::new();
        for item in &flat {
            if let Some(parent) = item.parent_id {
                assert!(seen.contains(&parent));
            }
            seen.insert(item.id);
        }

        let mut rows: Vec<MenuItemRow> = flat
            .iter()
            .map(|f| MenuItemRow {
                id: f.id,
                parent_id: f.parent_id,
                page_id: None,
                page_slug: None,
                url: f.input.url.clone(),
                target: f.input.target.clone(),
                sort_order: f.sort_order,
            })
            .collect();
        rows.sort_by_key(|r| r.sort_order);

        let built = build_tree(rows, HashMap::new());
        assert_eq!(built.len(), 2);
        assert_eq!(built[0].url.as_deref(), Some("/a"));
        assert_eq!(built[0].children.len(), 2);
        assert_eq!(built[0].children[1].url.as_deref(), Some("/a2"));
        assert!(built[1].children.is_empty());
    }

    #[test]
    fn page_ids_are_deduplicated() {
        let page = Uuid::new_v4();
        let mut a = link("/a", vec![]);
        a.url = None;
        a.page_id = Some(page);
        let mut b = a.clone();
        b.children = vec![a.clone()];
        assert_eq!(collect_page_ids(&[a, b]), vec![page]);
    }
}
