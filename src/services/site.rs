use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::contact::{ContactInfo, ContactService};
use super::menus::{Menu, MenuItem, MenuService};
use super::offerings::OfferingService;
use super::pages::PageService;
use super::references::{ReferenceFilter, ReferenceService};
use super::seo::{SeoEntry, SeoService};
use super::social::{SocialLink, SocialService};
use super::team::TeamService;
use super::ServiceResult;
use crate::config::MediaConfig;
use crate::database::{pick_translation, Pagination, Translation};
use crate::services::media::public_url;
use crate::tenancy::TenantContext;

/// `?lang=` on public reads
#[derive(Debug, Default, Deserialize)]
pub struct LangQuery {
    pub lang: Option<String>,
}

/// Text of a record in the language chosen for the request
#[derive(Debug, Clone, Serialize)]
pub struct LocalizedText {
    pub language: String,
    pub title: String,
    pub summary: Option<String>,
    pub body: Option<String>,
}

impl LocalizedText {
    fn pick(translations: &[Translation], requested: Option<&str>, default_language: &str) -> Option<Self> {
        pick_translation(translations, requested, default_language).map(|t| LocalizedText {
            language: t.language.clone(),
            title: t.title.clone(),
            summary: t.summary.clone(),
            body: t.body.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SiteInfo {
    pub name: String,
    pub slug: String,
    pub language: String,
    pub default_language: String,
    pub languages: Vec<String>,
    pub contact: ContactInfo,
    pub social: Vec<SocialLink>,
    pub menus: Vec<SiteMenu>,
}

#[derive(Debug, Serialize)]
pub struct SiteMenu {
    pub location: String,
    pub name: String,
    pub items: Vec<SiteMenuItem>,
}

#[derive(Debug, Serialize)]
pub struct SiteMenuItem {
    pub title: Option<String>,
    pub href: Option<String>,
    pub target: String,
    pub children: Vec<SiteMenuItem>,
}

#[derive(Debug, Serialize)]
pub struct SitePage {
    pub slug: String,
    pub template: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub content: Option<LocalizedText>,
}

#[derive(Debug, Serialize)]
pub struct SiteOffering {
    pub slug: String,
    pub icon: Option<String>,
    pub content: Option<LocalizedText>,
}

#[derive(Debug, Serialize)]
pub struct SiteTeamMember {
    pub name: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub content: Option<LocalizedText>,
}

#[derive(Debug, Serialize)]
pub struct SiteReference {
    pub slug: String,
    pub client_name: String,
    pub project_url: Option<String>,
    pub cover_url: Option<String>,
    pub completed_on: Option<chrono::NaiveDate>,
    pub is_featured: bool,
    pub content: Option<LocalizedText>,
}

#[derive(Debug, FromRow)]
pub struct SitemapPage {
    pub slug: String,
    pub updated_at: DateTime<Utc>,
}

/// The enabled language closest to what was asked for
pub fn resolve_language(tenant: &TenantContext, requested: Option<&str>) -> String {
    requested
        .map(|l| l.trim().to_ascii_lowercase())
        .filter(|l| tenant.has_language(l))
        .unwrap_or_else(|| tenant.default_language.clone())
}

/// Read-only views for the public site, localised per request
pub struct SiteService {
    pool: PgPool,
    media: MediaConfig,
}

impl SiteService {
    pub fn new(pool: PgPool, media: MediaConfig) -> Self {
        Self { pool, media }
    }

    pub async fn overview(&self, tenant: &TenantContext, lang: Option<&str>) -> ServiceResult<SiteInfo> {
        let language = resolve_language(tenant, lang);
        let contact = ContactService::new(self.pool.clone()).get(tenant).await?;
        let social = SocialService::new(self.pool.clone()).list(tenant).await?;
        let menus = MenuService::new(self.pool.clone())
            .list(tenant)
            .await?
            .into_iter()
            .map(|menu| localize_menu(menu, &language, &tenant.default_language))
            .collect();

        Ok(SiteInfo {
            name: tenant.name.clone(),
            slug: tenant.slug.clone(),
            language,
            default_language: tenant.default_language.clone(),
            languages: tenant.languages.clone(),
            contact,
            social,
            menus,
        })
    }

    pub async fn page(&self, tenant: &TenantContext, slug: &str, lang: Option<&str>) -> ServiceResult<SitePage> {
        let page = PageService::new(self.pool.clone()).get_published(tenant, slug).await?;
        Ok(SitePage {
            content: LocalizedText::pick(&page.translations, lang, &tenant.default_language),
            slug: page.slug,
            template: page.template,
            published_at: page.published_at,
            updated_at: page.updated_at,
        })
    }

    pub async fn menu(&self, tenant: &TenantContext, location: &str, lang: Option<&str>) -> ServiceResult<SiteMenu> {
        let language = resolve_language(tenant, lang);
        let menu = MenuService::new(self.pool.clone())
            .get_by_location(tenant, location)
            .await?;
        Ok(localize_menu(menu, &language, &tenant.default_language))
    }

    pub async fn offerings(&self, tenant: &TenantContext, lang: Option<&str>) -> ServiceResult<Vec<SiteOffering>> {
        let items = OfferingService::new(self.pool.clone()).list_active(tenant).await?;
        Ok(items
            .into_iter()
            .map(|o| SiteOffering {
                content: LocalizedText::pick(&o.translations, lang, &tenant.default_language),
                slug: o.slug,
                icon: o.icon,
            })
            .collect())
    }

    pub async fn team(&self, tenant: &TenantContext, lang: Option<&str>) -> ServiceResult<Vec<SiteTeamMember>> {
        let members = TeamService::new(self.pool.clone()).list_active(tenant).await?;
        let photos = self.media_urls(tenant, members.iter().filter_map(|m| m.photo_media_id)).await?;
        Ok(members
            .into_iter()
            .map(|m| SiteTeamMember {
                content: LocalizedText::pick(&m.translations, lang, &tenant.default_language),
                photo_url: m.photo_media_id.and_then(|id| lookup(&photos, id)),
                name: m.name,
                email: m.email,
            })
            .collect())
    }

    pub async fn references(
        &self,
        tenant: &TenantContext,
        featured: Option<bool>,
        lang: Option<&str>,
    ) -> ServiceResult<Vec<SiteReference>> {
        let filter = ReferenceFilter { featured };
        let page = ReferenceService::new(self.pool.clone())
            .list(tenant, &filter, Pagination::new(1, crate::database::pagination::MAX_PER_PAGE))
            .await?;
        let covers = self
            .media_urls(tenant, page.items.iter().filter_map(|r| r.cover_media_id))
            .await?;
        Ok(page
            .items
            .into_iter()
            .map(|r| SiteReference {
                content: LocalizedText::pick(&r.translations, lang, &tenant.default_language),
                cover_url: r.cover_media_id.and_then(|id| lookup(&covers, id)),
                slug: r.slug,
                client_name: r.client_name,
                project_url: r.project_url,
                completed_on: r.completed_on,
                is_featured: r.is_featured,
            })
            .collect())
    }

    pub async fn seo(&self, tenant: &TenantContext, path: &str, lang: Option<&str>) -> ServiceResult<SeoEntry> {
        let language = resolve_language(tenant, lang);
        SeoService::new(self.pool.clone())
            .find(tenant, path, Some(&language))
            .await
    }

    pub async fn sitemap(&self, tenant: &TenantContext, host: &str) -> ServiceResult<String> {
        let pages: Vec<SitemapPage> = sqlx::query_as(
            "SELECT slug, updated_at FROM pages WHERE tenant_id = $1 AND status = 'published' ORDER BY sort_order, slug",
        )
        .bind(tenant.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sitemap_xml(host, &tenant.languages, &pages))
    }

    async fn media_urls(
        &self,
        tenant: &TenantContext,
        ids: impl Iterator<Item = Uuid>,
    ) -> ServiceResult<Vec<(Uuid, String)>> {
        let ids: Vec<Uuid> = ids.collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, storage_path FROM media_assets WHERE tenant_id = $1 AND id = ANY($2)")
                .bind(tenant.id)
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, path)| (id, public_url(&self.media.public_base_url, &path)))
            .collect())
    }
}

fn lookup(urls: &[(Uuid, String)], id: Uuid) -> Option<String> {
    urls.iter().find(|(media_id, _)| *media_id == id).map(|(_, url)| url.clone())
}

fn localize_menu(menu: Menu, language: &str, default_language: &str) -> SiteMenu {
    SiteMenu {
        location: menu.location,
        name: menu.name,
        items: localize_items(menu.items, language, default_language),
    }
}

fn localize_items(items: Vec<MenuItem>, language: &str, default_language: &str) -> Vec<SiteMenuItem> {
    items
        .into_iter()
        .map(|item| {
            let href = match (&item.url, &item.page_slug) {
                (Some(url), _) => Some(url.clone()),
                (None, Some(slug)) => Some(format!("/{}/{}", language, slug)),
                // Linked page was deleted
                (None, None) => None,
            };
            SiteMenuItem {
                title: pick_translation(&item.translations, Some(language), default_language).map(|t| t.title.clone()),
                href,
                target: item.target,
                children: localize_items(item.children, language, default_language),
            }
        })
        .collect()
}

/// Escape text for XML element content and attribute values
pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// One `<url>` per published page and enabled language
pub fn sitemap_xml(host: &str, languages: &[String], pages: &[SitemapPage]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for page in pages {
        for language in languages {
            let loc = format!("https://{}/{}/{}", host, language, page.slug);
            xml.push_str("  <url>\n");
            xml.push_str(&format!("    <loc>{}</loc>\n", xml_escape(&loc)));
            xml.push_str(&format!("    <lastmod>{}</lastmod>\n", page.updated_at.format("%Y-%m-%d")));
            xml.push_str("  </url>\n");
        }
    }
    xml.push_str("</urlset>\n");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tenant() -> TenantContext {
        TenantContext {
            id: Uuid::new_v4(),
            slug: "acme".to_string(),
            name: "Acme".to_string(),
            default_language: "en".to_string(),
            languages: vec!["en".to_string(), "de".to_string()],
            plan_id: None,
        }
    }

    #[test]
    fn language_falls_back_to_default() {
        let tenant = tenant();
        assert_eq!(resolve_language(&tenant, Some("de")), "de");
        assert_eq!(resolve_language(&tenant, Some("DE")), "de");
        assert_eq!(resolve_language(&tenant, Some("fr")), "en");
        assert_eq!(resolve_language(&tenant, None), "en");
    }

    #[test]
    fn sitemap_lists_every_language() {
        let pages = vec![SitemapPage {
            slug: "about".to_string(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap(),
        }];
        let xml = sitemap_xml("acme.example", &["en".to_string(), "de".to_string()], &pages);
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<loc>https://acme.example/en/about</loc>"));
        assert!(xml.contains("<loc>https://acme.example/de/about</loc>"));
        assert!(xml.contains("<lastmod>2024-03-09</lastmod>"));
        assert_eq!(xml.matches("<url>").count(), 2);
        assert!(xml.trim_end().ends_with("</urlset>"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(xml_escape("a&b<c>\"'"), "a&amp;b&lt;c&gt;&quot;&apos;");
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[test]
    fn menu_items_link_to_localized_pages() {
        let item = MenuItem {
            id: Uuid::new_v4(),
            page_id: Some(Uuid::new_v4()),
            page_slug: Some("about".to_string()),
            url: None,
            target: "_self".to_string(),
            sort_order: 0,
            translations: vec![
                Translation {
                    language: "en".to_string(),
                    title: "About".to_string(),
                    summary: None,
                    body: None,
                },
                Translation {
                    language: "de".to_string(),
                    title: "Über uns".to_string(),
                    summary: None,
                    body: None,
                },
            ],
            children: Vec::new(),
        };
        let items = localize_items(vec![item], "de", "en");
        assert_eq!(items[0].href.as_deref(), Some("/de/about"));
        assert_eq!(items[0].title.as_deref(), Some("Über uns"));
    }
}
