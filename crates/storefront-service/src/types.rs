//! Models of the catalog data served by the CMS.
//!
//! The CMS wraps every payload into `{"data": ..., "meta": ...}`. Fields that are not needed
//! by the storefront are ignored, and everything that can be missing is optional.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Image shown when a product or category has no image.
pub const PLACEHOLDER_IMAGE: &str = "/img/cardimg.png";

/// One rendition of an uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub mime: Option<String>,
}

/// An uploaded image and its renditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: u64,
    pub document_id: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alternative_text: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Renditions keyed by name, e.g. `thumbnail`, `small` or `medium`.
    #[serde(default)]
    pub formats: Option<BTreeMap<String, MediaFormat>>,
}

impl Media {
    /// The URL of the named rendition, falling back to the original image.
    pub fn format_url(&self, format: &str) -> &str {
        self.formats
            .as_ref()
            .and_then(|formats| formats.get(format))
            .map_or(&self.url, |format| &format.url)
    }
}

/// Physical dimensions of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSize {
    pub id: u64,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub depth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u64,
    pub document_id: String,
    pub title: String,
    pub price: f64,
    #[serde(default, rename = "disc_price")]
    pub discount_price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub delivery: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub img: Option<Media>,
    #[serde(default, rename = "SizesOfProduct")]
    pub sizes: Option<ProductSize>,
    #[serde(default)]
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: u64,
    pub document_id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<Media>,
    /// Only present if the products were populated.
    #[serde(default)]
    pub products: Option<Vec<Product>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultSeo {
    pub id: u64,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialMediaLinks {
    pub id: u64,
    #[serde(default, rename = "Instagram")]
    pub instagram: Option<String>,
    #[serde(default, rename = "Telegram")]
    pub telegram: Option<String>,
    // sic, this is how the field is named in the CMS
    #[serde(default, rename = "YouTobe")]
    pub youtube: Option<String>,
    #[serde(default, rename = "Email")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumbers {
    pub id: u64,
    #[serde(default)]
    pub tel1: Option<String>,
    #[serde(default)]
    pub tel2: Option<String>,
}

/// Site-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Global {
    pub id: u64,
    pub document_id: String,
    pub site_name: String,
    #[serde(default)]
    pub site_description: Option<String>,
    #[serde(default)]
    pub favicon: Option<Media>,
    #[serde(default)]
    pub hero_image: Option<Media>,
    #[serde(default)]
    pub default_seo: Option<DefaultSeo>,
    #[serde(default, rename = "Social_Media_Links")]
    pub social_media_links: Option<SocialMediaLinks>,
    #[serde(default, rename = "Phone_Numbers")]
    pub phone_numbers: Option<PhoneNumbers>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub page_count: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListMeta {
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// A response containing a list of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub meta: ListMeta,
}

/// A response containing a single item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleResponse<T> {
    pub data: T,
}

/// Resolves an image URL as returned by the CMS into one that can be displayed.
///
/// Absolute, root-relative and `data:` URLs are kept as they are. Other relative URLs are
/// resolved against `base`, and missing URLs are replaced by [`PLACEHOLDER_IMAGE`].
pub fn resolve_image_url(url: Option<&str>, base: &url::Url) -> String {
    let url = url.map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return PLACEHOLDER_IMAGE.to_owned();
    }
    if url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with('/')
        || url.starts_with("data:")
    {
        return url.to_owned();
    }
    let base = base.as_str().trim_end_matches('/');
    format!("{base}/{url}")
}

/// Formats a price in sum with a `K` or `M` suffix for large amounts.
pub fn format_price_short(price: f64) -> String {
    if price >= 1_000_000.0 {
        format!("{:.1}M sum", price / 1_000_000.0)
    } else if price >= 1_000.0 {
        format!("{:.1}K sum", price / 1_000.0)
    } else {
        format!("{price} sum")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_products() {
        let json = r#"{
            "data": [{
                "id": 3,
                "documentId": "abc123",
                "title": "Sofa",
                "price": 4500000,
                "disc_price": 3990000,
                "quantity": "12",
                "delivery": true,
                "material": "oak",
                "createdAt": "2025-01-01T00:00:00.000Z",
                "img": {
                    "id": 9,
                    "documentId": "img9",
                    "url": "/uploads/sofa.png",
                    "formats": {
                        "thumbnail": {"url": "/uploads/thumbnail_sofa.png", "width": 156, "height": 156}
                    }
                },
                "SizesOfProduct": {"id": 1, "height": "90", "width": 210, "depth": 95}
            }],
            "meta": {"pagination": {"page": 1, "pageSize": 25, "pageCount": 1, "total": 1}}
        }"#;

        let response: ListResponse<Product> = serde_json::from_str(json).unwrap();
        let product = &response.data[0];
        assert_eq!(product.document_id, "abc123");
        assert_eq!(product.discount_price, Some(3_990_000.0));
        assert_eq!(product.sizes.as_ref().unwrap().width, Some(210.0));

        let img = product.img.as_ref().unwrap();
        assert_eq!(img.format_url("thumbnail"), "/uploads/thumbnail_sofa.png");
        assert_eq!(img.format_url("large"), "/uploads/sofa.png");

        assert_eq!(response.meta.pagination.unwrap().total, 1);
    }

    #[test]
    fn test_deserialize_category_without_meta() {
        let json = r#"{"data": [{"id": 1, "documentId": "c1", "name": "Sofas", "slug": "sofas"}]}"#;
        let response: ListResponse<Category> = serde_json::from_str(json).unwrap();
        assert_eq!(response.data[0].slug, "sofas");
        assert!(response.data[0].products.is_none());
        assert!(response.meta.pagination.is_none());
    }

    #[test]
    fn test_resolve_image_url() {
        let base: url::Url = "https://cms.example.com".parse().unwrap();
        assert_eq!(resolve_image_url(None, &base), PLACEHOLDER_IMAGE);
        assert_eq!(resolve_image_url(Some("  "), &base), PLACEHOLDER_IMAGE);
        assert_eq!(
            resolve_image_url(Some("https://cdn.example.com/a.png"), &base),
            "https://cdn.example.com/a.png"
        );
        assert_eq!(
            resolve_image_url(Some("/uploads/a.png"), &base),
            "/uploads/a.png"
        );
        assert_eq!(
            resolve_image_url(Some("data:image/png;base64,AAAA"), &base),
            "data:image/png;base64,AAAA"
        );
        assert_eq!(
            resolve_image_url(Some("uploads/a.png"), &base),
            "https://cms.example.com/uploads/a.png"
        );
    }

    #[test]
    fn test_format_price_short() {
        assert_eq!(format_price_short(4_500_000.0), "4.5M sum");
        assert_eq!(format_price_short(12_500.0), "12.5K sum");
        assert_eq!(format_price_short(999.0), "999 sum");
    }
}
