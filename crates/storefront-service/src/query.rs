//! Typed descriptions of the catalog queries sent to the CMS.
//!
//! Every [`Query`] maps to exactly one cache key and one API request, so two different
//! queries can never collide in the request cache.

use std::fmt;

use crate::error::ApiError;

/// A catalog query against the CMS REST API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// All products, with their main image.
    Products,
    /// A single product with all relations.
    Product { document_id: String },
    /// Products made of the given material.
    ProductsByMaterial { material: String },
    /// Products belonging to the category with the given slug.
    ProductsByCategorySlug { slug: String },
    /// Products belonging to any of the given categories.
    ProductsByCategoryIds { ids: Vec<u64> },
    /// All categories, with their image.
    Categories,
    /// One page of categories.
    CategoriesPage { page: u32, page_size: u32 },
    /// A single category.
    Category { document_id: String },
    /// The category with the given slug.
    CategoryBySlug { slug: String },
    /// The category with the given slug, including its products.
    CategoryWithProducts { slug: String },
    /// The global site settings.
    Global,
}

impl Query {
    /// A short, static name for the kind of query, used to tag metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Products => "products",
            Query::Product { .. } => "product",
            Query::ProductsByMaterial { .. } => "products_by_material",
            Query::ProductsByCategorySlug { .. } => "products_by_category_slug",
            Query::ProductsByCategoryIds { .. } => "products_by_category_ids",
            Query::Categories => "categories",
            Query::CategoriesPage { .. } => "categories_page",
            Query::Category { .. } => "category",
            Query::CategoryBySlug { .. } => "category_by_slug",
            Query::CategoryWithProducts { .. } => "category_with_products",
            Query::Global => "global",
        }
    }

    /// Rejects queries that cannot match anything.
    pub fn validate(&self) -> Result<(), ApiError> {
        match self {
            Query::Product { document_id } | Query::Category { document_id }
                if document_id.is_empty() =>
            {
                Err(ApiError::InvalidQuery("empty document id"))
            }
            Query::ProductsByMaterial { material } if material.is_empty() => {
                Err(ApiError::InvalidQuery("empty material"))
            }
            Query::ProductsByCategorySlug { slug }
            | Query::CategoryBySlug { slug }
            | Query::CategoryWithProducts { slug }
                if slug.is_empty() =>
            {
                Err(ApiError::InvalidQuery("empty slug"))
            }
            Query::ProductsByCategoryIds { ids } if ids.is_empty() => {
                Err(ApiError::InvalidQuery("no category ids"))
            }
            Query::CategoriesPage { page, page_size } if *page == 0 || *page_size == 0 => {
                Err(ApiError::InvalidQuery("pages start at 1 and cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// The cache key of this query, not including the locale.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }

    /// The path segments of the API endpoint, relative to the CMS base URL.
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            Query::Products
            | Query::ProductsByMaterial { .. }
            | Query::ProductsByCategorySlug { .. }
            | Query::ProductsByCategoryIds { .. } => vec!["api", "products"],
            Query::Product { document_id } => vec!["api", "products", document_id.as_str()],
            Query::Categories
            | Query::CategoriesPage { .. }
            | Query::CategoryBySlug { .. }
            | Query::CategoryWithProducts { .. } => vec!["api", "categories"],
            Query::Category { document_id } => vec!["api", "categories", document_id.as_str()],
            Query::Global => vec!["api", "global"],
        }
    }

    /// The query parameters of the API request, in order.
    pub fn params(&self) -> Vec<(String, String)> {
        fn param(key: &str, value: impl ToString) -> (String, String) {
            (key.to_owned(), value.to_string())
        }

        match self {
            Query::Products => vec![param("populate", "img")],
            Query::Product { .. } | Query::Global => vec![param("populate", "*")],
            Query::ProductsByMaterial { material } => vec![
                param("populate", "img"),
                param("filters[material][$eq]", material),
            ],
            Query::ProductsByCategorySlug { slug } => vec![
                param("filters[category][slug][$eq]", slug),
                param("populate", "img"),
            ],
            Query::ProductsByCategoryIds { ids } => ids
                .iter()
                .enumerate()
                .map(|(index, id)| param(&format!("filters[category][id][$in][{index}]"), id))
                .chain([param("populate", "img")])
                .collect(),
            Query::Categories | Query::Category { .. } => vec![param("populate", "image")],
            Query::CategoriesPage { page, page_size } => vec![
                param("populate", "image"),
                param("pagination[page]", page),
                param("pagination[pageSize]", page_size),
            ],
            Query::CategoryBySlug { slug } => vec![
                param("populate", "image"),
                param("filters[slug][$eq]", slug),
            ],
            Query::CategoryWithProducts { slug } => vec![
                param("filters[slug][$eq]", slug),
                param("populate", "products"),
            ],
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Products => f.write_str("products?populate=img"),
            Query::Product { document_id } => write!(f, "product:{document_id}"),
            Query::ProductsByMaterial { material } => write!(f, "products-by-material:{material}"),
            Query::ProductsByCategorySlug { slug } => write!(f, "products-by-category:{slug}"),
            Query::ProductsByCategoryIds { ids } => {
                f.write_str("products-by-category-ids:")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{id}")?;
                }
                Ok(())
            }
            Query::Categories => f.write_str("categories?populate=image"),
            Query::CategoriesPage { page, page_size } => {
                write!(f, "categories:page={page}:size={page_size}")
            }
            Query::Category { document_id } => write!(f, "category:{document_id}"),
            Query::CategoryBySlug { slug } => write!(f, "category-by-slug:{slug}"),
            Query::CategoryWithProducts { slug } => write!(f, "category-with-products:{slug}"),
            Query::Global => f.write_str("global?populate=*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys() {
        assert_eq!(Query::Products.cache_key(), "products?populate=img");
        assert_eq!(
            Query::ProductsByCategoryIds { ids: vec![3, 1, 2] }.cache_key(),
            "products-by-category-ids:3,1,2"
        );
        assert_eq!(
            Query::CategoriesPage {
                page: 2,
                page_size: 25
            }
            .cache_key(),
            "categories:page=2:size=25"
        );
    }

    #[test]
    fn test_distinct_queries_have_distinct_keys() {
        let queries = [
            Query::Products,
            Query::Product {
                document_id: "sofa".into(),
            },
            Query::ProductsByMaterial {
                material: "sofa".into(),
            },
            Query::ProductsByCategorySlug { slug: "sofa".into() },
            Query::ProductsByCategoryIds { ids: vec![1] },
            Query::Categories,
            Query::CategoriesPage {
                page: 1,
                page_size: 25,
            },
            Query::Category {
                document_id: "sofa".into(),
            },
            Query::CategoryBySlug { slug: "sofa".into() },
            Query::CategoryWithProducts { slug: "sofa".into() },
            Query::Global,
        ];
        let keys: std::collections::HashSet<_> = queries.iter().map(Query::cache_key).collect();
        assert_eq!(keys.len(), queries.len());
    }

    #[test]
    fn test_validate() {
        assert!(Query::Products.validate().is_ok());
        assert_eq!(
            Query::CategoryBySlug { slug: "".into() }.validate(),
            Err(ApiError::InvalidQuery("empty slug"))
        );
        assert_eq!(
            Query::ProductsByCategoryIds { ids: vec![] }.validate(),
            Err(ApiError::InvalidQuery("no category ids"))
        );
        assert!(
            Query::Product {
                document_id: String::new()
            }
            .validate()
            .is_err()
        );
        assert!(
            Query::CategoriesPage {
                page: 0,
                page_size: 25
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_category_ids_params() {
        let params = Query::ProductsByCategoryIds { ids: vec![7, 9] }.params();
        assert_eq!(
            params,
            vec![
                ("filters[category][id][$in][0]".to_owned(), "7".to_owned()),
                ("filters[category][id][$in][1]".to_owned(), "9".to_owned()),
                ("populate".to_owned(), "img".to_owned()),
            ]
        );
    }
}
