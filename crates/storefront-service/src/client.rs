use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header;
use serde::de::DeserializeOwned;
use serde_json::Value;
use storefront_cache::RequestCache;
use url::Url;

use crate::config::CmsConfig;
use crate::error::ApiError;
use crate::query::Query;
use crate::types::{Category, Global, ListResponse, Product, SingleResponse};

/// A client for the catalog API of the headless CMS.
///
/// All requests go through a [`RequestCache`], so repeated queries within the configured
/// ttl are answered from memory, and concurrent identical queries result in a single
/// request to the CMS.
///
/// Every request carries the client's locale, and the locale is part of the cache key.
#[derive(Clone, Debug)]
pub struct CmsClient {
    http: reqwest::Client,
    base_url: Url,
    locale: String,
    cache_ttl: Duration,
    cache: RequestCache<Arc<Value>, ApiError>,
}

impl CmsClient {
    /// Creates a new client from the given configuration.
    pub fn new(config: &CmsConfig) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.clone(),
            locale: config.locale.clone(),
            cache_ttl: config.cache_ttl,
            cache: RequestCache::new(),
        })
    }

    /// The base URL of the CMS.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The locale sent along with every request.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Switches the locale for subsequent requests.
    ///
    /// Responses cached for the previous locale are kept, and are used again when
    /// switching back.
    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
    }

    /// The request cache backing this client.
    pub fn cache(&self) -> &RequestCache<Arc<Value>, ApiError> {
        &self.cache
    }

    /// The cache key for `query` in the current locale.
    pub fn cache_key(&self, query: &Query) -> String {
        format!("{}:{}", self.locale, query.cache_key())
    }

    /// The full URL that is requested for `query`, including the locale.
    pub fn url(&self, query: &Query) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Request(format!("cannot use {} as base URL", self.base_url)))?
            .pop_if_empty()
            .extend(query.path_segments());
        url.query_pairs_mut()
            .extend_pairs(query.params())
            .append_pair("locale", &self.locale);
        Ok(url)
    }

    /// Fetches the raw JSON response for `query`.
    ///
    /// The response is served from the request cache if possible.
    pub async fn fetch(&self, query: &Query) -> Result<Arc<Value>, ApiError> {
        query.validate()?;

        let key = self.cache_key(query);
        let url = self.url(query)?;
        let kind = query.kind();

        let http = self.http.clone();
        self.cache
            .get_or_compute(&key, move || fetch_json(http, url, kind), self.cache_ttl)
            .await
    }

    /// Fetches `query` and decodes the response.
    pub async fn fetch_as<T: DeserializeOwned>(&self, query: &Query) -> Result<T, ApiError> {
        let value = self.fetch(query).await?;
        Ok(T::deserialize(value.as_ref())?)
    }

    /// Invalidates the cached response for `query` in the current locale, or all cached
    /// responses if `query` is `None`.
    pub fn invalidate(&self, query: Option<&Query>) {
        match query {
            Some(query) => self.cache.invalidate(Some(&self.cache_key(query))),
            None => self.cache.invalidate(None),
        }
    }

    pub async fn products(&self) -> Result<ListResponse<Product>, ApiError> {
        self.fetch_as(&Query::Products).await
    }

    pub async fn product(&self, document_id: &str) -> Result<SingleResponse<Product>, ApiError> {
        let query = Query::Product {
            document_id: document_id.into(),
        };
        self.fetch_as(&query).await
    }

    pub async fn products_by_material(
        &self,
        material: &str,
    ) -> Result<ListResponse<Product>, ApiError> {
        let query = Query::ProductsByMaterial {
            material: material.into(),
        };
        self.fetch_as(&query).await
    }

    pub async fn products_by_category_slug(
        &self,
        slug: &str,
    ) -> Result<ListResponse<Product>, ApiError> {
        let query = Query::ProductsByCategorySlug { slug: slug.into() };
        self.fetch_as(&query).await
    }

    pub async fn products_by_category_ids(
        &self,
        ids: &[u64],
    ) -> Result<ListResponse<Product>, ApiError> {
        let query = Query::ProductsByCategoryIds { ids: ids.to_vec() };
        self.fetch_as(&query).await
    }

    pub async fn categories(&self) -> Result<ListResponse<Category>, ApiError> {
        self.fetch_as(&Query::Categories).await
    }

    pub async fn categories_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<ListResponse<Category>, ApiError> {
        self.fetch_as(&Query::CategoriesPage { page, page_size })
            .await
    }

    pub async fn category(&self, document_id: &str) -> Result<SingleResponse<Category>, ApiError> {
        let query = Query::Category {
            document_id: document_id.into(),
        };
        self.fetch_as(&query).await
    }

    /// Looks up a category by slug.
    ///
    /// The CMS answers slug lookups with a list, which is empty if there is no such category.
    pub async fn category_by_slug(&self, slug: &str) -> Result<ListResponse<Category>, ApiError> {
        let query = Query::CategoryBySlug { slug: slug.into() };
        self.fetch_as(&query).await
    }

    pub async fn category_with_products(
        &self,
        slug: &str,
    ) -> Result<ListResponse<Category>, ApiError> {
        let query = Query::CategoryWithProducts { slug: slug.into() };
        self.fetch_as(&query).await
    }

    pub async fn global(&self) -> Result<SingleResponse<Global>, ApiError> {
        self.fetch_as(&Query::Global).await
    }
}

/// Performs a single GET request against the CMS and parses the JSON body.
///
/// Only runs on a cache miss, so `cms.requests` counts actual requests to the CMS.
async fn fetch_json(
    http: reqwest::Client,
    url: Url,
    kind: &'static str,
) -> Result<Arc<Value>, ApiError> {
    tracing::debug!(%url, "Fetching from CMS");
    metric!(counter("cms.requests") += 1, "query" => kind);
    let start = Instant::now();

    let result = async {
        let response = http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.json::<Value>().await.ok();
            return Err(ApiError::from_status(status.as_u16(), body.as_ref()));
        }

        let body = response.bytes().await?;
        Ok(Arc::new(serde_json::from_slice(&body)?))
    }
    .await;

    metric!(timer("cms.request.duration") = start.elapsed(), "query" => kind);
    if let Err(err) = &result {
        metric!(counter("cms.errors") += 1, "query" => kind, "error" => err.kind());
        tracing::warn!(
            error = err as &dyn std::error::Error,
            %url,
            "Failed to fetch from CMS"
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CmsClient {
        let config = CmsConfig {
            url: "http://cms.test".parse().unwrap(),
            ..Default::default()
        };
        CmsClient::new(&config).unwrap()
    }

    #[test]
    fn test_query_urls() {
        let client = client();

        let url = client.url(&Query::Products).unwrap();
        insta::assert_snapshot!(url, @"http://cms.test/api/products?populate=img&locale=ru");

        let query = Query::Product {
            document_id: "abc123".into(),
        };
        let url = client.url(&query).unwrap();
        insta::assert_snapshot!(url, @"http://cms.test/api/products/abc123?populate=*&locale=ru");

        let query = Query::ProductsByMaterial {
            material: "oak".into(),
        };
        let url = client.url(&query).unwrap();
        insta::assert_snapshot!(url, @"http://cms.test/api/products?populate=img&filters%5Bmaterial%5D%5B%24eq%5D=oak&locale=ru");

        let query = Query::CategoriesPage {
            page: 2,
            page_size: 10,
        };
        let url = client.url(&query).unwrap();
        insta::assert_snapshot!(url, @"http://cms.test/api/categories?populate=image&pagination%5Bpage%5D=2&pagination%5BpageSize%5D=10&locale=ru");
    }

    #[test]
    fn test_url_escapes_path() {
        let client = client();
        let query = Query::Category {
            document_id: "../admin".into(),
        };
        let url = client.url(&query).unwrap();
        assert_eq!(url.path(), "/api/categories/..%2Fadmin");
    }

    #[test]
    fn test_url_keeps_base_path() {
        let config = CmsConfig {
            url: "http://cms.test/strapi/".parse().unwrap(),
            ..Default::default()
        };
        let client = CmsClient::new(&config).unwrap();
        let url = client.url(&Query::Global).unwrap();
        assert_eq!(url.path(), "/strapi/api/global");
    }

    #[test]
    fn test_cache_key_includes_locale() {
        let mut client = client();
        assert_eq!(client.cache_key(&Query::Global), "ru:global?populate=*");

        client.set_locale("uz");
        assert_eq!(client.cache_key(&Query::Global), "uz:global?populate=*");
        assert!(client.url(&Query::Global).unwrap().as_str().ends_with("locale=uz"));
    }
}
