use anyhow::{Context, Result};
use prettytable::format::consts::FORMAT_CLEAN;
use prettytable::{Row, Table, cell, row};
use serde::de::DeserializeOwned;
use serde_json::Value;
use storefront_service::Query;
use storefront_service::types::{
    Category, Global, ListResponse, Product, SingleResponse, format_price_short,
    resolve_image_url,
};
use url::Url;

pub fn print_json(response: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

/// Prints the response to `query` as tables.
///
/// `base_url` is used to resolve relative image URLs.
pub fn print_compact(query: &Query, response: &Value, base_url: &Url) -> Result<()> {
    for table in compact_tables(query, response, base_url)? {
        table.printstd();
        println!();
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(response: &Value) -> Result<T> {
    T::deserialize(response).context("unexpected response from the CMS")
}

fn compact_tables(query: &Query, response: &Value, base_url: &Url) -> Result<Vec<Table>> {
    let tables = match query {
        Query::Products
        | Query::ProductsByMaterial { .. }
        | Query::ProductsByCategorySlug { .. }
        | Query::ProductsByCategoryIds { .. } => {
            let response: ListResponse<Product> = decode(response)?;
            vec![products_table(&response.data, base_url)]
        }
        Query::Product { .. } => {
            let response: SingleResponse<Product> = decode(response)?;
            vec![product_table(&response.data, base_url)]
        }
        Query::Categories | Query::CategoriesPage { .. } | Query::CategoryBySlug { .. } => {
            let response: ListResponse<Category> = decode(response)?;
            vec![categories_table(&response.data, base_url)]
        }
        Query::CategoryWithProducts { .. } => {
            let response: ListResponse<Category> = decode(response)?;
            let mut tables = vec![categories_table(&response.data, base_url)];
            for category in &response.data {
                if let Some(products) = &category.products {
                    tables.push(products_table(products, base_url));
                }
            }
            tables
        }
        Query::Category { .. } => {
            let response: SingleResponse<Category> = decode(response)?;
            vec![categories_table(std::slice::from_ref(&response.data), base_url)]
        }
        Query::Global => {
            let response: SingleResponse<Global> = decode(response)?;
            vec![global_table(&response.data, base_url)]
        }
    };
    Ok(tables)
}

fn price(product: &Product) -> String {
    match product.discount_price {
        Some(discount) => format!(
            "{} (was {})",
            format_price_short(discount),
            format_price_short(product.price)
        ),
        None => format_price_short(product.price),
    }
}

fn products_table(products: &[Product], base_url: &Url) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);
    table.set_titles(row![b => "Id", "Title", "Price", "Material", "Image"]);

    for product in products {
        let mut row = Row::empty();
        row.add_cell(cell!(product.document_id));
        row.add_cell(cell!(product.title));
        row.add_cell(cell!(price(product)));
        row.add_cell(cell!(product.material.as_deref().unwrap_or_default()));

        let image = product.img.as_ref().map(|img| img.format_url("thumbnail"));
        row.add_cell(cell!(resolve_image_url(image, base_url)));

        table.add_row(row);
    }

    table
}

fn product_table(product: &Product, base_url: &Url) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);

    table.add_row(Row::new(vec![cell!(b->product.title)]));
    table.add_row(row![r->"  Id:", product.document_id]);
    table.add_row(row![r->"  Price:", price(product)]);
    if let Some(material) = &product.material {
        table.add_row(row![r->"  Material:", material]);
    }
    if let Some(quantity) = &product.quantity {
        table.add_row(row![r->"  In stock:", quantity]);
    }
    table.add_row(row![r->"  Delivery:", if product.delivery { "yes" } else { "no" }]);
    if let Some(sizes) = &product.sizes {
        let dimension = |d: Option<String>| d.unwrap_or_else(|| "?".into());
        table.add_row(row![
            r->"  Size:",
            format!(
                "{} x {} x {}",
                dimension(sizes.width.map(|w| w.to_string())),
                dimension(sizes.depth.map(|d| d.to_string())),
                dimension(sizes.height.clone()),
            )
        ]);
    }
    let image = product.img.as_ref().map(|img| img.url.as_str());
    table.add_row(row![r->"  Image:", resolve_image_url(image, base_url)]);
    if let Some(description) = &product.description {
        table.add_row(row![r->"  Description:", description]);
    }

    table
}

fn categories_table(categories: &[Category], base_url: &Url) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);
    table.set_titles(row![b => "Id", "Name", "Slug", "Products", "Image"]);

    for category in categories {
        let products = category
            .products
            .as_ref()
            .map(|products| products.len().to_string())
            .unwrap_or_default();
        let image = category.image.as_ref().map(|img| img.format_url("thumbnail"));

        table.add_row(row![
            category.document_id,
            category.name,
            category.slug,
            products,
            resolve_image_url(image, base_url)
        ]);
    }

    table
}

fn global_table(global: &Global, base_url: &Url) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);

    table.add_row(Row::new(vec![cell!(b->global.site_name)]));
    if let Some(description) = &global.site_description {
        table.add_row(row![r->"  Description:", description]);
    }
    let hero = global.hero_image.as_ref().map(|img| img.url.as_str());
    table.add_row(row![r->"  Hero image:", resolve_image_url(hero, base_url)]);

    if let Some(phones) = &global.phone_numbers {
        for phone in [&phones.tel1, &phones.tel2].into_iter().flatten() {
            table.add_row(row![r->"  Phone:", phone]);
        }
    }
    if let Some(links) = &global.social_media_links {
        let links = [
            ("  Instagram:", &links.instagram),
            ("  Telegram:", &links.telegram),
            ("  YouTube:", &links.youtube),
            ("  Email:", &links.email),
        ];
        for (name, link) in links {
            if let Some(link) = link {
                table.add_row(row![r->name, link]);
            }
        }
    }

    table
}
