use std::{process, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;
use vitrine::{
    application::{
        catalog::Catalog,
        error::CatalogError,
        filter::{CategoryFilter, FilterState},
    },
    config::{self, Command, CreateProductArgs, LoadError, ProductsArgs, Settings, UpdateProductArgs},
    domain::entities::{CategoryDraft, ProductDraft, ProductPatch},
    infra::{
        error::InfraError,
        http::HttpGateway,
        repositories::{GatewayCategoriesRepo, GatewayProductsRepo},
        telemetry,
    },
};

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_error(&error);
        process::exit(1);
    }
}

fn report_error(error: &CliError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "command failed");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "command failed");
    });
}

async fn run() -> Result<(), CliError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let catalog = build_catalog(&settings)?;

    match cli_args.command {
        Command::Products(args) => print_json(&catalog.filtered_products(&filter_state(args)).await?),
        Command::Product { id } => print_json(&catalog.product(id).await?),
        Command::Categories => print_json(&*catalog.categories().await?),
        Command::CreateProduct(args) => print_json(&catalog.create_product(draft(args)).await?),
        Command::UpdateProduct(args) => {
            let (id, patch) = patch(args);
            print_json(&catalog.update_product(id, patch).await?)
        }
        Command::DeleteProduct { id } => {
            catalog.delete_product(id).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Command::CreateCategory { name } => {
            print_json(&catalog.create_category(CategoryDraft::new(name)).await?)
        }
    }
}

fn build_catalog(settings: &Settings) -> Result<Catalog, InfraError> {
    let gateway = Arc::new(HttpGateway::new(
        &settings.api.base_url,
        settings.api.timeout,
    )?);
    let products = Arc::new(GatewayProductsRepo::new(gateway.clone()));
    let categories = Arc::new(GatewayCategoriesRepo::new(gateway));
    Ok(Catalog::new(products, categories, settings.cache.clone()))
}

fn filter_state(args: ProductsArgs) -> FilterState {
    let category = args
        .category
        .as_deref()
        .map(CategoryFilter::parse)
        .unwrap_or_default();
    FilterState::default()
        .with_search(args.search.unwrap_or_default())
        .with_category(category)
}

fn draft(args: CreateProductArgs) -> ProductDraft {
    ProductDraft {
        name: args.name,
        price: args.price,
        image: args.image,
        category: args.category,
        description: args.description,
    }
}

fn patch(args: UpdateProductArgs) -> (u64, ProductPatch) {
    (
        args.id,
        ProductPatch {
            name: args.name,
            price: args.price,
            image: args.image,
            category: args.category,
            description: args.description,
        },
    )
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
