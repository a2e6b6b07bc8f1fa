use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the vitrine binary.
#[derive(Debug, Parser)]
#[command(name = "vitrine", version, about = "Browse and edit a remote product catalog")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "VITRINE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the catalog API base URL.
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Override the per-request timeout in seconds.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List products, narrowed client-side by search text and category.
    Products(ProductsArgs),
    /// Show one product.
    Product {
        #[arg(value_name = "ID")]
        id: u64,
    },
    /// List categories.
    Categories,
    /// Create a product; its category is created when missing.
    #[command(name = "create-product")]
    CreateProduct(CreateProductArgs),
    /// Update some fields of a product.
    #[command(name = "update-product")]
    UpdateProduct(UpdateProductArgs),
    /// Delete a product.
    #[command(name = "delete-product")]
    DeleteProduct {
        #[arg(value_name = "ID")]
        id: u64,
    },
    /// Create a category.
    #[command(name = "create-category")]
    CreateCategory {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(Debug, Args, Default, Clone)]
pub struct ProductsArgs {
    /// Case-insensitive text matched against name and description.
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Exact category name; `ALL` matches every category.
    #[arg(long, value_name = "NAME")]
    pub category: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct CreateProductArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub price: f64,

    #[arg(long)]
    pub category: String,

    #[arg(long, default_value = "")]
    pub image: String,

    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Debug, Args, Clone)]
pub struct UpdateProductArgs {
    #[arg(value_name = "ID")]
    pub id: u64,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub price: Option<f64>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub image: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}
