//! CLI parser
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::constants::{
    DEFAULT_BACKOFF_BASE_SECS, DEFAULT_COOLDOWN_SECS, DEFAULT_GENERATION_API_BASE,
    DEFAULT_GENERATION_MODELS, DEFAULT_MAX_ATTEMPTS, DEFAULT_PROMPT_TEMPLATE,
    DEFAULT_QUERY_SUFFIX, DEFAULT_SEARCH_ENDPOINT, DEFAULT_SEARCH_LIMIT, GENERATE_FILE_PREFIX,
    GENERATION_TIMEOUT, IMAGE_DIR, SEARCH_FILE_PREFIX, SEARCH_TIMEOUT,
};
use crate::naming::NamingScheme;
use crate::pipeline::BatchOptions;
use crate::retry::RetryPolicy;
use crate::source::{GenerateConfig, SearchConfig};

#[derive(Parser, Debug)]
#[command(name = "catalog-images")]
/// Find or generate product images for every item in a catalog
pub struct CliOptions {
    #[clap(long, global = true, help = "Enable debug logging", env = "CATALOG_IMAGES_DEBUG")]
    /// Enable debug logging. Env: CATALOG_IMAGES_DEBUG
    pub debug: bool,

    #[clap(long, short, global = true, env = "CATALOG_IMAGES_CATALOG")]
    /// Catalog file, JSON array or one name per line. Defaults to the bundled catalog.
    /// Env: CATALOG_IMAGES_CATALOG
    pub catalog: Option<PathBuf>,

    #[clap(long, short, global = true, env = "CATALOG_IMAGES_OUT_DIR")]
    /// Output directory, defaults to `./images`.
    /// Env: CATALOG_IMAGES_OUT_DIR
    pub out_dir: Option<PathBuf>,

    #[clap(subcommand)]
    /// What to do
    pub command: Command,
}

impl CliOptions {
    /// The output directory, falling back to the default.
    pub fn out_dir(&self) -> PathBuf {
        self.out_dir.clone().unwrap_or_else(|| IMAGE_DIR.clone())
    }
}

#[derive(Subcommand, Debug)]
/// Subcommands
pub enum Command {
    /// Search for an existing image of each missing item and download it
    Search(SearchArgs),
    /// Generate an image for each missing item
    Generate(GenerateArgs),
    /// List which items have an image, without touching the network
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
/// Options shared by the batch commands
pub struct BatchArgs {
    #[clap(long, short, env = "CATALOG_IMAGES_BATCH_SIZE")]
    /// Only process this many missing items. Env: CATALOG_IMAGES_BATCH_SIZE
    pub batch_size: Option<usize>,

    #[clap(long, default_value_t = DEFAULT_COOLDOWN_SECS, env = "CATALOG_IMAGES_COOLDOWN_SECS")]
    /// Seconds to wait between items. Env: CATALOG_IMAGES_COOLDOWN_SECS
    pub cooldown_secs: u64,

    #[clap(long, default_value_t = DEFAULT_MAX_ATTEMPTS, env = "CATALOG_IMAGES_MAX_ATTEMPTS")]
    /// Attempts per remote call. Env: CATALOG_IMAGES_MAX_ATTEMPTS
    pub max_attempts: u32,

    #[clap(
        long,
        default_value_t = DEFAULT_BACKOFF_BASE_SECS,
        env = "CATALOG_IMAGES_BACKOFF_BASE_SECS"
    )]
    /// First backoff after a rate limit, doubled each time.
    /// Env: CATALOG_IMAGES_BACKOFF_BASE_SECS
    pub backoff_base_secs: u64,
}

impl BatchArgs {
    /// Batch options built from the flags.
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            cooldown: Duration::from_secs(self.cooldown_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_secs(self.backoff_base_secs),
                ..RetryPolicy::default()
            },
        }
    }
}

#[derive(Args, Debug)]
/// Options for `search`
pub struct SearchArgs {
    #[clap(flatten)]
    /// Batch options
    pub batch: BatchArgs,

    #[clap(long, env = "FIRECRAWL_API_KEY", hide_env_values = true)]
    /// Search API key
    pub api_key: String,

    #[clap(long, default_value = DEFAULT_SEARCH_ENDPOINT, env = "CATALOG_IMAGES_SEARCH_ENDPOINT")]
    /// Search endpoint. Env: CATALOG_IMAGES_SEARCH_ENDPOINT
    pub endpoint: String,

    #[clap(long, default_value = DEFAULT_QUERY_SUFFIX, env = "CATALOG_IMAGES_QUERY_SUFFIX")]
    /// Appended to each item name to build the query. Env: CATALOG_IMAGES_QUERY_SUFFIX
    pub query_suffix: String,

    #[clap(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    /// Results requested per query, only the first is used
    pub limit: u8,

    #[clap(long, default_value = SEARCH_FILE_PREFIX, env = "CATALOG_IMAGES_SEARCH_PREFIX")]
    /// File name prefix. Env: CATALOG_IMAGES_SEARCH_PREFIX
    pub prefix: String,
}

impl SearchArgs {
    /// Source settings built from the flags.
    pub fn config(&self) -> SearchConfig {
        SearchConfig {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            query_suffix: self.query_suffix.clone(),
            limit: self.limit,
            query_cooldown: Duration::from_secs(self.batch.cooldown_secs),
            timeout: SEARCH_TIMEOUT,
        }
    }

    /// File naming for searched images.
    pub fn naming(&self) -> NamingScheme {
        NamingScheme {
            prefix: self.prefix.clone(),
            ..NamingScheme::search()
        }
    }
}

#[derive(Args, Debug)]
/// Options for `generate`
pub struct GenerateArgs {
    #[clap(flatten)]
    /// Batch options
    pub batch: BatchArgs,

    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    /// Generation API key
    pub api_key: String,

    #[clap(
        long,
        default_value = DEFAULT_GENERATION_API_BASE,
        env = "CATALOG_IMAGES_GENERATION_API_BASE"
    )]
    /// API base URL. Env: CATALOG_IMAGES_GENERATION_API_BASE
    pub api_base: String,

    #[clap(long = "model", env = "CATALOG_IMAGES_MODELS", value_delimiter = ',')]
    /// Models to try in order, repeatable. Env: CATALOG_IMAGES_MODELS (comma separated)
    pub models: Vec<String>,

    #[clap(long = "reference", env = "CATALOG_IMAGES_REFERENCES", value_delimiter = ',')]
    /// Reference image sent with every request, repeatable. All must exist.
    /// Env: CATALOG_IMAGES_REFERENCES (comma separated)
    pub references: Vec<PathBuf>,

    #[clap(long, env = "CATALOG_IMAGES_PROMPT_TEMPLATE")]
    /// Prompt template with `{name}` and `{strength}` placeholders.
    /// Env: CATALOG_IMAGES_PROMPT_TEMPLATE
    pub prompt_template: Option<String>,

    #[clap(long, default_value = "1:1")]
    /// Aspect ratio requested
    pub aspect_ratio: String,

    #[clap(long, default_value = "2K")]
    /// Image size requested
    pub image_size: String,

    #[clap(long, default_value = GENERATE_FILE_PREFIX, env = "CATALOG_IMAGES_GENERATE_PREFIX")]
    /// File name prefix. Env: CATALOG_IMAGES_GENERATE_PREFIX
    pub prefix: String,
}

impl GenerateArgs {
    /// Source settings built from the flags.
    pub fn config(&self) -> GenerateConfig {
        let models = if self.models.is_empty() {
            DEFAULT_GENERATION_MODELS
                .iter()
                .map(|model| model.to_string())
                .collect()
        } else {
            self.models.clone()
        };
        GenerateConfig {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            models,
            prompt_template: self
                .prompt_template
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string()),
            aspect_ratio: self.aspect_ratio.clone(),
            image_size: self.image_size.clone(),
            timeout: GENERATION_TIMEOUT,
        }
    }

    /// File naming for generated images.
    pub fn naming(&self) -> NamingScheme {
        NamingScheme {
            prefix: self.prefix.clone(),
            ..NamingScheme::generate()
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
/// Which file naming scheme to check
pub enum SchemeKind {
    /// Searched image names
    Search,
    /// Generated image names
    Generate,
}

#[derive(Args, Debug)]
/// Options for `status`
pub struct StatusArgs {
    #[clap(long, value_enum, default_value_t = SchemeKind::Search)]
    /// Naming scheme to check against
    pub scheme: SchemeKind,

    #[clap(long)]
    /// File name prefix, defaults to the scheme's own
    pub prefix: Option<String>,
}

impl StatusArgs {
    /// File naming to check.
    pub fn naming(&self) -> NamingScheme {
        let scheme = match self.scheme {
            SchemeKind::Search => NamingScheme::search(),
            SchemeKind::Generate => NamingScheme::generate(),
        };
        match &self.prefix {
            Some(prefix) => NamingScheme {
                prefix: prefix.clone(),
                ..scheme
            },
            None => scheme,
        }
    }
}
