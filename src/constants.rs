//! Shared constants/defaults for things
//!

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// The default place we put images
pub static IMAGE_DIR: LazyLock<PathBuf> = LazyLock::new(|| PathBuf::from("./images"));

/// Image search endpoint used by the `search` command.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.firecrawl.dev/v2/search";

/// Base URL for the generation API, models are appended as `models/{model}:generateContent`.
pub const DEFAULT_GENERATION_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Models tried in order by the `generate` command.
pub const DEFAULT_GENERATION_MODELS: &[&str] = &[
    "gemini-3-pro-image-preview",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "imagen-3.0-generate-001",
];

/// Appended to an item name to form the default search query.
pub const DEFAULT_QUERY_SUFFIX: &str = "peptide research vial product";

/// How many search results we ask for. Only the first is used.
pub const DEFAULT_SEARCH_LIMIT: u8 = 5;

/// Filename prefix for searched images.
pub const SEARCH_FILE_PREFIX: &str = "Vici Peptides Site-";

/// Filename prefix for generated images.
pub const GENERATE_FILE_PREFIX: &str = "vici-";

/// Header carrying the generation API key.
pub const X_GOOG_API_KEY: &str = "x-goog-api-key";

/// Prompt used by the `generate` command, `{name}` and `{strength}` are substituted.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Generate a photorealistic 3-D render of a clear glass \
peptide vial standing upright on an ivory background (#F6F1EB) with soft diffused studio lighting \
from the upper left. The vial has a metallic silver matte cap and a curved transparent body showing \
a faint colorless liquid. Apply a centered ivory label displaying the Vici Peptides logo in charcoal \
serif text, followed by the peptide name {name} and dosage {strength}, and beneath that the lines \
'99 % Purity' and 'For Research Purposes Only'. The label must appear professionally printed with \
clean alignment and correct curvature around the bottle. No reflections, no clutter, no colored \
backgrounds. Photorealistic product photography style, 1 : 1 framing, pure ivory background.";

/// Browser identities used when downloading found images. The second and later
/// entries are the alternates used after a 403.
pub const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Accept header sent with image downloads.
pub const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

/// Accept-Language header sent with image downloads.
pub const DOWNLOAD_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Referer sent with image downloads, most hosts allow hotlinks from here.
pub const DOWNLOAD_REFERER: &str = "https://www.google.com/";

/// Pause before retrying a download that got a 403.
pub const ACCESS_DENIED_PAUSE: Duration = Duration::from_secs(2);

/// Per-request timeout for search calls.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout for generation calls, these are slow.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-request timeout for image downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Default pause between catalog items.
pub const DEFAULT_COOLDOWN_SECS: u64 = 3;

/// Default attempts per remote call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base, doubled per attempt on rate limiting.
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 5;

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);
