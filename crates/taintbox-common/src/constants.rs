//! System-wide constants and default values.

/// Default configuration file consumed by `build-push`.
pub const DEFAULT_CONFIG_PATH: &str = "config/build_push.config.json";

/// Default location of the generated external suite.
pub const DEFAULT_EXTERNAL_SUITE: &str = "cases/suite_external.json";

/// Default external prompt manifest.
pub const DEFAULT_PROMPT_MANIFEST: &str = "cases/prompt_sources_promptfoo.json";

/// Default output directory for build contexts and runlists.
pub const DEFAULT_OUTDIR: &str = "out";

/// Default UTC timestamp format for tags and runlist names.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Default prefix for trace labels.
pub const DEFAULT_TRACE_LABEL_PREFIX: &str = "org.llmsec";

/// Default label key carrying the payload.
pub const DEFAULT_PAYLOAD_LABEL_KEY: &str = "payload";

/// Default environment variable carrying the payload.
pub const DEFAULT_PAYLOAD_ENV_KEY: &str = "PAYLOAD";

/// Default build argument carrying the payload.
pub const DEFAULT_PAYLOAD_ARG_KEY: &str = "PAYLOAD_ARG";

/// Default path template for cases expanded onto the file carrier.
pub const DEFAULT_EXPAND_FILE_PATH_TEMPLATE: &str = "/usr/share/doc/llmsec/expanded/{id}_{carrier}.txt";

/// Default path template for externally ingested file-carrier cases.
pub const DEFAULT_EXTERNAL_FILE_PATH_TEMPLATE: &str = "/usr/share/doc/llmsec/{source}/payload_{idx}.txt";

/// Default id prefix for externally ingested cases.
pub const DEFAULT_EXTERNAL_CASE_PREFIX: &str = "ext";

/// Default HTTP timeout for external source fetches, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 30;

/// Default seed for per-source shuffles.
pub const DEFAULT_SHUFFLE_SEED: u64 = 42;

/// Prefix of the canary marker attached to every case.
pub const CANARY_PREFIX: &str = "PWNED_CANARY_";

/// Maximum number of payload characters kept in a runlist preview.
pub const PAYLOAD_PREVIEW_CHARS: usize = 140;

/// Maximum length of an image tag.
pub const MAX_TAG_LENGTH: usize = 128;

/// Width of the zero-padded index in generated case ids.
pub const CASE_INDEX_WIDTH: usize = 4;

/// Application name used in CLI output.
pub const APP_NAME: &str = "taintbox";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "tbx";
