use crate::errors::ConfigError;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use object_store::azure::MicrosoftAzureBuilder;
use std::{fmt, str::FromStr};
use url::Url;

pub const CONNECTION_STRING_ENV: &str = "STORAGE_CONNECTION_STRING";

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const EMULATOR_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";
const DEFAULT_MARKER_CONTENT: &str = "This is some sample text for my file.";

/// Centralized application configuration.
/// Combines environment variables (and `.env`) with CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub backend: Backend,
    /// Parsed credential; `None` only for the in-memory backend.
    pub account: Option<ConnectionString>,
    credential: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Move, copy, list and mark blobs in Azure Blob Storage"
)]
pub struct Args {
    /// Storage account connection string
    #[arg(long, global = true, env = CONNECTION_STRING_ENV, hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Storage backend; `memory` starts from empty in-process containers and
    /// is meant for offline testing, not as a dry run against an account
    #[arg(long, global = true, value_enum, env = "BLOB_ARCHIVE_BACKEND", default_value_t = Backend::Azure)]
    pub backend: Backend,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Azure,
    Memory,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Move every blob under the source prefix, then delete the source marker
    Archive(ArchiveArgs),
    /// Copy every blob under the source prefix, leaving the source in place
    Copy(TransferArgs),
    /// List blobs under a prefix
    List(ListArgs),
    /// Create an arrival marker blob unless it already exists
    Mark(MarkArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct TransferArgs {
    #[arg(long, env = "BLOB_ARCHIVE_SOURCE_CONTAINER")]
    pub source_container: String,

    /// Virtual directory to read from, e.g. `recipes/`
    #[arg(long, env = "BLOB_ARCHIVE_SOURCE_PREFIX")]
    pub source_prefix: String,

    #[arg(long, env = "BLOB_ARCHIVE_DESTINATION_CONTAINER")]
    pub destination_container: String,

    /// Virtual directory to write to; a trailing `/` is optional
    #[arg(long, env = "BLOB_ARCHIVE_DESTINATION_PREFIX")]
    pub destination_prefix: String,

    /// Concurrent transfers (defaults to min(32, cpus + 4))
    #[arg(long, env = "BLOB_ARCHIVE_WORKERS")]
    pub workers: Option<usize>,

    /// Exit non-zero when any blob fails to transfer
    #[arg(long)]
    pub fail_on_error: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ArchiveArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    /// Keep the source marker when any move failed
    #[arg(long)]
    pub keep_marker_on_failure: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, env = "BLOB_ARCHIVE_CONTAINER")]
    pub container: String,

    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Print one JSON object per blob instead of name and URL
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MarkArgs {
    #[arg(long, env = "BLOB_ARCHIVE_CONTAINER")]
    pub container: String,

    /// Marker blob name (defaults to `file_arrival_trigger/ready_<YYYYMMDD>.txt`)
    #[arg(long)]
    pub path: Option<String>,

    #[arg(long, default_value = DEFAULT_MARKER_CONTENT)]
    pub content: String,
}

impl MarkArgs {
    pub fn marker_path(&self) -> String {
        self.path.clone().unwrap_or_else(default_marker_path)
    }
}

/// Marker name for today's arrival signal.
pub fn default_marker_path() -> String {
    format!(
        "file_arrival_trigger/ready_{}.txt",
        Local::now().format("%Y%m%d")
    )
}

impl Command {
    /// Containers the command touches; the store opens exactly these.
    pub fn containers(&self) -> Vec<&str> {
        match self {
            Command::Archive(args) => args.transfer.containers(),
            Command::Copy(args) => args.containers(),
            Command::List(args) => vec![args.container.as_str()],
            Command::Mark(args) => vec![args.container.as_str()],
        }
    }
}

impl TransferArgs {
    fn containers(&self) -> Vec<&str> {
        vec![
            self.source_container.as_str(),
            self.destination_container.as_str(),
        ]
    }
}

impl AppConfig {
    /// Parse CLI args (with env fallbacks) and validate the credential.
    pub fn from_env_and_args() -> Result<(Self, Command), ConfigError> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, Command), ConfigError> {
        let credential = args.connection_string.unwrap_or_default();
        let account = match args.backend {
            Backend::Azure if credential.trim().is_empty() => {
                return Err(ConfigError::MissingCredential);
            }
            Backend::Azure => Some(credential.parse::<ConnectionString>()?),
            Backend::Memory => None,
        };
        let credential = match args.backend {
            Backend::Memory if credential.is_empty() => "memory".to_string(),
            _ => credential,
        };
        Ok((
            Self {
                backend: args.backend,
                account,
                credential,
            },
            args.command,
        ))
    }

    /// Raw credential handed to archive jobs.
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

#[cfg(test)]
impl AppConfig {
    /// Same configuration with a different raw credential.
    pub(crate) fn with_credential(mut self, credential: &str) -> Self {
        self.credential = credential.to_string();
        self
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("backend", &self.backend)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// Storage account connection string, as issued by the Azure portal:
/// `;`-separated `Key=Value` pairs.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub protocol: String,
    pub endpoint_suffix: String,
    pub blob_endpoint: Option<Url>,
    pub use_development_storage: bool,
}

impl FromStr for ConnectionString {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parsed = Self {
            account_name: None,
            account_key: None,
            protocol: "https".to_string(),
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            blob_endpoint: None,
            use_development_storage: false,
        };

        for pair in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Account keys are base64 and end in `=`, so split on the first one only.
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ConfigError::InvalidConnectionString(format!("`{pair}` is not a Key=Value pair"))
            })?;
            match key.trim() {
                "AccountName" => parsed.account_name = Some(value.to_string()),
                "AccountKey" => parsed.account_key = Some(value.to_string()),
                "DefaultEndpointsProtocol" => parsed.protocol = value.to_ascii_lowercase(),
                "EndpointSuffix" => parsed.endpoint_suffix = value.to_string(),
                "BlobEndpoint" => {
                    let url = Url::parse(value).map_err(|err| {
                        ConfigError::InvalidConnectionString(format!("BlobEndpoint: {err}"))
                    })?;
                    parsed.blob_endpoint = Some(url);
                }
                "UseDevelopmentStorage" => {
                    parsed.use_development_storage = value.eq_ignore_ascii_case("true")
                }
                _ => {}
            }
        }

        if !parsed.use_development_storage
            && (parsed.account_name.is_none() || parsed.account_key.is_none())
        {
            return Err(ConfigError::InvalidConnectionString(
                "AccountName and AccountKey are required".into(),
            ));
        }
        if !matches!(parsed.protocol.as_str(), "http" | "https") {
            return Err(ConfigError::InvalidConnectionString(format!(
                "unsupported protocol `{}`",
                parsed.protocol
            )));
        }
        Ok(parsed)
    }
}

impl ConnectionString {
    /// Account-level blob endpoint blob URLs are rooted at.
    pub fn blob_endpoint(&self) -> Result<Url, ConfigError> {
        if self.use_development_storage {
            return Url::parse(EMULATOR_BLOB_ENDPOINT)
                .map_err(|err| ConfigError::InvalidConnectionString(err.to_string()));
        }
        if let Some(endpoint) = &self.blob_endpoint {
            return Ok(endpoint.clone());
        }
        let account = self.account_name.as_deref().unwrap_or_default();
        Url::parse(&format!(
            "{}://{}.blob.{}/",
            self.protocol, account, self.endpoint_suffix
        ))
        .map_err(|err| ConfigError::InvalidConnectionString(err.to_string()))
    }

    /// Blob endpoint to use instead of the public cloud one, if any.
    pub fn custom_endpoint(&self) -> Option<String> {
        match &self.blob_endpoint {
            Some(endpoint) => Some(endpoint.to_string()),
            None if self.endpoint_suffix != DEFAULT_ENDPOINT_SUFFIX => {
                self.blob_endpoint().ok().map(|url| url.to_string())
            }
            None => None,
        }
    }

    /// Builder preloaded with this account; the caller sets the container.
    pub fn azure_builder(&self) -> MicrosoftAzureBuilder {
        let builder = MicrosoftAzureBuilder::new();
        if self.use_development_storage {
            return builder.with_use_emulator(true);
        }

        let mut builder = builder
            .with_account(self.account_name.clone().unwrap_or_default())
            .with_access_key(self.account_key.clone().unwrap_or_default());

        if let Some(endpoint) = self.custom_endpoint() {
            builder = builder
                .with_allow_http(endpoint.starts_with("http://"))
                .with_endpoint(endpoint);
        }
        builder
    }
}

// Never print the account key.
impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("protocol", &self.protocol)
            .field("endpoint_suffix", &self.endpoint_suffix)
            .field("blob_endpoint", &self.blob_endpoint)
            .field("use_development_storage", &self.use_development_storage)
            .finish()
    }
}
