use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::changeset::ParseMode;
use crate::clients::git::CommitIdentity;
use crate::clients::openai::OpenAiSettings;
use crate::errors::ConfigError;
use crate::generator::DEFAULT_SYSTEM_CONTEXT;
use crate::snapshot::DEFAULT_MAX_FILE_BYTES;

const DEFAULT_ASSET_EXTENSIONS: &[&str] = &[".svg", ".png", ".jpeg", ".jpg", ".gif", ".ico", ".css"];
const ALWAYS_IGNORED: &str = ".git";

/// Where the repository and its issues live.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteConfig {
    Github {
        api_url: String,
        /// `owner/name`
        repo: String,
        user: String,
        token: String,
    },
    AzureDevops {
        org: String,
        project: String,
        repo: String,
        pat: String,
    },
}

impl RemoteConfig {
    fn repo_name(&self) -> &str {
        match self {
            Self::Github { repo, .. } => repo.rsplit('/').next().unwrap_or(repo),
            Self::AzureDevops { repo, .. } => repo,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub generator: OpenAiSettings,
    pub base_branch: String,
    pub local_path: PathBuf,
    pub ignore: Vec<String>,
    pub asset_extensions: Vec<String>,
    pub max_file_bytes: u64,
    pub branch_prefix: String,
    pub parse_mode: ParseMode,
    pub system_context: String,
    pub generator_timeout: Duration,
    pub git_timeout: Duration,
    pub poll_interval: Duration,
    pub ledger_path: PathBuf,
    pub identity: CommitIdentity,
}

impl Config {
    /// Load config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup: &lookup };

        let remote = match vars.optional("REPO_BACKEND").as_deref().unwrap_or("github") {
            "github" => RemoteConfig::Github {
                api_url: vars
                    .optional("GITHUB_API_URL")
                    .unwrap_or_else(|| "https://api.github.com".to_string()),
                repo: vars.required("GITHUB_REPO")?,
                user: vars.required("GITHUB_USER")?,
                token: vars.required("GITHUB_TOKEN")?,
            },
            "devops" | "azure_devops" => RemoteConfig::AzureDevops {
                org: vars.required("DEVOPS_ORG")?,
                project: vars.required("DEVOPS_PROJECT")?,
                repo: vars.required("DEVOPS_REPO")?,
                pat: vars.required("DEVOPS_PAT")?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "REPO_BACKEND",
                    message: format!("expected 'github' or 'devops', got '{other}'"),
                });
            }
        };
        if let RemoteConfig::Github { repo, .. } = &remote
            && !is_owner_repo(repo)
        {
            return Err(ConfigError::Invalid {
                var: "GITHUB_REPO",
                message: format!("expected 'owner/name', got '{repo}'"),
            });
        }

        let generator = OpenAiSettings {
            endpoint: vars.required("OPENAI_API_ENDPOINT")?,
            api_key: vars.required("OPENAI_API_KEY")?,
            deployment: vars.required("OPENAI_DEPLOYMENT_NAME")?,
            api_version: vars
                .optional("OPENAI_API_VERSION")
                .unwrap_or_else(|| "2023-03-15-preview".to_string()),
            max_tokens: vars.parsed("OPENAI_MAX_TOKENS", 4096)?,
            temperature: vars.parsed("OPENAI_TEMPERATURE", 0.7)?,
        };

        let base_branch = vars.required("BASE_BRANCH")?;
        let local_path = vars
            .optional("LOCAL_REPO_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("repo").join(remote.repo_name()));

        let mut ignore = vec![ALWAYS_IGNORED.to_string()];
        if let Some(list) = vars.optional("IGNORE") {
            ignore.extend(split_list(&list).filter(|entry| entry != ALWAYS_IGNORED));
        }
        let asset_extensions = match vars.optional("ASSET_EXTENSIONS") {
            Some(list) => split_list(&list).collect(),
            None => DEFAULT_ASSET_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        };

        let ledger_path = vars.optional("LEDGER_PATH").map(PathBuf::from).unwrap_or_else(|| {
            let mut path = local_path.clone().into_os_string();
            path.push(".ledger.json");
            PathBuf::from(path)
        });

        let defaults = CommitIdentity::default();
        let identity = CommitIdentity {
            name: vars.optional("GIT_USER_NAME").unwrap_or(defaults.name),
            email: vars.optional("GIT_USER_EMAIL").unwrap_or(defaults.email),
        };

        Ok(Self {
            remote,
            generator,
            base_branch,
            local_path,
            ignore,
            asset_extensions,
            max_file_bytes: vars.parsed("SNAPSHOT_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES)?,
            branch_prefix: vars.optional("BRANCH_PREFIX").unwrap_or_default(),
            parse_mode: vars.parsed("PARSE_MODE", ParseMode::Strict)?,
            system_context: vars
                .optional("SYSTEM_CONTEXT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_CONTEXT.to_string()),
            generator_timeout: vars.seconds("GENERATOR_TIMEOUT_SECS", 300)?,
            git_timeout: vars.seconds("GIT_TIMEOUT_SECS", 120)?,
            poll_interval: vars.seconds("POLL_INTERVAL_SECS", 60)?,
            ledger_path,
            identity,
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key,
                message: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn seconds(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parsed(key, default)?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                var: key,
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(Duration::from_secs(secs))
    }
}

fn split_list(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
}

fn is_owner_repo(repo: &str) -> bool {
    matches!(repo.split_once('/'), Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/'))
}
