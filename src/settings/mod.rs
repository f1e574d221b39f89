pub mod error;

use std::{collections::HashMap, ffi::OsString, fmt};

use config::{Environment, Map};
use log::{debug, info};

use crate::{bot::config::BotConfig, store};

use self::error::ConfigError as Error;

pub const REDIS_URL: &str = "REDIS_URL";
pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const TELEGRAM_API_KEY: &str = "TELEGRAM_API_KEY";
pub const CHATGPT_API_KEY: &str = "CHATGPT_API_KEY";
pub const CHATGPT_USER_NAME: &str = "CHATGPT_USER_NAME";
pub const REDDIT_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const REDDIT_API_KEY: &str = "REDDIT_API_KEY";
pub const REDDIT_USERNAME: &str = "REDDIT_USERNAME";
pub const REDDIT_PASSWORD: &str = "REDDIT_PASSWORD";

/// Required variables in the order they are checked.
const DECLARED_ORDER: [&str; 9] = [
  REDIS_URL,
  TELEGRAM_CHAT_ID,
  TELEGRAM_API_KEY,
  CHATGPT_API_KEY,
  CHATGPT_USER_NAME,
  REDDIT_CLIENT_ID,
  REDDIT_API_KEY,
  REDDIT_USERNAME,
  REDDIT_PASSWORD,
];

/// Process-wide configuration. Built once at startup, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
  redis_uri: String,
  bot: BotConfig,
}

impl Config {
  /// Reads every required variable through `lookup` in declared order and stops at the first failure.
  ///
  /// Only the declared names are ever looked up, with their exact case. `std::env::var_os` is the
  /// production lookup.
  pub fn resolve(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Config, Error> {
    info!("[Config] Application config is getting resolved from env");
    let snapshot = Snapshot::capture(lookup);
    let source = config::Config::builder()
      .add_source(Environment::default().source(Some(snapshot.vars)))
      .build()?;
    let require = |key: &'static str| match snapshot.malformed.get(key) {
      Some(raw) => Err(Error::InvalidFormat {
        key,
        value: raw.clone(),
        reason: "not valid UTF-8",
      }),
      None => lookup_string(&source, key),
    };

    let redis_uri = require(REDIS_URL)?;
    let chat_id = parse_chat_id(require(TELEGRAM_CHAT_ID)?)?;
    let bot = BotConfig {
      chat_id,
      telegram_api_key: require(TELEGRAM_API_KEY)?,
      chatgpt_api_key: require(CHATGPT_API_KEY)?,
      chatgpt_user_name: require(CHATGPT_USER_NAME)?,
      reddit_client_id: require(REDDIT_CLIENT_ID)?,
      reddit_api_key: require(REDDIT_API_KEY)?,
      reddit_username: require(REDDIT_USERNAME)?,
      reddit_password: require(REDDIT_PASSWORD)?,
    };

    info!("[Config] Application config has been resolved (chat_id={})", chat_id);
    Ok(Config { redis_uri, bot })
  }

  pub fn redis_uri(&self) -> &str {
    &self.redis_uri
  }

  pub fn bot(&self) -> &BotConfig {
    &self.bot
  }
}

impl fmt::Debug for Config {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Config")
      .field("redis_uri", &store::redact(&self.redis_uri))
      .field("bot", &self.bot)
      .finish()
  }
}

/// Declared variables as read from the environment. Empty values are left out, values that are not
/// UTF-8 are kept aside (lossily decoded) until their turn in the declared order comes.
struct Snapshot {
  vars: Map<String, String>,
  malformed: HashMap<&'static str, String>,
}

impl Snapshot {
  fn capture(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
    let mut vars = Map::new();
    let mut malformed = HashMap::new();
    for key in DECLARED_ORDER {
      match lookup(key).map(OsString::into_string) {
        Some(Ok(value)) if !value.is_empty() => {
          vars.insert(key.to_string(), value);
        }
        Some(Err(raw)) => {
          malformed.insert(key, raw.to_string_lossy().into_owned());
        }
        _ => {}
      }
    }
    Snapshot { vars, malformed }
  }
}

// Keys reach the `config` crate only under their declared names, so its lowercasing cannot merge two spellings.
fn lookup_string(source: &config::Config, key: &'static str) -> Result<String, Error> {
  match source.get_string(&key.to_lowercase()) {
    Ok(value) => {
      debug!("[Config] Found {}", key);
      Ok(value)
    }
    Err(config::ConfigError::NotFound(_)) => Err(Error::MissingVariable(key)),
    Err(err) => Err(err.into()),
  }
}

fn parse_chat_id(raw: String) -> Result<i64, Error> {
  raw.parse::<i64>().map_err(|_| Error::InvalidFormat {
    key: TELEGRAM_CHAT_ID,
    value: raw,
    reason: "not an integer",
  })
}

/// A valid value for every required variable.
#[cfg(test)]
pub(crate) fn complete_env() -> HashMap<String, OsString> {
  [
    (REDIS_URL, "redis://x"),
    (TELEGRAM_CHAT_ID, "123"),
    (TELEGRAM_API_KEY, "t"),
    (CHATGPT_API_KEY, "c"),
    (CHATGPT_USER_NAME, "u"),
    (REDDIT_CLIENT_ID, "rc"),
    (REDDIT_API_KEY, "ra"),
    (REDDIT_USERNAME, "ru"),
    (REDDIT_PASSWORD, "rp"),
  ]
  .into_iter()
  .map(|(k, v)| (k.to_string(), OsString::from(v)))
  .collect()
}

/// Lookup over an in-memory environment.
#[cfg(test)]
pub(crate) fn lookup_in(vars: HashMap<String, OsString>) -> impl Fn(&str) -> Option<OsString> {
  move |key| vars.get(key).cloned()
}
