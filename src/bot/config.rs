use std::fmt;

use teloxide::types::ChatId;

/// Credentials and identifiers the bot needs to talk to Telegram, ChatGPT and Reddit.
#[derive(Clone, PartialEq, Eq)]
pub struct BotConfig {
  pub(crate) chat_id: i64,
  pub(crate) telegram_api_key: String,
  pub(crate) chatgpt_api_key: String,
  pub(crate) chatgpt_user_name: String,
  pub(crate) reddit_client_id: String,
  pub(crate) reddit_api_key: String,
  pub(crate) reddit_username: String,
  pub(crate) reddit_password: String,
}

impl BotConfig {
  pub fn chat_id(&self) -> ChatId {
    ChatId(self.chat_id)
  }

  pub fn telegram_api_key(&self) -> &str {
    &self.telegram_api_key
  }

  #[allow(dead_code)]
  pub fn chatgpt_api_key(&self) -> &str {
    &self.chatgpt_api_key
  }

  pub fn chatgpt_user_name(&self) -> &str {
    &self.chatgpt_user_name
  }

  #[allow(dead_code)]
  pub fn reddit_client_id(&self) -> &str {
    &self.reddit_client_id
  }

  #[allow(dead_code)]
  pub fn reddit_api_key(&self) -> &str {
    &self.reddit_api_key
  }

  pub fn reddit_username(&self) -> &str {
    &self.reddit_username
  }

  #[allow(dead_code)]
  pub fn reddit_password(&self) -> &str {
    &self.reddit_password
  }
}

// Keys and passwords must never reach the logs.
impl fmt::Debug for BotConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BotConfig")
      .field("chat_id", &self.chat_id)
      .field("telegram_api_key", &"***")
      .field("chatgpt_api_key", &"***")
      .field("chatgpt_user_name", &self.chatgpt_user_name)
      .field("reddit_client_id", &self.reddit_client_id)
      .field("reddit_api_key", &"***")
      .field("reddit_username", &self.reddit_username)
      .field("reddit_password", &"***")
      .finish()
  }
}
