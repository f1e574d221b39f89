pub mod config;
pub mod error;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};

use crate::store::RedisStore;

use self::{config::BotConfig, error::WorkerError};

/// Long-running component started by the bootstrapper. `start` occupies the caller until the worker stops.
#[async_trait]
pub trait Worker: Send {
  async fn start(self: Box<Self>) -> Result<(), WorkerError>;
}

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
  #[command(description = "display this text")]
  Help,
  #[command(description = "show what the bot is connected to")]
  Status,
}

type FeedBotHandlerError = Box<dyn std::error::Error + Send + Sync>;
type FeedBotHandlerResult = Result<(), FeedBotHandlerError>;

/// Snapshot handed to command handlers.
struct Status {
  started_at: DateTime<Utc>,
  chat_id: ChatId,
  store: String,
  chatgpt_user_name: String,
  reddit_username: String,
}

pub struct FeedBot {
  bot: Bot,
  store: RedisStore,
  config: BotConfig,
}

impl FeedBot {
  pub fn new(store: RedisStore, config: BotConfig) -> Self {
    info!("[FeedBot] Bot is getting created (chat_id={})", config.chat_id());
    FeedBot {
      bot: Bot::new(config.telegram_api_key()),
      store,
      config,
    }
  }

  async fn help(bot: Bot, msg: Message) -> FeedBotHandlerResult {
    info!("[FeedBot] Sending help to chat_id={}", msg.chat.id);
    metrics::counter!("bot_updates_total").increment(1);
    metrics::counter!("bot_commands_total", "command" => "help").increment(1);
    bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
    Ok(())
  }

  async fn status(bot: Bot, msg: Message, status: Arc<Status>) -> FeedBotHandlerResult {
    info!("[FeedBot] Sending status to chat_id={}", msg.chat.id);
    metrics::counter!("bot_updates_total").increment(1);
    metrics::counter!("bot_commands_total", "command" => "status").increment(1);
    bot.send_message(msg.chat.id, FeedBot::format_status(&status)).await?;
    Ok(())
  }

  async fn unhandled_message(_bot: Bot, msg: Message) -> FeedBotHandlerResult {
    debug!("[FeedBot] Ignoring message in chat_id={}", msg.chat.id);
    metrics::counter!("bot_updates_total").increment(1);
    Ok(())
  }

  fn schema() -> UpdateHandler<FeedBotHandlerError> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
      .branch(case![Command::Help].endpoint(FeedBot::help))
      .branch(case![Command::Status].endpoint(FeedBot::status));

    Update::filter_message()
      .branch(command_handler)
      .branch(dptree::endpoint(FeedBot::unhandled_message))
  }

  fn format_status(status: &Status) -> String {
    format!(
      "Running since {}\nPosting to chat {}\nStore: {}\nChatGPT user: {}\nReddit user: {}",
      status.started_at.format("%d.%m.%Y %H:%M:%S UTC"),
      status.chat_id,
      status.store,
      status.chatgpt_user_name,
      status.reddit_username,
    )
  }
}

#[async_trait]
impl Worker for FeedBot {
  async fn start(self: Box<Self>) -> Result<(), WorkerError> {
    info!("[FeedBot] Bot is starting dispatching events...");
    self.bot.set_my_commands(Command::bot_commands()).await?;

    let status = Arc::new(Status {
      started_at: Utc::now(),
      chat_id: self.config.chat_id(),
      store: self.store.redacted_uri(),
      chatgpt_user_name: self.config.chatgpt_user_name().to_string(),
      reddit_username: self.config.reddit_username().to_string(),
    });

    let mut dispatcher = Dispatcher::builder(self.bot.clone(), FeedBot::schema())
      .dependencies(dptree::deps![status])
      .default_handler(|upd| async move {
        warn!("[FeedBot] Unhandled update: {:?}", upd.id);
      })
      .error_handler(LoggingErrorHandler::with_custom_text(
        "[FeedBot] Error has occurred in the dispatcher",
      ))
      .enable_ctrlc_handler()
      .build();
    dispatcher.dispatch().await;

    info!("[FeedBot] Dispatcher has stopped");
    Ok(())
  }
}
