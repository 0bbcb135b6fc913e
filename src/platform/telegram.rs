use std::sync::Arc;

use anyhow::Result;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info};

use crate::greeting;
use crate::platform::GreetingEvent;
use crate::store::UserStore;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "save your user id and username")]
    Start,
}

/// Run the Telegram bot platform
pub async fn run(bot: Bot, store: Arc<dyn UserStore>) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(handle_command);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![store])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    store: Arc<dyn UserStore>,
) -> ResponseResult<()> {
    match cmd {
        Command::Start => handle_start(&bot, &msg, store.as_ref()).await,
    }
    Ok(())
}

/// Record the sender and answer with exactly one reply quoting the command.
/// Delivery failures are logged and dropped. Messages without a sender
/// (channel posts) are ignored.
async fn handle_start(bot: &Bot, msg: &Message, store: &dyn UserStore) {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return,
    };

    let event = GreetingEvent {
        user_id: user.id.0,
        username: user.username.clone(),
    };

    let reply = greeting::handle_greeting(store, &event).await;

    info!("Attempting to send a {} message.", reply);
    match bot
        .send_message(msg.chat.id, reply.text())
        .reply_parameters(ReplyParameters::new(msg.id))
        .await
    {
        Ok(_) => info!("The {} message was sent successfully.", reply),
        Err(e) => error!("Failed to send {} message: {}", reply, e),
    }
}
