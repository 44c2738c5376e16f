//! Chat-id helper: replies to any message or channel post with the chat id.
//!
//! Usage: BOT_TOKEN=123456789:ABC... cargo run --bin chat_id
//!
//! Add the bot to a chat (or post in a channel it can see) to learn the id
//! needed for wiring up relay pairs.

use teloxide::prelude::*;

#[tokio::main]
async fn main() {
    let token = std::env::var("BOT_TOKEN").expect("BOT_TOKEN is not set");
    let bot = Bot::new(token);

    println!("🤖 chat_id helper running, waiting for messages...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(reply_chat_id))
        .branch(Update::filter_channel_post().endpoint(reply_chat_id));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn reply_chat_id(bot: Bot, msg: Message) -> ResponseResult<()> {
    let name = msg
        .chat
        .title()
        .or_else(|| msg.chat.username())
        .unwrap_or("-");
    println!("===========================");
    println!("Название: {name}");
    println!("chat_id: {}", msg.chat.id);
    println!("===========================");
    bot.send_message(msg.chat.id, format!("✅ chat_id: {}", msg.chat.id))
        .await?;
    Ok(())
}
