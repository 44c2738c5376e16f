//! Admin command and inline-menu handlers.
//!
//! Everything here is gated on the persisted admin list. Replies are
//! user-facing and in Russian, matching the bot's audience; failures during
//! management always produce a chat reply, never a silent success.

use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

use crate::store::StatRecord;
use crate::transport::RelayTransport;
use crate::BotState;

/// Reporting window for the stats callback.
const REPORT_WINDOW_MS: i64 = 15 * 60 * 1000;

const USAGE_ADDCHANNEL: &str = "❌ Укажите: /addchannel @source @target1 [@target2 ...]";
const USAGE_REMOVETARGET: &str = "❌ Укажите: /removetarget @source @target";
const USAGE_DELCHANNEL: &str = "❌ Укажите: /delchannel @source";
const NO_RIGHTS: &str = "❌ У вас нет прав администратора.";
const SAVE_FAILED: &str = "❌ Не удалось сохранить изменения.";

/// Splits `/cmd@botname arg1 ...` into the lowercase command and the rest.
fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let chat = msg.chat.id;

    if !state.store.lock().await.is_admin(user_id) {
        bot.send_message(chat, NO_RIGHTS).await?;
        return Ok(());
    }

    let (cmd, rest) = parse_command(msg.text().unwrap_or(""));
    match cmd.as_str() {
        "start" => send_menu(&bot, chat).await?,
        "addchannel" => add_channel(&bot, chat, &state, &rest).await?,
        "removetarget" => remove_target(&bot, chat, &state, &rest).await?,
        "delchannel" => del_channel(&bot, chat, &state, &rest).await?,
        "addfilter" => add_filter(&bot, chat, &state, &rest).await?,
        "delfilter" => del_filter(&bot, chat, &state, &rest).await?,
        "filters" => list_filters(&bot, chat, &state).await?,
        _ => {
            bot.send_message(
                chat,
                "Команды: /start /addchannel /removetarget /delchannel /addfilter /delfilter /filters",
            )
            .await?;
        }
    }
    Ok(())
}

pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let user_id = q.from.id.0 as i64;
    let chat = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(user_id));

    if !state.store.lock().await.is_admin(user_id) {
        bot.send_message(chat, NO_RIGHTS).await?;
        return Ok(());
    }

    let data = q.data.as_deref().unwrap_or("");
    match data {
        "add_channel" => {
            bot.send_message(chat, "Отправьте команду: /addchannel @source @target1 [@target2 ...]")
                .await?;
        }
        "list_pairs" => list_pairs(&bot, chat, &state).await?,
        "enable_forwarding" => set_forwarding(&bot, chat, &state, true).await?,
        "disable_forwarding" => set_forwarding(&bot, chat, &state, false).await?,
        "show_stats" => show_stats(&bot, chat, &state).await?,
        _ => {
            if let Some(raw) = data.strip_prefix("delete_pair_")
                && let Ok(source) = raw.parse::<i64>()
            {
                delete_pair(&bot, chat, &state, source).await?;
            }
        }
    }
    Ok(())
}

async fn send_menu(bot: &Bot, chat: ChatId) -> ResponseResult<()> {
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("➕ Добавить канал", "add_channel")],
        vec![InlineKeyboardButton::callback("📋 Мои связки", "list_pairs")],
        vec![
            InlineKeyboardButton::callback("✅ Вкл пересылку", "enable_forwarding"),
            InlineKeyboardButton::callback("❌ Выкл пересылку", "disable_forwarding"),
        ],
        vec![InlineKeyboardButton::callback("📊 Статистика", "show_stats")],
    ]);
    bot.send_message(chat, "🔧 Панель управления:")
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

async fn add_channel(
    bot: &Bot,
    chat: ChatId,
    state: &BotState,
    rest: &str,
) -> ResponseResult<()> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    if args.len() < 2 {
        bot.send_message(chat, USAGE_ADDCHANNEL).await?;
        return Ok(());
    }

    let source = match state.transport.resolve_username(args[0]).await {
        Ok(id) => Some(id),
        Err(_) => {
            bot.send_message(chat, format!("⚠️ Не найден: {}", args[0])).await?;
            None
        }
    };

    let mut targets = Vec::new();
    for name in &args[1..] {
        match state.transport.resolve_username(name).await {
            Ok(id) => targets.push(id),
            Err(_) => {
                bot.send_message(chat, format!("⚠️ Не найден: {name}")).await?;
            }
        }
    }

    let source = match source {
        Some(id) if !targets.is_empty() => id,
        _ => {
            bot.send_message(chat, "❌ Ошибка: исходный или целевые каналы не найдены.")
                .await?;
            return Ok(());
        }
    };

    let result = state.store.lock().await.upsert_targets(source, &targets);
    match result {
        Ok(()) => bot.send_message(chat, "✅ Связка добавлена.").await?,
        Err(e) => {
            warn!("Failed to save pair for {source}: {e}");
            bot.send_message(chat, SAVE_FAILED).await?
        }
    };
    Ok(())
}

async fn remove_target(
    bot: &Bot,
    chat: ChatId,
    state: &BotState,
    rest: &str,
) -> ResponseResult<()> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    let [source_name, target_name] = args.as_slice() else {
        bot.send_message(chat, USAGE_REMOVETARGET).await?;
        return Ok(());
    };

    let source = match state.transport.resolve_username(source_name).await {
        Ok(id) => id,
        Err(_) => {
            bot.send_message(chat, format!("⚠️ Не найден: {source_name}")).await?;
            return Ok(());
        }
    };
    let target = match state.transport.resolve_username(target_name).await {
        Ok(id) => id,
        Err(_) => {
            bot.send_message(chat, format!("⚠️ Не найден: {target_name}")).await?;
            return Ok(());
        }
    };

    let result = state.store.lock().await.remove_target(source, target);
    match result {
        Ok(true) => bot.send_message(chat, "✅ Получатель удалён.").await?,
        Ok(false) => bot.send_message(chat, "❌ Связка не найдена.").await?,
        Err(e) => {
            warn!("Failed to remove target {target} of {source}: {e}");
            bot.send_message(chat, SAVE_FAILED).await?
        }
    };
    Ok(())
}

async fn del_channel(
    bot: &Bot,
    chat: ChatId,
    state: &BotState,
    rest: &str,
) -> ResponseResult<()> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    let [source_name] = args.as_slice() else {
        bot.send_message(chat, USAGE_DELCHANNEL).await?;
        return Ok(());
    };

    let source = match state.transport.resolve_username(source_name).await {
        Ok(id) => id,
        Err(_) => {
            bot.send_message(chat, format!("⚠️ Не найден: {source_name}")).await?;
            return Ok(());
        }
    };
    delete_pair(bot, chat, state, source).await
}

async fn delete_pair(bot: &Bot, chat: ChatId, state: &BotState, source: i64) -> ResponseResult<()> {
    let result = state.store.lock().await.remove_pair(source);
    match result {
        Ok(true) => bot.send_message(chat, "✅ Связка удалена.").await?,
        Ok(false) => bot.send_message(chat, "❌ Связка не найдена.").await?,
        Err(e) => {
            warn!("Failed to delete pair {source}: {e}");
            bot.send_message(chat, SAVE_FAILED).await?
        }
    };
    Ok(())
}

async fn add_filter(bot: &Bot, chat: ChatId, state: &BotState, rest: &str) -> ResponseResult<()> {
    if rest.is_empty() {
        bot.send_message(chat, "❌ Укажите: /addfilter <слово или фраза>").await?;
        return Ok(());
    }
    let result = state.store.lock().await.add_filter(rest);
    match result {
        Ok(true) => bot.send_message(chat, "✅ Фильтр добавлен.").await?,
        Ok(false) => bot.send_message(chat, "ℹ️ Такой фильтр уже есть.").await?,
        Err(e) => {
            warn!("Failed to add filter {rest:?}: {e}");
            bot.send_message(chat, SAVE_FAILED).await?
        }
    };
    Ok(())
}

async fn del_filter(bot: &Bot, chat: ChatId, state: &BotState, rest: &str) -> ResponseResult<()> {
    if rest.is_empty() {
        bot.send_message(chat, "❌ Укажите: /delfilter <слово или фраза>").await?;
        return Ok(());
    }
    let result = state.store.lock().await.remove_filter(rest);
    match result {
        Ok(true) => bot.send_message(chat, "✅ Фильтр удалён.").await?,
        Ok(false) => bot.send_message(chat, "❌ Фильтр не найден.").await?,
        Err(e) => {
            warn!("Failed to remove filter {rest:?}: {e}");
            bot.send_message(chat, SAVE_FAILED).await?
        }
    };
    Ok(())
}

async fn list_filters(bot: &Bot, chat: ChatId, state: &BotState) -> ResponseResult<()> {
    let filters = state.store.lock().await.filters().to_vec();
    let text = if filters.is_empty() {
        "Фильтров нет.".to_string()
    } else {
        format!("🚫 Фильтры: {}", filters.join(", "))
    };
    bot.send_message(chat, text).await?;
    Ok(())
}

async fn list_pairs(bot: &Bot, chat: ChatId, state: &BotState) -> ResponseResult<()> {
    let pairs = state.store.lock().await.pairs().to_vec();
    if pairs.is_empty() {
        bot.send_message(chat, "❌ Нет активных связок.").await?;
        return Ok(());
    }

    for pair in pairs {
        let source_name = chat_label(state.transport.as_ref(), pair.source).await;
        let mut target_names = Vec::new();
        for &target in &pair.targets {
            target_names.push(chat_label(state.transport.as_ref(), target).await);
        }
        let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
            "❌ Удалить связку",
            format!("delete_pair_{}", pair.source),
        )]]);
        bot.send_message(
            chat,
            format!(
                "🔗 Источник: {source_name}\n➡️ Получатели: {}",
                target_names.join(", ")
            ),
        )
        .reply_markup(keyboard)
        .await?;
    }
    Ok(())
}

async fn set_forwarding(
    bot: &Bot,
    chat: ChatId,
    state: &BotState,
    enabled: bool,
) -> ResponseResult<()> {
    let result = state.store.lock().await.set_forwarding(enabled);
    match result {
        Ok(()) => {
            let text = if enabled {
                "✅ Пересылка включена."
            } else {
                "❌ Пересылка выключена."
            };
            bot.send_message(chat, text).await?
        }
        Err(e) => {
            warn!("Failed to toggle forwarding: {e}");
            bot.send_message(chat, SAVE_FAILED).await?
        }
    };
    Ok(())
}

async fn show_stats(bot: &Bot, chat: ChatId, state: &BotState) -> ResponseResult<()> {
    let cutoff = Utc::now().timestamp_millis() - REPORT_WINDOW_MS;
    let recent = state.store.lock().await.deliveries_since(cutoff);
    if recent.is_empty() {
        bot.send_message(chat, "📊 За последние 15 минут пересылок не было.")
            .await?;
        return Ok(());
    }

    let mut text = String::from("📊 Статистика за последние 15 минут:\n");
    for ((source, target), count) in group_deliveries(&recent) {
        let source_name = chat_label(state.transport.as_ref(), source).await;
        let target_name = chat_label(state.transport.as_ref(), target).await;
        text.push_str(&format!("• {source_name} → {target_name}: {count} сообщений\n"));
    }
    bot.send_message(chat, text).await?;
    Ok(())
}

/// Counts deliveries per (source, target), first-seen order.
fn group_deliveries(records: &[StatRecord]) -> Vec<((i64, i64), u32)> {
    let mut grouped: Vec<((i64, i64), u32)> = Vec::new();
    for record in records {
        let key = (record.source, record.target);
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => grouped.push((key, 1)),
        }
    }
    grouped
}

async fn chat_label(transport: &dyn RelayTransport, chat_id: i64) -> String {
    match transport.chat_info(chat_id).await {
        Ok(info) => info.label(),
        Err(_) => format!("chat_id: {chat_id}"),
    }
}
