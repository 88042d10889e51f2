//! Chat commands wagerbot answers to.

use anyhow::Result;
use wb_slack::{Bot, ConversationMessage};

pub const ECHO_PATTERN: &str = r"echo(.*)";
pub const ANSWER_PATTERN: &str = r"answer to life";
pub const STOCK_PATTERN: &str = r"stock ([a-z]+)\s?";

pub fn register(bot: &Bot) -> Result<()> {
    bot.command(ECHO_PATTERN, echo)?;
    bot.command(ANSWER_PATTERN, answer)?;
    bot.command(STOCK_PATTERN, stock)?;
    Ok(())
}

async fn echo(bot: Bot, message: ConversationMessage, captures: Vec<String>) -> Result<()> {
    let text = captures.get(1).cloned().unwrap_or_default();
    bot.say(message.channel, text).await?;
    Ok(())
}

async fn answer(bot: Bot, message: ConversationMessage, _captures: Vec<String>) -> Result<()> {
    bot.say(message.channel, "42").await?;
    Ok(())
}

async fn stock(bot: Bot, message: ConversationMessage, captures: Vec<String>) -> Result<()> {
    let symbol = captures
        .get(1)
        .ok_or_else(|| anyhow::anyhow!("stock pattern matched without a symbol"))?;
    bot.say(message.channel, stock_reply(symbol)).await?;
    Ok(())
}

fn stock_reply(symbol: &str) -> String {
    format!("Oh boy! I hope you didn't have your life savings in {symbol}.")
}
